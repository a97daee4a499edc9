//! Services
//!
//! Business logic of the chat pipeline.

pub mod knowledge;
pub mod strategy;
