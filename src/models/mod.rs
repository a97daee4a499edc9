//! Data Models
//!
//! Contains all data structures used throughout the application.

pub mod conversation;
pub mod knowledge;
pub mod settings;
pub mod status;

pub use conversation::*;
pub use knowledge::*;
pub use settings::*;
pub use status::*;
