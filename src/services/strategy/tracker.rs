//! Task Status Tracker
//!
//! Holds the fixed stage list of one orchestration run and pushes an
//! immutable [`StrategyStatus`] snapshot to the observer after every
//! mutation. The tracker is advisory only: nothing reads it back to make a
//! control-flow decision.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::conversation::ResponseKind;
use crate::models::status::{PipelineStage, PipelineTask, StrategyStatus, TaskStatus};

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Receives a snapshot on every stage transition.
///
/// Called synchronously from the pipeline; implementations must not block.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, status: &StrategyStatus);
}

/// Discards every snapshot.
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status(&self, _status: &StrategyStatus) {}
}

/// Forwards snapshots over an unbounded channel (fire-and-forget).
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StrategyStatus>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<StrategyStatus>) -> Self {
        Self { tx }
    }
}

impl StatusObserver for ChannelObserver {
    fn on_status(&self, status: &StrategyStatus) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.tx.send(status.clone());
    }
}

/// Keeps every snapshot in memory.
#[derive(Default)]
pub struct RecordingObserver {
    snapshots: Mutex<Vec<StrategyStatus>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<StrategyStatus> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Distinct consecutive statuses a stage went through.
    pub fn transitions(&self, stage: PipelineStage) -> Vec<TaskStatus> {
        let mut out: Vec<TaskStatus> = Vec::new();
        for snapshot in self.snapshots() {
            if let Some(task) = snapshot.task(stage) {
                if out.last() != Some(&task.status) {
                    out.push(task.status);
                }
            }
        }
        out
    }
}

impl StatusObserver for RecordingObserver {
    fn on_status(&self, status: &StrategyStatus) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(status.clone());
        }
    }
}

/// Logs stage messages through `tracing`.
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn on_status(&self, status: &StrategyStatus) {
        if let Some(task) = status
            .tasks
            .iter()
            .rev()
            .find(|t| t.status == TaskStatus::InProgress || t.status == TaskStatus::Error)
        {
            info!(stage = %task.id, status = ?task.status, "{}", task.message);
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatusTracker
// ---------------------------------------------------------------------------

pub struct TaskStatusTracker {
    status: StrategyStatus,
    observer: Arc<dyn StatusObserver>,
}

impl TaskStatusTracker {
    /// Fresh tracker with every stage in `todo`. Does not notify.
    pub fn new(observer: Arc<dyn StatusObserver>) -> Self {
        Self {
            status: StrategyStatus {
                tasks: PipelineStage::ALL.iter().map(|s| PipelineTask::new(*s)).collect(),
                current_actor: None,
                response_kind: None,
                tool_name: None,
                retry_attempt: None,
                max_retries: None,
                streaming_progress: None,
                deep_reasoning: false,
            },
            observer,
        }
    }

    pub fn start(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.set(stage, TaskStatus::InProgress, message.into());
    }

    /// Replace the message of a running stage. No-op for any other status.
    pub fn update(&mut self, stage: PipelineStage, message: impl Into<String>) {
        if self.stage_status(stage) != TaskStatus::InProgress {
            return;
        }
        self.set(stage, TaskStatus::InProgress, message.into());
    }

    pub fn complete(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.set(stage, TaskStatus::Completed, message.into());
    }

    pub fn fail(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.set(stage, TaskStatus::Error, message.into());
    }

    pub fn set_retry_info(&mut self, attempt: u32, max: u32) {
        self.status.retry_attempt = Some(attempt);
        self.status.max_retries = Some(max);
        self.notify();
    }

    pub fn set_streaming_progress(&mut self, percent: u8) {
        self.status.streaming_progress = Some(percent.min(100));
        self.notify();
    }

    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.status.current_actor = Some(actor.into());
        self.notify();
    }

    pub fn set_response_kind(&mut self, kind: ResponseKind) {
        self.status.response_kind = Some(kind);
        self.notify();
    }

    pub fn set_tool_name(&mut self, name: impl Into<String>) {
        self.status.tool_name = Some(name.into());
        self.notify();
    }

    pub fn set_deep_reasoning(&mut self, active: bool) {
        self.status.deep_reasoning = active;
        self.notify();
    }

    /// Clear per-attempt streaming signals before a new generation attempt.
    pub fn reset_stream_signals(&mut self) {
        self.status.current_actor = None;
        self.status.response_kind = None;
        self.status.tool_name = None;
        self.status.streaming_progress = None;
        self.notify();
    }

    pub fn stage_status(&self, stage: PipelineStage) -> TaskStatus {
        self.status
            .task(stage)
            .map(|t| t.status)
            .unwrap_or(TaskStatus::Todo)
    }

    pub fn snapshot(&self) -> StrategyStatus {
        self.status.clone()
    }

    fn set(&mut self, stage: PipelineStage, status: TaskStatus, message: String) {
        if let Some(task) = self.status.tasks.iter_mut().find(|t| t.id == stage) {
            debug!(stage = %stage, status = ?status, message = %message, "tracker: transition");
            task.status = status;
            task.message = message;
        }
        self.notify();
    }

    fn notify(&self) {
        self.observer.on_status(&self.status);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
