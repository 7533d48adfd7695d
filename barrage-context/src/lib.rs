//! # Barrage Context
//!
//! Variable scopes and the run-wide context shared by the flow orchestrator

mod scope;
mod value;

pub use scope::VarScope;
pub use value::Value;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Run-wide record of every work item's state transitions.
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub trace_id: String,
    pub step_logs: Vec<StepLog>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StepLog {
    pub step_name: String,
    pub registered_at: Instant,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub status: StepStatus,
    pub error_message: Option<String>,
}

/// Work item state machine: `Pending → Running → {Succeeded, Failed, Cancelled}`.
///
/// A pending item may go straight to `Cancelled` when its scope is
/// cancelled before it gets a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Cancelled
        )
    }
}

/// Per-status counts, see [`FlowContext::summary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new_with_trace_id(Uuid::new_v4().to_string())
    }
}

impl FlowContext {
    pub fn new_with_trace_id(trace_id: String) -> Self {
        Self {
            trace_id,
            step_logs: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn register_step(&mut self, step_name: String) {
        tracing::debug!(trace_id = %self.trace_id, step = %step_name, "step pending");
        self.step_logs.push(StepLog {
            step_name,
            registered_at: Instant::now(),
            start_time: None,
            end_time: None,
            status: StepStatus::Pending,
            error_message: None,
        });
    }

    pub fn start_step(&mut self, step_name: &str) {
        if let Some(log) = self.pending_log(step_name) {
            log.start_time = Some(Instant::now());
            log.status = StepStatus::Running;
            tracing::info!(trace_id = %self.trace_id, step = %step_name, "step starting");
        }
    }

    pub fn end_step_success(&mut self, step_name: &str) {
        if let Some(duration) = self.finish(step_name, StepStatus::Succeeded, None) {
            tracing::info!(trace_id = %self.trace_id, step = %step_name, duration_ms = ?duration, "step succeeded");
        }
    }

    pub fn end_step_failed(&mut self, step_name: &str, error: &str) {
        if let Some(duration) =
            self.finish(step_name, StepStatus::Failed, Some(error.to_string()))
        {
            tracing::error!(trace_id = %self.trace_id, step = %step_name, duration_ms = ?duration, error = %error, "step failed");
        }
        self.errors
            .push(format!("[{}] {}: {}", self.trace_id, step_name, error));
    }

    pub fn end_step_cancelled(&mut self, step_name: &str) {
        if let Some(duration) = self.finish(step_name, StepStatus::Cancelled, None) {
            tracing::warn!(trace_id = %self.trace_id, step = %step_name, duration_ms = ?duration, "step cancelled");
        }
    }

    pub fn status_of(&self, step_name: &str) -> Option<StepStatus> {
        self.step_logs
            .iter()
            .rev()
            .find(|log| log.step_name == step_name)
            .map(|log| log.status)
    }

    pub fn summary(&self) -> StepSummary {
        let mut summary = StepSummary::default();
        for log in &self.step_logs {
            match log.status {
                StepStatus::Pending => summary.pending += 1,
                StepStatus::Running => summary.running += 1,
                StepStatus::Succeeded => summary.succeeded += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    fn pending_log(&mut self, step_name: &str) -> Option<&mut StepLog> {
        self.step_logs
            .iter_mut()
            .rev()
            .find(|log| log.step_name == step_name && !log.status.is_terminal())
    }

    // Returns the time spent since the step started (or was registered).
    fn finish(
        &mut self,
        step_name: &str,
        status: StepStatus,
        error: Option<String>,
    ) -> Option<std::time::Duration> {
        let log = self.pending_log(step_name)?;
        let now = Instant::now();
        log.end_time = Some(now);
        log.status = status;
        log.error_message = error;
        Some(now.duration_since(log.start_time.unwrap_or(log.registered_at)))
    }
}

pub type SharedContext = Arc<Mutex<FlowContext>>;
