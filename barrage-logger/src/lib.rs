//! # Barrage Logger
//!
//! Tracing setup and run summaries for Barrage

use barrage_context::{FlowContext, StepStatus};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Logger bound to one run's trace id
pub struct Logger {
    pub trace_id: String,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_trace_id(trace_id: String) -> Self {
        Self { trace_id }
    }

    /// Human-readable output filtered by `RUST_LOG`, `info` when unset.
    pub fn init_tracing() {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .init();
    }

    /// One JSON object per event, for log shippers.
    pub fn init_json_tracing() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .with_current_span(true)
            .init();
    }

    /// Per-state counts of every work item, then every recorded error.
    pub fn log_run_summary(&self, context: &FlowContext) {
        let summary = context.summary();
        info!(
            trace_id = %context.trace_id,
            total = context.step_logs.len(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            pending = summary.pending,
            running = summary.running,
            "Run summary"
        );

        for error in &context.errors {
            error!(trace_id = %context.trace_id, "Run error: {}", error);
        }
    }

    /// Logs each work item with its duration.
    pub fn log_step_details(&self, context: &FlowContext) {
        for step_log in &context.step_logs {
            let duration_ms = match (step_log.start_time, step_log.end_time) {
                (Some(start), Some(end)) => end.duration_since(start).as_millis(),
                _ => 0,
            };

            match step_log.status {
                StepStatus::Succeeded => info!(
                    trace_id = %context.trace_id,
                    step_name = %step_log.step_name,
                    duration_ms,
                    "Work item succeeded"
                ),
                StepStatus::Failed => error!(
                    trace_id = %context.trace_id,
                    step_name = %step_log.step_name,
                    duration_ms,
                    error = %step_log.error_message.as_deref().unwrap_or("Unknown error"),
                    "Work item failed"
                ),
                StepStatus::Cancelled => warn!(
                    trace_id = %context.trace_id,
                    step_name = %step_log.step_name,
                    duration_ms,
                    "Work item cancelled"
                ),
                StepStatus::Pending | StepStatus::Running => warn!(
                    trace_id = %context.trace_id,
                    step_name = %step_log.step_name,
                    status = ?step_log.status,
                    "Work item did not finish"
                ),
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
