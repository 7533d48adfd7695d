//! One leaf execution: firer, correlator and write pipeline wired together.

use crate::correlator::{Correlator, CorrelatorReport};
use crate::firer::AttemptFirer;
use crate::writer::WritePipeline;
use anyhow::Context;
use barrage_core::{
    Authenticator, BreakPolicy, DataColumn, PacingPolicy, PlanError, RecordExcludeFilter,
    RecordWriter, RequestExecutor, RequestFactory, SuccessBreak,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Policies of one mass execution as written in the plan.
#[derive(Debug, Clone, Default)]
pub struct MassPolicy {
    pub pacing: PacingPolicy,
    pub break_policy: BreakPolicy,
    pub exclude: RecordExcludeFilter,
    pub data: Vec<DataColumn>,
    pub success_break: Vec<SuccessBreak>,
}

#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn RequestFactory>,
    pub executor: Arc<dyn RequestExecutor>,
    pub auth: Arc<dyn Authenticator>,
    pub writer: Arc<dyn RecordWriter>,
}

pub struct MassExecution {
    name: String,
    pacing: PacingPolicy,
    correlator: Correlator,
    break_on_write_error: bool,
    success_break: Vec<SuccessBreak>,
    collaborators: Collaborators,
}

impl MassExecution {
    /// Compiles every condition list; the attempt cap is `break.count`.
    pub fn new(
        name: impl Into<String>,
        policy: MassPolicy,
        collaborators: Collaborators,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        let pacing = PacingPolicy::new(
            policy.pacing.interval,
            policy.pacing.await_prev_response,
            policy.break_policy.count,
        )
        .map_err(|e| match e {
            PlanError::InvalidField { field, reason, .. } => PlanError::InvalidField {
                field,
                context: format!("request `{name}`"),
                reason,
            },
            other => other,
        })?;
        let correlator = Correlator::new(&policy.break_policy, &policy.exclude, &policy.data)?;

        Ok(Self {
            pacing,
            correlator,
            break_on_write_error: policy.break_policy.write_error,
            success_break: policy.success_break,
            collaborators,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs until a termination outcome is decided and every record has
    /// been acknowledged.
    #[tracing::instrument(level = "info", skip(self, cancel), fields(request = %self.name))]
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<CorrelatorReport> {
        let scope = cancel.child_token();
        let fire_token = scope.child_token();
        let (results_tx, results_rx) = mpsc::channel(1);

        let mut pipeline = WritePipeline::spawn(
            Arc::clone(&self.collaborators.writer),
            self.break_on_write_error,
            scope.clone(),
        );
        let firer = AttemptFirer::new(
            Arc::clone(&self.collaborators.factory),
            Arc::clone(&self.collaborators.executor),
            Arc::clone(&self.collaborators.auth),
            self.pacing.clone(),
        );
        let firing = tokio::spawn(firer.run(results_tx, fire_token.clone()));

        let report = self
            .correlator
            .run(results_rx, &mut pipeline, &scope, &fire_token)
            .await;

        fire_token.cancel();
        let fired = firing.await.context("attempt firer task failed")?;
        pipeline
            .finish()
            .await
            .with_context(|| format!("failed to close output of `{}`", self.name))?;

        tracing::debug!(fired, outcome = %report.outcome, "mass execution finished");
        Ok(report)
    }

    /// Like [`run`](Self::run), but an outcome missing from the success
    /// list becomes an error.
    pub async fn run_to_verdict(&self, cancel: &CancellationToken) -> anyhow::Result<CorrelatorReport> {
        let report = self.run(cancel).await?;
        report
            .outcome
            .clone()
            .into_verdict(&self.success_break)
            .with_context(|| format!("request `{}` failed", self.name))?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use crate::output::NoopWriter;
    use async_trait::async_trait;
    use barrage_core::{
        ExecutionRequest, HttpMethod, HttpResponse, IntCondition, TerminationError,
        TerminationKind, TerminationOutcome, TransportError, WriteRecord,
    };
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers with the status stored in `status`.
    struct StaticExecutor {
        status: AtomicU16,
        calls: AtomicUsize,
    }

    impl StaticExecutor {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status: AtomicU16::new(status),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RequestExecutor for StaticExecutor {
        async fn execute(&self, _request: ExecutionRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: self.status.load(Ordering::SeqCst),
                body: Bytes::from_static(b"{\"ok\":true}"),
            })
        }
    }

    #[derive(Default)]
    struct FailingWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordWriter for FailingWriter {
        async fn write(&self, _cancel: &CancellationToken, _record: &WriteRecord) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("read-only file system")
        }
    }

    #[derive(Default)]
    struct SlowWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordWriter for SlowWriter {
        async fn write(&self, _cancel: &CancellationToken, _record: &WriteRecord) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn collaborators(
        executor: Arc<dyn RequestExecutor>,
        writer: Arc<dyn RecordWriter>,
    ) -> Collaborators {
        Collaborators {
            factory: Arc::new(ExecutionRequest::new(HttpMethod::Get, "http://target")),
            executor,
            auth: Arc::new(NoAuth),
            writer,
        }
    }

    fn fast_pacing() -> PacingPolicy {
        PacingPolicy::new(Duration::from_millis(10), false, None).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_break_issues_exact_attempts() {
        let executor = StaticExecutor::new(200);
        let policy = MassPolicy {
            pacing: fast_pacing(),
            break_policy: BreakPolicy {
                count: Some(5),
                ..Default::default()
            },
            success_break: vec!["count".parse().unwrap()],
            ..Default::default()
        };
        let mass = MassExecution::new("count", policy, collaborators(executor.clone(), Arc::new(NoopWriter)))
            .unwrap();

        let report = mass.run_to_verdict(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome.kind, TerminationKind::Count);
        assert_eq!(report.stats.attempts, 5);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_breaks_run() {
        let writer = Arc::new(FailingWriter::default());
        let policy = MassPolicy {
            pacing: fast_pacing(),
            break_policy: BreakPolicy {
                write_error: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mass = MassExecution::new("writes", policy, collaborators(StaticExecutor::new(200), writer.clone()))
            .unwrap();

        let err = mass.run_to_verdict(&CancellationToken::new()).await.unwrap_err();
        let termination = err.downcast_ref::<TerminationError>().unwrap();
        assert_eq!(termination.outcome.kind, TerminationKind::WriteError);
        assert!(writer.calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exclude_everything_still_terminates() {
        let writer = Arc::new(FailingWriter::default());
        let policy = MassPolicy {
            pacing: fast_pacing(),
            break_policy: BreakPolicy {
                time: Some(Duration::from_millis(200)),
                write_error: true,
                ..Default::default()
            },
            exclude: RecordExcludeFilter {
                count: vec![IntCondition::new("everything", "ge", "1")],
                ..Default::default()
            },
            success_break: vec!["time".parse().unwrap()],
            ..Default::default()
        };
        let mass = MassExecution::new("excluded", policy, collaborators(StaticExecutor::new(200), writer.clone()))
            .unwrap();

        let report = mass.run_to_verdict(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome.kind, TerminationKind::Timeout);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
        assert!(report.stats.excluded > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_break_reports_match_id() {
        let policy = MassPolicy {
            pacing: fast_pacing(),
            break_policy: BreakPolicy {
                status_code: vec![IntCondition::new("5xx", "between", "500,599")],
                ..Default::default()
            },
            ..Default::default()
        };
        let mass = MassExecution::new("status", policy, collaborators(StaticExecutor::new(503), Arc::new(NoopWriter)))
            .unwrap();

        let err = mass.run_to_verdict(&CancellationToken::new()).await.unwrap_err();
        assert!(format!("{err:#}").contains("statusCode/5xx"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempts_fired_while_draining_writes() {
        let executor = StaticExecutor::new(503);
        let writer = Arc::new(SlowWriter::default());
        let policy = MassPolicy {
            pacing: fast_pacing(),
            break_policy: BreakPolicy {
                status_code: vec![IntCondition::new("5xx", "ge", "500")],
                ..Default::default()
            },
            ..Default::default()
        };
        let mass = MassExecution::new("slow", policy, collaborators(executor.clone(), writer.clone()))
            .unwrap();

        let report = mass.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, TerminationOutcome::matched(TerminationKind::StatusCode, "5xx"));
        assert_eq!(report.stats.written, 1);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
        // the drain took a full second of 10 ms ticks
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_benign() {
        let cancel = CancellationToken::new();
        let policy = MassPolicy {
            pacing: fast_pacing(),
            ..Default::default()
        };
        let mass = MassExecution::new("idle", policy, collaborators(StaticExecutor::new(200), Arc::new(NoopWriter)))
            .unwrap();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            stopper.cancel();
        });
        let report = mass.run_to_verdict(&cancel).await.unwrap();
        assert_eq!(report.outcome.kind, TerminationKind::Context);
        assert!(report.stats.attempts >= 1);
    }

    #[test]
    fn test_zero_count_rejected() {
        let policy = MassPolicy {
            break_policy: BreakPolicy {
                count: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = MassExecution::new("zero", policy, collaborators(StaticExecutor::new(200), Arc::new(NoopWriter)));
        assert!(matches!(result, Err(PlanError::InvalidField { field: "count", .. })));
    }
}
