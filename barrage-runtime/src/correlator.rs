//! Response correlator and termination decider.
//!
//! Consumes attempt results, dispatches recordable ones to the write
//! pipeline and decides, exactly once, why the execution stops. No
//! outcome is returned while a dispatched record is still unacknowledged.

use crate::matcher::{BodyMatcher, DataExtractor, ExcludeMatcher, IntMatcher};
use crate::writer::{WriteEvent, WritePipeline};
use barrage_core::{
    AttemptResult, BreakPolicy, DataColumn, PlanError, RecordExcludeFilter, TerminationKind,
    TerminationOutcome, WriteRecord,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Per-run counters reported with the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub attempts: u64,
    pub dispatched: u64,
    pub excluded: u64,
    pub written: u64,
    pub write_failures: u64,
    pub system_errors: u64,
    pub parse_errors: u64,
    pub create_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorReport {
    pub outcome: TerminationOutcome,
    pub stats: ExecutionStats,
}

/// Compiled break policy, exclude filter and data columns of one leaf.
#[derive(Debug, Clone)]
pub struct Correlator {
    time_limit: Option<Duration>,
    break_on_sys_error: bool,
    break_on_parse_error: bool,
    break_status: IntMatcher,
    break_body: BodyMatcher,
    exclude: ExcludeMatcher,
    data: DataExtractor,
}

/// Mutable state of one run, owned by the event loop.
struct RunState {
    in_flight: HashSet<u64>,
    next_id: u64,
    stats: ExecutionStats,
}

impl Correlator {
    pub fn new(
        policy: &BreakPolicy,
        exclude: &RecordExcludeFilter,
        data: &[DataColumn],
    ) -> Result<Self, PlanError> {
        Ok(Self {
            time_limit: policy.time,
            break_on_sys_error: policy.sys_error,
            break_on_parse_error: policy.parse_error,
            break_status: IntMatcher::status(&policy.status_code)?,
            break_body: BodyMatcher::compile(&policy.response_body)?,
            exclude: ExcludeMatcher::compile(exclude)?,
            data: DataExtractor::compile(data)?,
        })
    }

    /// Consumes attempt results until an outcome is decided, then drains
    /// the in-flight writes. `stop_firing` is cancelled as soon as the
    /// outcome is known so no attempt is issued during the drain.
    pub async fn run(
        &self,
        mut results: mpsc::Receiver<AttemptResult>,
        pipeline: &mut WritePipeline,
        cancel: &CancellationToken,
        stop_firing: &CancellationToken,
    ) -> CorrelatorReport {
        let mut state = RunState {
            in_flight: HashSet::new(),
            next_id: 0,
            stats: ExecutionStats::default(),
        };

        let deadline = self.time_limit.map(|limit| Instant::now() + limit);
        let timeout = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);

        let pending = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break TerminationOutcome::new(TerminationKind::Context);
                }
                Some(event) = pipeline.next_event() => match event {
                    WriteEvent::Acked(id) => {
                        state.in_flight.remove(&id);
                    }
                    WriteEvent::Failed(id) => {
                        tracing::warn!(write_id = id, "write failed, stopping");
                        break TerminationOutcome::new(TerminationKind::WriteError);
                    }
                },
                _ = &mut timeout => {
                    break TerminationOutcome::new(TerminationKind::Timeout);
                }
                result = results.recv() => match result {
                    Some(attempt) => {
                        if let Some(outcome) = self.process(attempt, &mut state, pipeline) {
                            break outcome;
                        }
                    }
                    None => {
                        tracing::debug!("result channel closed");
                        break TerminationOutcome::new(TerminationKind::Context);
                    }
                },
            }
        };

        stop_firing.cancel();
        drop(results);
        let outcome = drain(pending, &mut state.in_flight, pipeline).await;

        let counters = pipeline.counters();
        state.stats.written = counters.written.load(Ordering::Relaxed);
        state.stats.write_failures = counters.failed.load(Ordering::Relaxed);

        tracing::info!(
            kind = %outcome.kind,
            match_id = outcome.match_id.as_deref().unwrap_or(""),
            attempts = state.stats.attempts,
            written = state.stats.written,
            excluded = state.stats.excluded,
            "execution terminated"
        );
        CorrelatorReport {
            outcome,
            stats: state.stats,
        }
    }

    /// Handles one attempt; returns the outcome if it ends the run.
    fn process(
        &self,
        attempt: AttemptResult,
        state: &mut RunState,
        pipeline: &WritePipeline,
    ) -> Option<TerminationOutcome> {
        state.stats.attempts += 1;
        let seq = attempt.seq;

        match self.exclude.first_match(&attempt) {
            Ok(Some(id)) => {
                tracing::trace!(seq, condition = %id, "record excluded");
                state.stats.excluded += 1;
            }
            Err(e) => {
                tracing::warn!(seq, error = %e, "exclude filter failed, record not written");
                state.stats.excluded += 1;
            }
            Ok(None) => {
                let data = self.data.extract(attempt.parsed_body.as_ref());
                let record = WriteRecord::from_attempt(&attempt, data);
                let id = state.next_id;
                state.next_id += 1;
                state.in_flight.insert(id);
                state.stats.dispatched += 1;
                pipeline.dispatch(id, record);
            }
        }

        if attempt.has_create_error {
            state.stats.create_errors += 1;
            tracing::warn!(seq, error = attempt.error.as_deref().unwrap_or(""), "failed to create request");
            return Some(TerminationOutcome::new(TerminationKind::CreateError));
        }

        if attempt.has_system_error {
            state.stats.system_errors += 1;
            tracing::warn!(seq, error = attempt.error.as_deref().unwrap_or(""), "request failed");
            if self.break_on_sys_error {
                return Some(TerminationOutcome::new(TerminationKind::SysError));
            }
        }

        if attempt.has_parse_error {
            state.stats.parse_errors += 1;
            tracing::warn!(seq, error = attempt.error.as_deref().unwrap_or(""), "response not parsed");
            if self.break_on_parse_error {
                return Some(TerminationOutcome::new(TerminationKind::ParseError));
            }
        }

        if attempt.count_limit_reached {
            return Some(TerminationOutcome::new(TerminationKind::Count));
        }

        let status = attempt.status_code?;

        match self.break_body.first_match(attempt.parsed_body.as_ref()) {
            Ok(Some(id)) => {
                return Some(TerminationOutcome::matched(TerminationKind::ResponseBody, id));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(seq, error = %e, "break condition extraction failed");
                return Some(TerminationOutcome::matched(
                    TerminationKind::WriteError,
                    e.condition_id(),
                ));
            }
        }

        self.break_status
            .first_match(i64::from(status))
            .map(|id| TerminationOutcome::matched(TerminationKind::StatusCode, id))
    }
}

/// Waits until every dispatched record is acknowledged. A write failure
/// seen meanwhile replaces the pending outcome.
async fn drain(
    mut outcome: TerminationOutcome,
    in_flight: &mut HashSet<u64>,
    pipeline: &mut WritePipeline,
) -> TerminationOutcome {
    if !in_flight.is_empty() {
        tracing::debug!(pending = in_flight.len(), kind = %outcome.kind, "draining writes");
    }
    // Bounded: after cancellation the worker acks without writing.
    while !in_flight.is_empty() {
        match pipeline.next_event().await {
            Some(WriteEvent::Acked(id)) => {
                in_flight.remove(&id);
            }
            Some(WriteEvent::Failed(id)) => {
                if outcome.kind != TerminationKind::WriteError {
                    tracing::warn!(write_id = id, superseded = %outcome, "write failed while draining");
                    outcome = TerminationOutcome::new(TerminationKind::WriteError);
                }
            }
            None => break,
        }
    }
    outcome
}
