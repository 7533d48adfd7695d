//! Attempt firer: one attempt per tick, each on its own task.

use barrage_core::{
    AttemptResult, Authenticator, PacingPolicy, RequestExecutor, RequestFactory, ResponseType,
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct AttemptFirer {
    factory: Arc<dyn RequestFactory>,
    executor: Arc<dyn RequestExecutor>,
    auth: Arc<dyn Authenticator>,
    pacing: PacingPolicy,
}

/// Everything one attempt task needs.
#[derive(Clone)]
struct AttemptDeps {
    factory: Arc<dyn RequestFactory>,
    executor: Arc<dyn RequestExecutor>,
    auth: Arc<dyn Authenticator>,
    results: mpsc::Sender<AttemptResult>,
    cancel: CancellationToken,
}

impl AttemptFirer {
    pub fn new(
        factory: Arc<dyn RequestFactory>,
        executor: Arc<dyn RequestExecutor>,
        auth: Arc<dyn Authenticator>,
        pacing: PacingPolicy,
    ) -> Self {
        Self {
            factory,
            executor,
            auth,
            pacing,
        }
    }

    /// Fires until `cancel` fires. After the attempt that reaches the count
    /// cap it only waits for cancellation. Returns the number of attempts
    /// issued, once every attempt task has finished.
    pub async fn run(self, results: mpsc::Sender<AttemptResult>, cancel: CancellationToken) -> u64 {
        let deps = AttemptDeps {
            factory: self.factory,
            executor: self.executor,
            auth: self.auth,
            results,
            cancel: cancel.clone(),
        };

        let mut ticker = interval(self.pacing.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks = JoinSet::new();
        let mut prev_done: Option<oneshot::Receiver<()>> = None;
        let mut seq = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.pacing.await_prev_response {
                if let Some(done) = prev_done.take() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        // A dropped sender means the attempt was cancelled.
                        _ = done => {}
                    }
                }
            }

            seq += 1;
            let last = self.pacing.count.is_some_and(|cap| seq >= cap);
            let (done_tx, done_rx) = oneshot::channel();
            prev_done = Some(done_rx);

            tracing::trace!(seq, last, "firing attempt");
            tasks.spawn(fire_attempt(deps.clone(), seq, last, done_tx));

            while tasks.try_join_next().is_some() {}

            if last {
                tracing::debug!(seq, "count cap reached, firer idle until cancelled");
                cancel.cancelled().await;
                break;
            }
        }

        while tasks.join_next().await.is_some() {}
        seq
    }
}

async fn fire_attempt(deps: AttemptDeps, seq: u64, last: bool, done: oneshot::Sender<()>) {
    let AttemptDeps {
        factory,
        executor,
        auth,
        results,
        cancel,
    } = deps;

    let mut request = match factory.create(seq) {
        Ok(request) => request,
        Err(e) => {
            let _ = done.send(());
            let result = AttemptResult::create_failed(seq, last, format!("{e:#}"));
            push(&results, result, &cancel).await;
            return;
        }
    };
    if let Err(e) = auth.set_on_request(&cancel, &mut request).await {
        let _ = done.send(());
        let result = AttemptResult::create_failed(seq, last, format!("auth: {e:#}"));
        push(&results, result, &cancel).await;
        return;
    }

    let response_type = request.response_type;
    let mut result = AttemptResult::pending(seq, last);
    result.start_time = Utc::now();
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        outcome = executor.execute(request) => outcome,
    };

    result.latency = started.elapsed();
    result.end_time = Utc::now();
    let _ = done.send(());

    match outcome {
        Ok(response) => {
            result.status_code = Some(response.status);
            match parse_body(&response.body, response_type) {
                Ok(parsed) => {
                    result.parsed_body = parsed;
                    result.success = true;
                }
                Err(e) => {
                    result.has_parse_error = true;
                    result.error = Some(format!("failed to parse response body: {e}"));
                }
            }
            result.raw_body = Some(response.body);
        }
        Err(e) => {
            result.has_system_error = true;
            result.error = Some(e.to_string());
        }
    }

    push(&results, result, &cancel).await;
}

async fn push(
    results: &mpsc::Sender<AttemptResult>,
    result: AttemptResult,
    cancel: &CancellationToken,
) {
    let seq = result.seq;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::trace!(seq, "result dropped on cancellation");
        }
        sent = results.send(result) => {
            if sent.is_err() {
                tracing::trace!(seq, "result channel closed");
            }
        }
    }
}

/// An empty body has no tree; it is not a parse error.
fn parse_body(
    body: &Bytes,
    response_type: ResponseType,
) -> Result<Option<serde_json::Value>, serde_json::Error> {
    match response_type {
        _ if body.is_empty() => Ok(None),
        ResponseType::Json => serde_json::from_slice(body).map(Some),
        ResponseType::Text => Ok(Some(serde_json::Value::String(
            String::from_utf8_lossy(body).into_owned(),
        ))),
        ResponseType::None => Ok(None),
    }
}
