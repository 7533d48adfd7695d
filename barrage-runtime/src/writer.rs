//! Write pipeline.
//!
//! A single worker applies the leaf's [`RecordWriter`] to dispatched
//! records in arrival order. Every dispatched record owns an [`AckGuard`]
//! whose `Drop` emits [`WriteEvent::Acked`], so each record is
//! acknowledged exactly once on every path: written, failed, cancelled,
//! or dropped with the worker. A failed write is reported as
//! [`WriteEvent::Failed`] on the same channel, ahead of its ack.

use barrage_core::{RecordWriter, WriteRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    Acked(u64),
    /// Only emitted when the pipeline breaks on write errors.
    Failed(u64),
}

struct AckGuard {
    id: u64,
    events: mpsc::UnboundedSender<WriteEvent>,
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        let _ = self.events.send(WriteEvent::Acked(self.id));
    }
}

struct WriteRequest {
    record: WriteRecord,
    guard: AckGuard,
}

/// Counters kept by the worker.
#[derive(Debug, Default)]
pub struct WriteCounters {
    pub written: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

pub struct WritePipeline {
    requests: mpsc::UnboundedSender<WriteRequest>,
    events_tx: mpsc::UnboundedSender<WriteEvent>,
    events: mpsc::UnboundedReceiver<WriteEvent>,
    counters: Arc<WriteCounters>,
    writer: Arc<dyn RecordWriter>,
    worker: JoinHandle<()>,
}

impl WritePipeline {
    /// Starts the worker. Pending writes race `cancel` once it fires.
    pub fn spawn(
        writer: Arc<dyn RecordWriter>,
        break_on_error: bool,
        cancel: CancellationToken,
    ) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let counters = Arc::new(WriteCounters::default());

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&writer),
            events_tx.clone(),
            Arc::clone(&counters),
            break_on_error,
            cancel,
        ));

        Self {
            requests,
            events_tx,
            events,
            counters,
            writer,
            worker,
        }
    }

    /// Queues `record` under `id` without waiting for the writer.
    pub fn dispatch(&self, id: u64, record: WriteRecord) {
        let request = WriteRequest {
            record,
            guard: AckGuard {
                id,
                events: self.events_tx.clone(),
            },
        };
        // A closed queue drops the request here, which still acks it.
        if self.requests.send(request).is_err() {
            tracing::warn!(write_id = id, "write worker is gone, record dropped");
        }
    }

    pub async fn next_event(&mut self) -> Option<WriteEvent> {
        self.events.recv().await
    }

    pub fn counters(&self) -> &WriteCounters {
        &self.counters
    }

    /// Stops accepting records, waits for the worker and closes the writer.
    pub async fn finish(self) -> anyhow::Result<()> {
        let WritePipeline {
            requests,
            worker,
            writer,
            ..
        } = self;
        drop(requests);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "write worker panicked");
        }
        writer.close().await
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    writer: Arc<dyn RecordWriter>,
    events: mpsc::UnboundedSender<WriteEvent>,
    counters: Arc<WriteCounters>,
    break_on_error: bool,
    cancel: CancellationToken,
) {
    while let Some(WriteRequest { record, guard }) = rx.recv().await {
        let result = if cancel.is_cancelled() {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = writer.write(&cancel, &record) => Some(r),
            }
        };

        match result {
            Some(Ok(())) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Some(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(seq = record.seq, error = %e, "failed to write record");
                if break_on_error {
                    let _ = events.send(WriteEvent::Failed(guard.id));
                }
            }
            None => {
                counters.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(seq = record.seq, "write cancelled");
            }
        }
        drop(guard);
    }
}
