//! Collaborator interfaces the runtime is written against.

use crate::attempt::{HttpResponse, TransportError, WriteRecord};
use crate::flow::FlowWorkItem;
use crate::request::ExecutionRequest;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Sends one request and returns the raw response.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<HttpResponse, TransportError>;
}

/// Produces a fresh request for the attempt numbered `seq`.
pub trait RequestFactory: Send + Sync {
    fn create(&self, seq: u64) -> anyhow::Result<ExecutionRequest>;
}

impl RequestFactory for ExecutionRequest {
    fn create(&self, _seq: u64) -> anyhow::Result<ExecutionRequest> {
        Ok(self.clone())
    }
}

/// Applied once per fired attempt, before dispatch.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn set_on_request(
        &self,
        cancel: &CancellationToken,
        request: &mut ExecutionRequest,
    ) -> anyhow::Result<()>;
}

/// Sink for recordable attempts.
///
/// Called once per record from a single worker; implementations must not
/// keep the record after returning.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn write(&self, cancel: &CancellationToken, record: &WriteRecord) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// How a leaf or a nested level ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    Completed,
    /// Stopped by its cancellation token before finishing its work.
    Cancelled,
}

/// Runs one leaf work item to its verdict.
///
/// A leaf stopped through `cancel` returns `Ok(LeafOutcome::Cancelled)`;
/// one that finished its work reports `Completed` even if `cancel` fired
/// afterwards.
#[async_trait]
pub trait LeafRunner: Send + Sync {
    async fn run_leaf(
        &self,
        item: &FlowWorkItem,
        cancel: CancellationToken,
    ) -> anyhow::Result<LeafOutcome>;
}
