//! # Barrage Core
//!
//! Data model of a load test: requests, pacing and break policies,
//! attempts, termination vocabulary and the flow tree, plus the
//! collaborator traits the runtime executes against.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod attempt;
mod error;
mod flow;
mod policy;
mod request;
mod termination;
mod traits;

pub use attempt::{AttemptResult, HttpResponse, TransportError, WriteRecord};
pub use error::PlanError;
pub use flow::{expand, validate_siblings, Concurrency, FlowKind, FlowNode, FlowPlan, FlowWorkItem};
pub use policy::{
    BodyCondition, BreakPolicy, CountCondition, DataColumn, IntCondition, PacingPolicy,
    RecordExcludeFilter, StatusCodeCondition, DEFAULT_INTERVAL,
};
pub use request::{ExecutionRequest, HttpMethod, MultipartField, RequestBody, ResponseType};
pub use termination::{SuccessBreak, TerminationError, TerminationKind, TerminationOutcome};
pub use traits::{
    Authenticator, LeafOutcome, LeafRunner, RecordWriter, RequestExecutor, RequestFactory,
};

/// Prelude module for core functionality
pub mod prelude {
    pub use crate::{
        AttemptResult, BreakPolicy, Concurrency, ExecutionRequest, FlowNode, FlowPlan,
        FlowWorkItem, HttpMethod, PacingPolicy, PlanError, RecordExcludeFilter, RecordWriter,
        RequestExecutor, TerminationKind, TerminationOutcome, WriteRecord,
    };
    pub use barrage_context::{FlowContext, SharedContext, Value, VarScope};
}
