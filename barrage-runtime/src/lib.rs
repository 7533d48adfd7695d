//! # Barrage Runtime
//!
//! Execution engine for Barrage: condition matchers, the attempt firer,
//! the response correlator with its write pipeline, mass executions and
//! the flow orchestrator that composes them.

mod auth;
mod config;
mod correlator;
mod firer;
#[cfg(feature = "http")]
mod http;
mod mass;
pub mod matcher;
mod orchestrator;
mod output;
mod writer;

pub use auth::{BearerAuth, NoAuth};
pub use config::{EngineConfig, HttpConfig};
pub use correlator::{Correlator, CorrelatorReport, ExecutionStats};
pub use firer::AttemptFirer;
#[cfg(feature = "http")]
pub use http::ReqwestExecutor;
pub use mass::{Collaborators, MassExecution, MassPolicy};
pub use matcher::{BodyMatcher, DataExtractor, ExcludeMatcher, IntMatcher, JsonPath, MatchError};
pub use orchestrator::FlowOrchestrator;
pub use output::{JsonLinesWriter, NoopWriter};
pub use writer::{WriteCounters, WriteEvent, WritePipeline};
