//! # Barrage - HTTP Load-Testing Engine
//!
//! Barrage fires paced HTTP attempts against a target, evaluates each
//! response against break conditions, writes recordable results and
//! composes many such executions into a nested, concurrently scheduled
//! flow tree.
//!
//! ## Features
//!
//! - `http` (default): reqwest-backed request executor
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use barrage::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Logger::init_tracing();
//!     let engine = Engine::new(EngineConfig::default().output_root("out"))?;
//!     let summary = engine
//!         .run_file("plan.yaml", VarScope::new(), CancellationToken::new())
//!         .await?;
//!     println!("{} work items succeeded", summary.succeeded);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! [`Logger::init_tracing`] installs a human-readable subscriber. For log
//! shippers, install the JSON one instead; both honour `RUST_LOG`:
//!
//! ```rust,no_run
//! barrage::Logger::init_json_tracing();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod engine;

pub use barrage_context as context;
pub use barrage_core::*;
pub use barrage_logger::Logger;
pub use barrage_runtime as runtime;
pub use barrage_yaml as yaml;
pub use engine::Engine;

/// Prelude module for easy imports
pub mod prelude {
    pub use crate::Engine;
    pub use barrage_context::{FlowContext, SharedContext, StepStatus, StepSummary, VarScope};
    pub use barrage_core::prelude::*;
    pub use barrage_logger::Logger;
    pub use barrage_runtime::{EngineConfig, FlowOrchestrator, HttpConfig, MassExecution, MassPolicy};
    pub use barrage_yaml::prelude::*;
    pub use tokio_util::sync::CancellationToken;
}
