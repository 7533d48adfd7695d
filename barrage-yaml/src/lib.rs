//! # Barrage YAML
//!
//! Execution plans from YAML/JSON documents: loading, validation,
//! `${var}` request templates and the plan-driven leaf runner.

mod config;
mod expression;
mod loader;
mod parser;
mod runner;
mod template;

pub use config::*;
pub use expression::Interpolator;
pub use loader::PlanLoader;
pub use parser::{build_plan, parse_leaf, LeafKind, LeafPlan, RequestPlan};
pub use runner::{load_leaf, PlanLeafRunner};
pub use template::{RequestTemplate, TemplateRequestFactory};

/// Prelude module for plan loading
pub mod prelude {
    pub use crate::{build_plan, PlanConfig, PlanLeafRunner, PlanLoader};
}
