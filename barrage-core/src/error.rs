//! Construction-time errors.
//!
//! Everything here is raised while a plan is turned into executable parts,
//! before the first attempt is fired. None of these are retried.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("unknown operator `{op}` in condition `{id}`")]
    UnknownOperator { id: String, op: String },

    #[error("invalid operand `{operand}` for `{op}` in condition `{id}`: {reason}")]
    InvalidOperand {
        id: String,
        op: String,
        operand: String,
        reason: String,
    },

    #[error("unknown termination kind `{0}`")]
    UnknownTermination(String),

    #[error("invalid path query `{query}`: {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("missing required field `{field}` in {context}")]
    MissingField {
        field: &'static str,
        context: String,
    },

    #[error("invalid `{field}` in {context}: {reason}")]
    InvalidField {
        field: &'static str,
        context: String,
        reason: String,
    },

    #[error("unknown leaf type `{0}`")]
    UnknownLeafType(String),

    #[error("duplicate id `{0}`")]
    DuplicateId(String),
}
