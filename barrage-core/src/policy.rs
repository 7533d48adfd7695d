//! Pacing, break and exclude policies of one mass execution.

use crate::error::PlanError;
use std::time::Duration;

/// Integer comparison against a status code or attempt sequence number.
///
/// `op` and `value` are kept as written in the plan; they are validated
/// when the condition list is compiled into a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntCondition {
    pub id: String,
    pub op: String,
    pub value: String,
}

pub type StatusCodeCondition = IntCondition;
pub type CountCondition = IntCondition;

impl IntCondition {
    pub fn new(
        id: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// Asserts that a path query over the parsed response yields `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyCondition {
    pub id: String,
    pub query: String,
}

impl BodyCondition {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
        }
    }
}

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPolicy {
    pub interval: Duration,
    pub await_prev_response: bool,
    /// Total attempts before the firer stops issuing.
    pub count: Option<u64>,
}

impl PacingPolicy {
    pub fn new(
        interval: Duration,
        await_prev_response: bool,
        count: Option<u64>,
    ) -> Result<Self, PlanError> {
        if interval.is_zero() {
            return Err(PlanError::InvalidField {
                field: "interval",
                context: "pacing policy".to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        if count == Some(0) {
            return Err(PlanError::InvalidField {
                field: "count",
                context: "pacing policy".to_string(),
                reason: "count cap must be at least 1".to_string(),
            });
        }
        Ok(Self {
            interval,
            await_prev_response,
            count,
        })
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            await_prev_response: false,
            count: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakPolicy {
    pub time: Option<Duration>,
    pub count: Option<u64>,
    pub sys_error: bool,
    pub parse_error: bool,
    pub write_error: bool,
    pub status_code: Vec<StatusCodeCondition>,
    pub response_body: Vec<BodyCondition>,
}

/// Conditions that suppress writing an attempt without stopping the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordExcludeFilter {
    pub count: Vec<CountCondition>,
    pub status_code: Vec<StatusCodeCondition>,
    pub response_body: Vec<BodyCondition>,
}

impl RecordExcludeFilter {
    pub fn is_empty(&self) -> bool {
        self.count.is_empty() && self.status_code.is_empty() && self.response_body.is_empty()
    }
}

/// An output column extracted from the parsed response into each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    pub name: String,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_rejects_zero_interval() {
        assert!(PacingPolicy::new(Duration::ZERO, false, None).is_err());
        assert!(PacingPolicy::new(Duration::from_millis(10), false, Some(0)).is_err());
        let policy = PacingPolicy::new(Duration::from_millis(10), true, Some(5)).unwrap();
        assert_eq!(policy.count, Some(5));
    }
}
