//! Condition matchers.
//!
//! Condition lists are compiled once per leaf into immutable matchers that
//! evaluate in list order and report the id of the first condition that
//! matched. Compilation rejects unknown operators, bad operands and bad
//! path queries; evaluation can only fail on body extraction.

mod predicate;
mod query;

pub use query::{JsonPath, PathStepError};

use barrage_core::{
    AttemptResult, BodyCondition, DataColumn, IntCondition, PlanError, RecordExcludeFilter,
};
use predicate::IntPredicate;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("condition `{id}`: cannot apply `{segment}` to {found} in query `{query}`")]
    Extraction {
        id: String,
        query: String,
        segment: String,
        found: &'static str,
    },
}

impl MatchError {
    /// Id of the condition whose extraction failed.
    pub fn condition_id(&self) -> &str {
        match self {
            MatchError::Extraction { id, .. } => id,
        }
    }
}

/// Compiled status-code or count conditions.
#[derive(Debug, Clone, Default)]
pub struct IntMatcher {
    conditions: Vec<(String, IntPredicate)>,
}

impl IntMatcher {
    pub fn status(conditions: &[IntCondition]) -> Result<Self, PlanError> {
        Self::compile(conditions, true)
    }

    pub fn count(conditions: &[IntCondition]) -> Result<Self, PlanError> {
        Self::compile(conditions, false)
    }

    fn compile(conditions: &[IntCondition], allow_regex: bool) -> Result<Self, PlanError> {
        let conditions = conditions
            .iter()
            .map(|c| Ok((c.id.clone(), IntPredicate::parse(c, allow_regex)?)))
            .collect::<Result<Vec<_>, PlanError>>()?;
        Ok(Self { conditions })
    }

    /// Id of the first condition satisfied by `value`.
    pub fn first_match(&self, value: i64) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(_, pred)| pred.test(value))
            .map(|(id, _)| id.as_str())
    }
}

/// Compiled body conditions: each asserts its query yields `true`.
#[derive(Debug, Clone, Default)]
pub struct BodyMatcher {
    conditions: Vec<(String, JsonPath)>,
}

impl BodyMatcher {
    pub fn compile(conditions: &[BodyCondition]) -> Result<Self, PlanError> {
        let conditions = conditions
            .iter()
            .map(|c| Ok((c.id.clone(), JsonPath::compile(&c.query)?)))
            .collect::<Result<Vec<_>, PlanError>>()?;
        Ok(Self { conditions })
    }

    /// A missing body, a missing value or a non-boolean value is not a
    /// match. A wrong-shaped body stops evaluation with an error.
    pub fn first_match(&self, body: Option<&JsonValue>) -> Result<Option<&str>, MatchError> {
        for (id, path) in &self.conditions {
            let Some(body) = body else {
                tracing::debug!(condition = %id, "no parsed body, condition not evaluated");
                continue;
            };
            match path.extract(body) {
                Ok(Some(JsonValue::Bool(true))) => return Ok(Some(id.as_str())),
                Ok(Some(JsonValue::Bool(false))) => {}
                Ok(Some(other)) => {
                    tracing::debug!(condition = %id, query = path.as_str(), value = %other, "body condition yielded a non-boolean");
                }
                Ok(None) => {
                    tracing::debug!(condition = %id, query = path.as_str(), "body condition value absent");
                }
                Err(PathStepError { segment, found }) => {
                    return Err(MatchError::Extraction {
                        id: id.clone(),
                        query: path.as_str().to_string(),
                        segment,
                        found,
                    })
                }
            }
        }
        Ok(None)
    }
}

/// Status and body conditions only see attempts that got a response;
/// count conditions see every attempt.
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    count: IntMatcher,
    status: IntMatcher,
    body: BodyMatcher,
}

impl ExcludeMatcher {
    pub fn compile(filter: &RecordExcludeFilter) -> Result<Self, PlanError> {
        Ok(Self {
            count: IntMatcher::count(&filter.count)?,
            status: IntMatcher::status(&filter.status_code)?,
            body: BodyMatcher::compile(&filter.response_body)?,
        })
    }

    pub fn first_match(&self, attempt: &AttemptResult) -> Result<Option<String>, MatchError> {
        let seq = i64::try_from(attempt.seq).unwrap_or(i64::MAX);
        if let Some(id) = self.count.first_match(seq) {
            return Ok(Some(id.to_string()));
        }
        let Some(status) = attempt.status_code else {
            return Ok(None);
        };
        if let Some(id) = self.status.first_match(i64::from(status)) {
            return Ok(Some(id.to_string()));
        }
        Ok(self
            .body
            .first_match(attempt.parsed_body.as_ref())?
            .map(str::to_string))
    }
}

/// Extracts configured output columns. Absent or failing columns are
/// recorded as `null`.
#[derive(Debug, Clone, Default)]
pub struct DataExtractor {
    columns: Vec<(String, JsonPath)>,
}

impl DataExtractor {
    pub fn compile(columns: &[DataColumn]) -> Result<Self, PlanError> {
        let columns = columns
            .iter()
            .map(|c| Ok((c.name.clone(), JsonPath::compile(&c.query)?)))
            .collect::<Result<Vec<_>, PlanError>>()?;
        Ok(Self { columns })
    }

    pub fn extract(&self, body: Option<&JsonValue>) -> BTreeMap<String, JsonValue> {
        self.columns
            .iter()
            .map(|(name, path)| {
                let value = body
                    .and_then(|b| match path.extract(b) {
                        Ok(v) => v.cloned(),
                        Err(e) => {
                            tracing::debug!(column = %name, segment = %e.segment, "data column extraction failed");
                            None
                        }
                    })
                    .unwrap_or(JsonValue::Null);
                (name.clone(), value)
            })
            .collect()
    }
}
