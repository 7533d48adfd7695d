//! Path queries over parsed response bodies, e.g. `$.data.items[0].ok`.

use barrage_core::PlanError;
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, ".{key}"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A compiled path query. Immutable, shared across attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

/// Stepping into a value of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStepError {
    pub segment: String,
    pub found: &'static str,
}

impl JsonPath {
    pub fn compile(query: &str) -> Result<Self, PlanError> {
        let invalid = |reason: &str| PlanError::InvalidQuery {
            query: query.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(invalid("query is empty"));
        }
        let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let rest = rest.strip_prefix('.').unwrap_or(rest);

        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();
        let mut key = String::new();
        // Set after `]` so that `a[0].b` does not produce an empty key.
        let mut after_index = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(invalid("empty key"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_index = false;
                    if chars.peek().is_none() {
                        return Err(invalid("trailing `.`"));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unclosed `[`")),
                        }
                    }
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid("array index must be a non-negative integer"))?;
                    segments.push(Segment::Index(index));
                    after_index = true;
                }
                ']' => return Err(invalid("unexpected `]`")),
                c => {
                    if after_index {
                        return Err(invalid("expected `.` or `[` after `]`"));
                    }
                    key.push(c);
                }
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }

        Ok(Self {
            source: query.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `Ok(None)` when a key or index is missing (or a `null` is met on
    /// the way); `Err` when a key is applied to a non-object or an index
    /// to a non-array.
    pub fn extract<'a>(&self, root: &'a JsonValue) -> Result<Option<&'a JsonValue>, PathStepError> {
        let mut cur = root;
        for segment in &self.segments {
            let next = match (segment, cur) {
                (_, JsonValue::Null) => return Ok(None),
                (Segment::Key(key), JsonValue::Object(map)) => map.get(key),
                (Segment::Index(index), JsonValue::Array(items)) => items.get(*index),
                (segment, other) => {
                    return Err(PathStepError {
                        segment: segment.to_string(),
                        found: kind_of(other),
                    })
                }
            };
            match next {
                Some(value) => cur = value,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_forms() {
        for query in ["$.data.ok", ".data.ok", "data.ok"] {
            let path = JsonPath::compile(query).unwrap();
            assert_eq!(path.extract(&json!({"data": {"ok": true}})).unwrap(), Some(&json!(true)));
        }
        let root = JsonPath::compile("$").unwrap();
        assert_eq!(root.extract(&json!(true)).unwrap(), Some(&json!(true)));
    }

    #[test]
    fn test_indices() {
        let path = JsonPath::compile("$.items[1].done").unwrap();
        let body = json!({"items": [{"done": false}, {"done": true}]});
        assert_eq!(path.extract(&body).unwrap(), Some(&json!(true)));

        let nested = JsonPath::compile("grid[0][1]").unwrap();
        assert_eq!(nested.extract(&json!({"grid": [[1, 2]]})).unwrap(), Some(&json!(2)));
    }

    #[test]
    fn test_missing_is_absent() {
        let path = JsonPath::compile("$.a.b[3]").unwrap();
        assert_eq!(path.extract(&json!({"x": 1})).unwrap(), None);
        assert_eq!(path.extract(&json!({"a": {"b": [1]}})).unwrap(), None);
        assert_eq!(path.extract(&json!({"a": null})).unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_error() {
        let path = JsonPath::compile("$.a.b").unwrap();
        let err = path.extract(&json!({"a": "text"})).unwrap_err();
        assert_eq!(err.segment, ".b");
        assert_eq!(err.found, "a string");

        let index = JsonPath::compile("$.a[0]").unwrap();
        assert!(index.extract(&json!({"a": {"0": 1}})).is_err());
    }

    #[test]
    fn test_invalid_queries() {
        for query in ["", "a..b", "a[", "a[x]", "a]", "a[0]b", "a."] {
            assert!(JsonPath::compile(query).is_err(), "{query} should not compile");
        }
    }
}
