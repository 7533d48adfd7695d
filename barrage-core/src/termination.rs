//! Termination vocabulary.
//!
//! The plan refers to termination kinds by stable strings (`successBreak`
//! lists, logs). They are mapped once, through [`TerminationKind::TABLE`],
//! into a closed enum; unknown strings are rejected at plan construction.

use crate::error::PlanError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationKind {
    Context,
    Count,
    SysError,
    CreateError,
    ParseError,
    WriteError,
    Timeout,
    ResponseBody,
    StatusCode,
}

impl TerminationKind {
    pub const TABLE: [(&'static str, TerminationKind); 9] = [
        ("context", TerminationKind::Context),
        ("count", TerminationKind::Count),
        ("sysError", TerminationKind::SysError),
        ("createRequestError", TerminationKind::CreateError),
        ("parseError", TerminationKind::ParseError),
        ("writeError", TerminationKind::WriteError),
        ("time", TerminationKind::Timeout),
        ("responseBody", TerminationKind::ResponseBody),
        ("statusCode", TerminationKind::StatusCode),
    ];

    pub fn as_str(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Kinds that carry the identifier of the condition that fired.
    pub fn carries_match_id(self) -> bool {
        matches!(self, TerminationKind::ResponseBody | TerminationKind::StatusCode)
    }
}

impl FromStr for TerminationKind {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| PlanError::UnknownTermination(s.to_string()))
    }
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single terminal state of one correlator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationOutcome {
    pub kind: TerminationKind,
    pub match_id: Option<String>,
}

impl TerminationOutcome {
    pub fn new(kind: TerminationKind) -> Self {
        Self {
            kind,
            match_id: None,
        }
    }

    pub fn matched(kind: TerminationKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            match_id: Some(id.into()),
        }
    }

    /// `context` is always benign; otherwise the outcome must appear in
    /// the leaf's `successBreak` list.
    pub fn is_success(&self, success_break: &[SuccessBreak]) -> bool {
        self.kind == TerminationKind::Context
            || success_break.iter().any(|sb| sb.matches(self))
    }

    pub fn into_verdict(
        self,
        success_break: &[SuccessBreak],
    ) -> Result<(), TerminationError> {
        if self.is_success(success_break) {
            Ok(())
        } else {
            Err(TerminationError { outcome: self })
        }
    }
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.match_id {
            Some(id) => write!(f, "{}/{}", self.kind, id),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A leaf stopped for a reason its plan did not list as success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution terminated by `{outcome}`")]
pub struct TerminationError {
    pub outcome: TerminationOutcome,
}

/// One entry of a `successBreak` list: `kind` or `kind/<id>`.
///
/// `responseBody` and `statusCode` without an id accept any condition of
/// that family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessBreak {
    pub kind: TerminationKind,
    pub match_id: Option<String>,
}

impl SuccessBreak {
    pub fn matches(&self, outcome: &TerminationOutcome) -> bool {
        if self.kind != outcome.kind {
            return false;
        }
        match &self.match_id {
            None => true,
            Some(id) => outcome.match_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl FromStr for SuccessBreak {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((kind, id)) => {
                let kind: TerminationKind = kind.parse()?;
                if !kind.carries_match_id() || id.is_empty() {
                    return Err(PlanError::UnknownTermination(s.to_string()));
                }
                Ok(Self {
                    kind,
                    match_id: Some(id.to_string()),
                })
            }
            None => Ok(Self {
                kind: s.parse()?,
                match_id: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_round_trip() {
        for (name, kind) in TerminationKind::TABLE {
            assert_eq!(name.parse::<TerminationKind>().unwrap(), kind);
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(
            "sysErr".parse::<TerminationKind>(),
            Err(PlanError::UnknownTermination("sysErr".into()))
        );
        assert!("count/5".parse::<SuccessBreak>().is_err());
        assert!("statusCode/".parse::<SuccessBreak>().is_err());
    }

    #[test]
    fn test_success_break_matching() {
        let list: Vec<SuccessBreak> = ["count", "responseBody/done"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        assert!(TerminationOutcome::new(TerminationKind::Count).is_success(&list));
        assert!(TerminationOutcome::matched(TerminationKind::ResponseBody, "done")
            .is_success(&list));
        assert!(!TerminationOutcome::matched(TerminationKind::ResponseBody, "other")
            .is_success(&list));
        assert!(!TerminationOutcome::new(TerminationKind::SysError).is_success(&list));
        // context is benign regardless of the list
        assert!(TerminationOutcome::new(TerminationKind::Context).is_success(&[]));
    }

    #[test]
    fn test_family_wide_success_break() {
        let list = vec!["statusCode".parse::<SuccessBreak>().unwrap()];
        assert!(TerminationOutcome::matched(TerminationKind::StatusCode, "5xx")
            .is_success(&list));
    }

    #[test]
    fn test_verdict_message_carries_match_id() {
        let err = TerminationOutcome::matched(TerminationKind::StatusCode, "5xx")
            .into_verdict(&[])
            .unwrap_err();
        assert_eq!(err.to_string(), "execution terminated by `statusCode/5xx`");
    }
}
