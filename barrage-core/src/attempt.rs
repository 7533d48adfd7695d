use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a transport returns for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Send(String),
    #[error("failed to read response body: {0}")]
    ReadBody(String),
}

/// Outcome of one fired attempt. Consumed exactly once by the correlator.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// 1-based, assigned at issuance.
    pub seq: u64,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub latency: Duration,
    /// `None` when no response was received.
    pub status_code: Option<u16>,
    pub raw_body: Option<Bytes>,
    pub parsed_body: Option<serde_json::Value>,
    pub has_system_error: bool,
    pub has_parse_error: bool,
    pub has_create_error: bool,
    pub count_limit_reached: bool,
    pub error: Option<String>,
}

impl AttemptResult {
    /// A result that carries no response yet; flags are set by the caller.
    pub fn pending(seq: u64, count_limit_reached: bool) -> Self {
        let now = Utc::now();
        Self {
            seq,
            success: false,
            start_time: now,
            end_time: now,
            latency: Duration::ZERO,
            status_code: None,
            raw_body: None,
            parsed_body: None,
            has_system_error: false,
            has_parse_error: false,
            has_create_error: false,
            count_limit_reached,
            error: None,
        }
    }

    pub fn create_failed(seq: u64, count_limit_reached: bool, error: String) -> Self {
        Self {
            has_create_error: true,
            error: Some(error),
            ..Self::pending(seq, count_limit_reached)
        }
    }

    pub fn has_response(&self) -> bool {
        self.status_code.is_some()
    }
}

/// Stable snapshot of an attempt handed to the writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteRecord {
    pub seq: u64,
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub latency_ms: f64,
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteRecord {
    pub fn from_attempt(
        attempt: &AttemptResult,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            seq: attempt.seq,
            success: attempt.success,
            start_time: attempt.start_time,
            end_time: attempt.end_time,
            latency_ms: attempt.latency.as_secs_f64() * 1000.0,
            status_code: attempt.status_code,
            body: attempt
                .raw_body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            data,
            error: attempt.error.clone(),
        }
    }
}
