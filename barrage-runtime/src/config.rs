//! Engine configuration.

use barrage_core::Concurrency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout
    pub timeout: Duration,

    pub connect_timeout: Duration,

    /// Maximum number of redirects to follow
    pub max_redirects: usize,

    pub user_agent: String,

    /// Whether to verify TLS certificates
    pub verify_tls: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            user_agent: format!("barrage/{}", env!("CARGO_PKG_VERSION")),
            verify_tls: true,
        }
    }
}

impl HttpConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

/// Settings of one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory work item output directories are resolved against.
    pub output_root: PathBuf,
    /// Replaces the plan's root concurrency when set.
    pub concurrency: Option<Concurrency>,
    /// When false, records are discarded.
    pub write_output: bool,
    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            concurrency: None,
            write_output: true,
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn write_output(mut self, enabled: bool) -> Self {
        self.write_output = enabled;
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}
