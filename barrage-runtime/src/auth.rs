//! Request authenticators. Obtaining credentials is up to the caller.

use async_trait::async_trait;
use barrage_core::{Authenticator, ExecutionRequest};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn set_on_request(
        &self,
        _cancel: &CancellationToken,
        _request: &mut ExecutionRequest,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sets `Authorization: Bearer <token>` on every attempt.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> anyhow::Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            anyhow::bail!("bearer token is empty");
        }
        Ok(Self { token })
    }
}

#[async_trait]
impl Authenticator for BearerAuth {
    async fn set_on_request(
        &self,
        cancel: &CancellationToken,
        request: &mut ExecutionRequest,
    ) -> anyhow::Result<()> {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled before authentication");
        }
        request.set_header("Authorization", format!("Bearer {}", self.token));
        Ok(())
    }
}
