//! Out-of-band confirmation: posting the received parameter string back to
//! the gateway's validate endpoint.

use std::future::Future;

use crate::error::ItnError;
use crate::pipeline::Stage;

/// Posts an unkeyed parameter string to the confirmation endpoint and returns
/// the raw response body.
///
/// Transport failures must come back as [`ItnError::Confirmation`] or
/// [`ItnError::Timeout`], never as a body, so that "could not verify" stays
/// distinct from "gateway said no".
pub trait ConfirmationClient: Send + Sync {
    fn confirm(&self, param_string: &str) -> impl Future<Output = Result<String, ItnError>> + Send;
}

/// `reqwest`-backed client for `/eng/query/validate`.
#[cfg(feature = "full")]
#[derive(Debug, Clone)]
pub struct HttpConfirmationClient {
    http: reqwest::Client,
    url: String,
}

#[cfg(feature = "full")]
impl HttpConfirmationClient {
    /// Client for `url` with a whole-request timeout.
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, ItnError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(crate::constants::USER_AGENT)
            .build()
            .map_err(|e| ItnError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, url))
    }

    /// Reuse an existing `reqwest::Client` (its timeout applies).
    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "full")]
fn transport_error(e: reqwest::Error) -> ItnError {
    if e.is_timeout() {
        ItnError::Timeout(Stage::Confirmation)
    } else {
        ItnError::Confirmation(e.to_string())
    }
}

#[cfg(feature = "full")]
impl ConfirmationClient for HttpConfirmationClient {
    async fn confirm(&self, param_string: &str) -> Result<String, ItnError> {
        let resp = self
            .http
            .post(&self.url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(param_string.to_string())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::warn!(status = %status, "confirmation endpoint returned non-success status");
        }
        Ok(body)
    }
}

/// Canned confirmation outcome, for tests and offline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CannedConfirmation {
    /// Answer with this body.
    Body(String),
    /// Behave as if the request timed out.
    Timeout,
    /// Behave as if the connection failed.
    TransportError(String),
}

impl CannedConfirmation {
    pub fn valid() -> Self {
        CannedConfirmation::Body(crate::constants::CONFIRMATION_VALID.to_string())
    }

    pub fn invalid() -> Self {
        CannedConfirmation::Body("INVALID".to_string())
    }
}

impl ConfirmationClient for CannedConfirmation {
    async fn confirm(&self, _param_string: &str) -> Result<String, ItnError> {
        match self {
            CannedConfirmation::Body(body) => Ok(body.clone()),
            CannedConfirmation::Timeout => Err(ItnError::Timeout(Stage::Confirmation)),
            CannedConfirmation::TransportError(msg) => Err(ItnError::Confirmation(msg.clone())),
        }
    }
}
