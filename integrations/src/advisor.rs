//! Client for the advisory text services: moderation, categorization and
//! audit summaries.
//!
//! All three endpoints share one POST-JSON call path with retry on
//! transient failures. Callers treat every error as advisory — the
//! lifecycle engines fall back rather than fail when this client errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use remotedesk_core::advisor::{AdvisorError, AuditSummarizer, CategoryAdvisor};
use remotedesk_core::moderation::{ClassifierError, SafetyClassifier, SafetyVerdict};
use remotedesk_core::types::AuditLogEntry;

use crate::MissingEnv;
use crate::retry::{RetryPolicy, retry_with_policy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory services API client.
///
/// One client serves all three advisory roles; wire it into the desk as
/// classifier, category advisor and summarizer alike.
#[derive(Clone)]
pub struct AdvisorClient {
    client: Client,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl AdvisorClient {
    /// Creates a client from `REMOTEDESK_ADVISOR_URL` and
    /// `REMOTEDESK_ADVISOR_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingEnv`] when either variable is not set.
    pub fn from_env() -> Result<Self, MissingEnv> {
        let api_url = std::env::var("REMOTEDESK_ADVISOR_URL").map_err(|_| MissingEnv {
            name: "REMOTEDESK_ADVISOR_URL",
        })?;
        let api_key = std::env::var("REMOTEDESK_ADVISOR_KEY").map_err(|_| MissingEnv {
            name: "REMOTEDESK_ADVISOR_KEY",
        })?;
        Ok(Self::new(api_url, api_key))
    }

    /// Creates a client against an explicit base URL.
    #[must_use]
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post_json<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        retry_with_policy(&self.retry, CallError::is_transient, || {
            self.attempt(path, request)
        })
        .await
    }

    async fn attempt<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{path}", self.api_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|error| CallError::Transport {
                transient: error.is_timeout() || error.is_connect(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json::<Resp>()
            .await
            .map_err(|error| CallError::Malformed(error.to_string()))
    }
}

impl std::fmt::Debug for AdvisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SafetyClassifier for AdvisorClient {
    async fn classify(&self, text: &str) -> Result<SafetyVerdict, ClassifierError> {
        let response: ModerationResponse = self
            .post_json("/v1/moderate", &ModerationRequest { text })
            .await
            .map_err(|error| ClassifierError::new(error.to_string()))?;
        if response.safe {
            Ok(SafetyVerdict::safe())
        } else {
            let reason = response
                .reason
                .unwrap_or_else(|| "policy violation".to_string());
            Ok(SafetyVerdict::unsafe_because(reason))
        }
    }
}

#[async_trait]
impl CategoryAdvisor for AdvisorClient {
    async fn suggest_category(&self, description: &str) -> Result<String, AdvisorError> {
        let response: CategorizeResponse = self
            .post_json("/v1/categorize", &CategorizeRequest { description })
            .await
            .map_err(|error| AdvisorError::new(error.to_string()))?;
        Ok(response.category)
    }
}

#[async_trait]
impl AuditSummarizer for AdvisorClient {
    async fn summarize(&self, entry: &AuditLogEntry) -> Result<String, AdvisorError> {
        let request = SummarizeRequest {
            action: entry.action.as_str(),
            details: entry.details.as_deref(),
        };
        let response: SummarizeResponse = self
            .post_json("/v1/summarize", &request)
            .await
            .map_err(|error| AdvisorError::new(error.to_string()))?;
        Ok(response.summary)
    }
}

#[derive(Debug, Error)]
enum CallError {
    #[error("advisor API answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("advisor API unreachable: {message}")]
    Transport { message: String, transient: bool },
    #[error("malformed advisor response: {0}")]
    Malformed(String),
}

impl CallError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Transport { transient, .. } => *transient,
            Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    safe: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct CategorizeRequest<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct CategorizeResponse {
    category: String,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    action: &'a str,
    details: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_faults_and_rate_limits_are_transient() {
        let fault = CallError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        let limited = CallError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        assert!(fault.is_transient());
        assert!(limited.is_transient());
    }

    #[test]
    fn client_faults_and_bad_payloads_are_not_retried() {
        let rejected = CallError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "missing text".into(),
        };
        let malformed = CallError::Malformed("expected value".into());
        assert!(!rejected.is_transient());
        assert!(!malformed.is_transient());
    }

    #[test]
    fn transport_errors_carry_their_own_transience() {
        let refused = CallError::Transport {
            message: "connection refused".into(),
            transient: true,
        };
        let tls = CallError::Transport {
            message: "invalid certificate".into(),
            transient: false,
        };
        assert!(refused.is_transient());
        assert!(!tls.is_transient());
    }
}
