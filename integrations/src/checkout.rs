//! Client for the hosted checkout provider's REST API.
//!
//! Sessions are opened with an idempotency key derived from the ticket,
//! so a retried request can never open a second session for the same
//! payment.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use remotedesk_core::gateway::{
    CheckoutSession, GatewayError, GatewayResult, PaymentGateway, SessionStatus,
};
use remotedesk_core::types::{Money, TicketId};

use crate::MissingEnv;
use crate::retry::{RetryPolicy, retry_with_policy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Checkout provider API client.
#[derive(Clone)]
pub struct CheckoutClient {
    client: Client,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl CheckoutClient {
    /// Creates a client from `REMOTEDESK_CHECKOUT_URL` and
    /// `REMOTEDESK_CHECKOUT_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingEnv`] when either variable is not set.
    pub fn from_env() -> Result<Self, MissingEnv> {
        let api_url = std::env::var("REMOTEDESK_CHECKOUT_URL").map_err(|_| MissingEnv {
            name: "REMOTEDESK_CHECKOUT_URL",
        })?;
        let api_key = std::env::var("REMOTEDESK_CHECKOUT_KEY").map_err(|_| MissingEnv {
            name: "REMOTEDESK_CHECKOUT_KEY",
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

    /// Opens a checkout session, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the provider rejects the request or
    /// stays unreachable through the retry budget.
    pub async fn open_session(
        &self,
        ticket_id: TicketId,
        amount: Money,
        title: &str,
    ) -> GatewayResult<CheckoutSession> {
        let session = retry_with_policy(&self.retry, transient, || {
            self.try_open(ticket_id, amount, title)
        })
        .await?;
        tracing::debug!(
            ticket_id = %ticket_id,
            session_id = %session.session_id,
            "checkout session opened"
        );
        Ok(session)
    }

    /// Looks up whether a session has been paid, retrying transient
    /// failures.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the session is unknown or the
    /// provider stays unreachable through the retry budget.
    pub async fn session_status(&self, session_id: &str) -> GatewayResult<SessionStatus> {
        retry_with_policy(&self.retry, transient, || self.try_status(session_id)).await
    }

    async fn try_open(
        &self,
        ticket_id: TicketId,
        amount: Money,
        title: &str,
    ) -> GatewayResult<CheckoutSession> {
        let request = CreateSessionRequest {
            ticket_id: ticket_id.to_string(),
            amount_cents: amount.as_cents(),
            title,
        };
        let response = self
            .client
            .post(format!("{}/sessions", self.api_url))
            .bearer_auth(&self.api_key)
            .header("idempotency-key", format!("ticket-{ticket_id}"))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => response
                .json::<SessionResponse>()
                .await
                .map(|session| CheckoutSession {
                    session_id: session.session_id,
                    redirect_url: session.redirect_url,
                })
                .map_err(|error| GatewayError::Unavailable {
                    message: format!("malformed session response: {error}"),
                }),
            status => Err(status_error(
                status,
                response.text().await.unwrap_or_default(),
            )),
        }
    }

    async fn try_status(&self, session_id: &str) -> GatewayResult<SessionStatus> {
        let response = self
            .client
            .get(format!("{}/sessions/{session_id}", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<StatusResponse>()
                    .await
                    .map_err(|error| GatewayError::Unavailable {
                        message: format!("malformed status response: {error}"),
                    })?;
                match body.status.as_str() {
                    "paid" => Ok(SessionStatus::Paid),
                    "pending" | "open" => Ok(SessionStatus::Pending),
                    other => Err(GatewayError::InvalidRequest {
                        reason: format!("unknown session status: {other}"),
                    }),
                }
            }
            StatusCode::NOT_FOUND => Err(GatewayError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
            status => Err(status_error(
                status,
                response.text().await.unwrap_or_default(),
            )),
        }
    }
}

impl std::fmt::Debug for CheckoutClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl PaymentGateway for CheckoutClient {
    fn create_session(
        &self,
        ticket_id: TicketId,
        amount: Money,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let this = self.clone();
        let title = title.to_string();
        Box::pin(async move { this.open_session(ticket_id, amount, &title).await })
    }

    fn verify_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<SessionStatus>> + Send>> {
        let this = self.clone();
        let session_id = session_id.to_string();
        Box::pin(async move { this.session_status(&session_id).await })
    }
}

const fn transient(error: &GatewayError) -> bool {
    matches!(
        error,
        GatewayError::Timeout | GatewayError::Unavailable { .. }
    )
}

fn request_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable {
            message: error.to_string(),
        }
    }
}

fn status_error(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => GatewayError::InvalidRequest {
            reason: if body.is_empty() {
                format!("checkout API rejected the request ({status})")
            } else {
                body
            },
        },
        _ => GatewayError::Unavailable {
            message: format!("checkout API answered {status}: {body}"),
        },
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    ticket_id: String,
    amount_cents: u64,
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_covers_exactly_the_retryable_errors() {
        assert!(transient(&GatewayError::Timeout));
        assert!(transient(&GatewayError::Unavailable {
            message: "down".into()
        }));
        assert!(!transient(&GatewayError::InvalidRequest {
            reason: "bad".into()
        }));
        assert!(!transient(&GatewayError::SessionNotFound {
            session_id: "cs_1".into()
        }));
    }

    #[test]
    fn client_rejections_map_to_invalid_request() {
        let error = status_error(StatusCode::UNPROCESSABLE_ENTITY, "amount too small".into());
        assert!(matches!(
            error,
            GatewayError::InvalidRequest { reason } if reason == "amount too small"
        ));
    }

    #[test]
    fn server_faults_map_to_unavailable() {
        let error = status_error(StatusCode::BAD_GATEWAY, String::new());
        assert!(matches!(error, GatewayError::Unavailable { .. }));
    }
}
