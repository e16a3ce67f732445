//! Payment gateway interface.
//!
//! Abstraction over hosted checkout providers: the platform creates a
//! checkout session for a pending payment and later verifies whether the
//! session was paid. Gateway internals (capture, refunds, webhooks) stay
//! on the provider's side; a verified `Paid` session drives the same
//! confirmation transition an admin would.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::{Money, TicketId};

/// Payment gateway result.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Payment gateway error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway refused the request as malformed.
    InvalidRequest {
        /// Refusal reason.
        reason: String,
    },
    /// No session with the given id exists.
    SessionNotFound {
        /// The unknown session id.
        session_id: String,
    },
    /// The gateway did not answer in time.
    Timeout,
    /// The gateway could not be reached or answered with a server error.
    Unavailable {
        /// Failure description.
        message: String,
    },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid checkout request: {reason}"),
            Self::SessionNotFound { session_id } => {
                write!(f, "unknown checkout session: {session_id}")
            }
            Self::Timeout => write!(f, "gateway timed out"),
            Self::Unavailable { message } => write!(f, "gateway unavailable: {message}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// A hosted checkout session the client is redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// The gateway's session id, used for later verification.
    pub session_id: String,
    /// Where to send the client to pay.
    pub redirect_url: String,
}

/// Settlement state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session was paid in full.
    Paid,
    /// The session has not been paid (yet).
    Pending,
}

/// Payment gateway trait.
///
/// Abstraction over hosted checkout providers; implementations live in
/// the integrations crate, with a mock here for development.
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for a payment.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be created.
    fn create_session(
        &self,
        ticket_id: TicketId,
        amount: Money,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>>;

    /// Checks whether a session was paid.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be looked up.
    fn verify_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<SessionStatus>> + Send>>;
}

/// Mock gateway (always succeeds, every session verifies as paid).
#[derive(Clone, Debug)]
pub struct MockGateway;

impl MockGateway {
    /// Creates a new mock gateway.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped instance for sharing.
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway for MockGateway {
    fn create_session(
        &self,
        ticket_id: TicketId,
        amount: Money,
        title: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let title = title.to_string();
        Box::pin(async move {
            let session_id = format!("mock_cs_{}", uuid::Uuid::new_v4());
            tracing::info!(
                ticket_id = %ticket_id,
                amount = amount.as_cents(),
                session_id = %session_id,
                title = %title,
                "mock checkout session created"
            );
            Ok(CheckoutSession {
                redirect_url: format!("https://checkout.invalid/session/{session_id}"),
                session_id,
            })
        })
    }

    fn verify_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<SessionStatus>> + Send>> {
        let session_id = session_id.to_string();
        Box::pin(async move {
            tracing::info!(session_id = %session_id, "mock session verified as paid");
            Ok(SessionStatus::Paid)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sessions_create_and_verify_paid() {
        let gateway = MockGateway::new();
        let session = gateway
            .create_session(TicketId::new(), Money::from_major(100), "Printer repair")
            .await
            .unwrap();
        assert!(session.session_id.starts_with("mock_cs_"));
        assert!(session.redirect_url.contains(&session.session_id));

        let status = gateway.verify_session(&session.session_id).await.unwrap();
        assert_eq!(status, SessionStatus::Paid);
    }

    #[test]
    fn errors_describe_themselves() {
        let err = GatewayError::SessionNotFound {
            session_id: "cs_123".into(),
        };
        assert!(err.to_string().contains("cs_123"));
    }
}
