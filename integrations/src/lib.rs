//! HTTP integrations for the RemoteDesk platform.
//!
//! Two remote collaborators live behind REST APIs: the hosted checkout
//! provider and the advisory service (moderation, categorization, audit
//! summaries). This crate implements the collaborator traits from
//! `remotedesk-core` over those APIs, so the desk never knows whether it
//! is talking to the real services or to mocks.
//!
//! Both clients share the retry policy in [`retry`]: transient failures
//! (timeouts, connection errors, server errors) are retried, everything
//! else surfaces immediately and leaves degradation to the callers.

use thiserror::Error;

pub mod advisor;
pub mod checkout;
pub mod retry;

pub use advisor::AdvisorClient;
pub use checkout::CheckoutClient;
pub use retry::{RetryPolicy, retry_with_policy};

/// Failure to assemble a client from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing {name} environment variable")]
pub struct MissingEnv {
    /// The variable that was not set.
    pub name: &'static str,
}
