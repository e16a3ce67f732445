//! Testing utilities for the RemoteDesk platform.
//!
//! This crate provides the shared pieces the workspace test suites are
//! built from:
//!
//! - **Mock collaborators** — deterministic clocks plus scripted stand-ins
//!   for the payment gateway, the safety classifier, the advisory services,
//!   and a document store whose notification writes can be made to fail.
//! - **Fixtures** — seeded users and ready-made ticket drafts so tests can
//!   start from a populated store instead of hand-assembling documents.
//! - **Scenario harness** — a fluent Given/When/Then builder for asserting
//!   on accepted transitions and refusals without repeating match
//!   boilerplate.
//!
//! ## Example
//!
//! ```ignore
//! use remotedesk_testing::{sample_draft, seed_user, test_desk};
//! use remotedesk_core::types::Role;
//! use remotedesk_runtime::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn client_opens_a_ticket() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let desk = test_desk(store.clone());
//!     let client = seed_user(store.as_ref(), Role::Client).await.unwrap();
//!
//!     let ticket = desk.create_ticket(client.id, sample_draft()).await.unwrap();
//!     assert_eq!(ticket.client_id, client.id);
//! }
//! ```

pub mod fixtures;
pub mod mocks;
pub mod scenario;

// Re-export commonly used items
pub use fixtures::{
    make_user, sample_draft, seed_suspended_user, seed_user, test_desk, test_environment,
    uncategorized_draft,
};
pub use mocks::{
    CannedAdvisor, FailingAdvisor, FailingClassifier, FailingGateway, FixedClock, FlakyStore,
    ScriptedGateway, StaticClassifier, SteppingClock, test_clock,
};
pub use scenario::TransitionTest;

/// Installs a compact tracing subscriber writing to the test output capture.
///
/// Safe to call from every test; only the first call installs a subscriber,
/// later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_test_writer()
        .try_init();
}
