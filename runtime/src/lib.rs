//! Runtime layer for the support platform: storage, services and
//! dispatch.
//!
//! The core crate decides; this crate persists and coordinates. The
//! pieces:
//!
//! - [`store`]: the versioned document-store abstraction and the atomic
//!   [`WriteBatch`] with its per-document preconditions
//! - [`memory`]: the in-memory reference store with change streams
//! - [`service`]: [`SupportDesk`], the lifecycle operations wired to
//!   storage, the payment gateway, moderation and the advisors
//! - [`dispatcher`]: best-effort notification fan-out after commits
//! - [`metrics`]: transition, payment, dispute and dispatch counters
//! - [`config`]: environment-variable configuration
//!
//! Concurrency is optimistic throughout: operations read versioned
//! snapshots, decide, then commit with those versions as preconditions.
//! Losers of a race get a conflict and may retry against fresh state.

pub mod config;
pub mod dispatcher;
pub mod memory;
pub mod metrics;
pub mod service;
pub mod store;

pub use config::DeskConfig;
pub use dispatcher::NotificationDispatcher;
pub use memory::{ChangeEvent, ChangeStream, InMemoryStore};
pub use metrics::register_metrics;
pub use service::{AuditView, DeskResult, SupportDesk, TicketView};
pub use store::{
    BatchOp, DocumentStore, Precondition, StoreError, StoreResult, Versioned, WriteBatch,
};
