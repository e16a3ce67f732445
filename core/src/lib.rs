//! # RemoteDesk Core
//!
//! Domain types and lifecycle engines for a platform that intermediates
//! paid remote technical-support engagements between clients and
//! technicians, with admins acting as escrow and dispute mediators.
//!
//! ## Architecture
//!
//! ```text
//!   request ──► engine.decide(snapshots, actor, payload, env)
//!                  │
//!                  ├─ Err(LifecycleError)   refusal, nothing written
//!                  │
//!                  └─ Ok(Transition)
//!                        ├─ writes   entity docs + audit entry (atomic)
//!                        └─ event ──► notifications::route ──► drafts
//! ```
//!
//! Engines are pure decision code: they read fresh entity snapshots and
//! produce a [`lifecycle::Transition`] or a typed refusal. Committing a
//! transition atomically — and turning concurrent mutation into a
//! conflict error — is the runtime's job, which keeps every rule in this
//! crate testable without storage.
//!
//! The building blocks:
//!
//! - [`types`]: ids, money in cents, status enums, entity structs
//! - [`ledger`]: fee/split arithmetic and the rating fold
//! - [`lifecycle`]: the ticket, payment and dispute engines
//! - [`notifications`]: the single event-to-recipients routing table
//! - [`moderation`]: the fail-open chat gate over a safety classifier
//! - [`advisor`]: best-effort category suggestions and audit summaries
//! - [`gateway`]: the hosted-checkout abstraction

pub mod advisor;
pub mod environment;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod moderation;
pub mod notifications;
pub mod types;

pub use environment::{Clock, Environment, SystemClock};
pub use error::LifecycleError;
pub use events::{AuditAction, DisputeOutcome, DomainEvent};
pub use ledger::PaymentSplit;
pub use lifecycle::{Transition, Write, dispute::DisputeEngine, payment::PaymentEngine, ticket::TicketEngine};
pub use moderation::{ModerationGate, SafetyClassifier, SafetyVerdict};
