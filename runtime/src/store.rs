//! The versioned document store contract.
//!
//! Lifecycle engines decide; a [`DocumentStore`] persists. Reads return the
//! document together with its version, and every write in a [`WriteBatch`]
//! carries a [`Precondition`] naming the version the caller read (or
//! demanding absence for creates). `commit` applies the whole batch or
//! nothing: a single failed precondition surfaces [`StoreError::Conflict`]
//! and leaves the store untouched. That is the entire concurrency story —
//! no locks are held between read and commit.

use async_trait::async_trait;
use remotedesk_core::types::{
    AuditLogEntry, ChatMessage, Notification, NotificationId, Payment, PaymentId, PaymentStatus,
    Role, Ticket, TicketId, User, UserId,
};
use thiserror::Error;

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write precondition did not hold; nothing was applied.
    #[error("version precondition failed for {entity}")]
    Conflict {
        /// The entity kind whose precondition failed.
        entity: &'static str,
    },

    /// The backend could not serve the request.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Backend-specific description.
        message: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// A document paired with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The document.
    pub doc: T,
    /// Monotonic per-document version, starting at 1 on create.
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Pairs a document with its version.
    #[must_use]
    pub const fn new(doc: T, version: u64) -> Self {
        Self { doc, version }
    }
}

/// What must be true of the stored document for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet (create).
    Absent,
    /// The document must still be at this version (update/delete).
    Version(u64),
    /// Apply unconditionally.
    Any,
}

/// One operation within a batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Create or replace a ticket.
    PutTicket {
        /// New ticket state.
        ticket: Ticket,
        /// Version check.
        expect: Precondition,
    },
    /// Remove a ticket.
    DeleteTicket {
        /// Ticket to remove.
        id: TicketId,
        /// Version check.
        expect: Precondition,
    },
    /// Create or replace a payment.
    PutPayment {
        /// New payment state.
        payment: Payment,
        /// Version check.
        expect: Precondition,
    },
    /// Remove every payment attached to a ticket.
    PurgePayments {
        /// Owning ticket.
        ticket_id: TicketId,
    },
    /// Create or replace a user.
    PutUser {
        /// New user state.
        user: User,
        /// Version check.
        expect: Precondition,
    },
    /// Append a chat message.
    AppendMessage {
        /// The message.
        message: ChatMessage,
    },
    /// Remove a ticket's chat history.
    PurgeMessages {
        /// Owning ticket.
        ticket_id: TicketId,
    },
    /// Append an audit entry.
    AppendAudit {
        /// The entry.
        entry: AuditLogEntry,
    },
}

/// An atomic set of writes.
///
/// Built with the consuming builder methods; committed via
/// [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Starts an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Adds a ticket upsert.
    #[must_use]
    pub fn put_ticket(mut self, ticket: Ticket, expect: Precondition) -> Self {
        self.ops.push(BatchOp::PutTicket { ticket, expect });
        self
    }

    /// Adds a ticket removal.
    #[must_use]
    pub fn delete_ticket(mut self, id: TicketId, expect: Precondition) -> Self {
        self.ops.push(BatchOp::DeleteTicket { id, expect });
        self
    }

    /// Adds a payment upsert.
    #[must_use]
    pub fn put_payment(mut self, payment: Payment, expect: Precondition) -> Self {
        self.ops.push(BatchOp::PutPayment { payment, expect });
        self
    }

    /// Adds removal of every payment attached to a ticket.
    #[must_use]
    pub fn purge_payments(mut self, ticket_id: TicketId) -> Self {
        self.ops.push(BatchOp::PurgePayments { ticket_id });
        self
    }

    /// Adds a user upsert.
    #[must_use]
    pub fn put_user(mut self, user: User, expect: Precondition) -> Self {
        self.ops.push(BatchOp::PutUser { user, expect });
        self
    }

    /// Adds a chat message append.
    #[must_use]
    pub fn append_message(mut self, message: ChatMessage) -> Self {
        self.ops.push(BatchOp::AppendMessage { message });
        self
    }

    /// Adds removal of a ticket's chat history.
    #[must_use]
    pub fn purge_messages(mut self, ticket_id: TicketId) -> Self {
        self.ops.push(BatchOp::PurgeMessages { ticket_id });
        self
    }

    /// Adds an audit entry append.
    #[must_use]
    pub fn append_audit(mut self, entry: AuditLogEntry) -> Self {
        self.ops.push(BatchOp::AppendAudit { entry });
        self
    }

    /// The operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch into its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Storage contract for the lifecycle services.
///
/// Reads of mutable entities return [`Versioned`] snapshots so callers can
/// hand the versions back as commit preconditions. List queries return
/// plain documents; their sort orders are part of the contract and noted
/// per method.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>>;

    /// All users holding a role, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn users_with_role(&self, role: Role) -> StoreResult<Vec<User>>;

    /// Fetches a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn ticket(&self, id: TicketId) -> StoreResult<Option<Versioned<Ticket>>>;

    /// Tickets opened by a client, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn tickets_for_client(&self, client_id: UserId) -> StoreResult<Vec<Ticket>>;

    /// Tickets assigned to a technician, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn tickets_for_tech(&self, tech_id: UserId) -> StoreResult<Vec<Ticket>>;

    /// Unassigned tickets awaiting a technician, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn open_tickets(&self) -> StoreResult<Vec<Ticket>>;

    /// Fetches a payment by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Versioned<Payment>>>;

    /// The ticket's non-rejected payment, if one exists.
    ///
    /// At most one payment per ticket is ever active; rejected payments
    /// remain stored as inert audit records and are never returned here.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn active_payment_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> StoreResult<Option<Versioned<Payment>>>;

    /// Payments currently in a given status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn payments_with_status(&self, status: PaymentStatus) -> StoreResult<Vec<Payment>>;

    /// A ticket's chat history in creation-timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn messages_for_ticket(&self, ticket_id: TicketId) -> StoreResult<Vec<ChatMessage>>;

    /// Fetches a notification by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn notification(&self, id: NotificationId) -> StoreResult<Option<Notification>>;

    /// A user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn notifications_for_user(&self, user_id: UserId) -> StoreResult<Vec<Notification>>;

    /// Creates or replaces a notification.
    ///
    /// Notifications are presentation state: unversioned, last write wins.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn save_notification(&self, notification: Notification) -> StoreResult<()>;

    /// The most recent audit entries, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unavailable.
    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>>;

    /// Applies a batch atomically.
    ///
    /// Every precondition is checked before anything is written; the batch
    /// applies in order or not at all.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when any precondition fails,
    /// [`StoreError::Unavailable`] when the backend cannot commit.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
