//! In-memory reference implementation of the document store.
//!
//! Documents live in [`tokio::sync::RwLock`]-guarded maps with a version
//! counter per document. `commit` checks every precondition against the
//! state as it was before the batch, then applies the operations in order,
//! all under one write guard — so a batch is atomic and a stale version
//! conflicts without anything being written.
//!
//! Every mutation emits a [`ChangeEvent`] on a broadcast channel;
//! [`InMemoryStore::subscribe`] hands out a [`ChangeStream`] that
//! unsubscribes when dropped. Listings that sort on timestamps break ties
//! on the document id so their order is stable.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

use remotedesk_core::types::{
    AuditLogEntry, ChatMessage, Notification, NotificationId, Payment, PaymentId, PaymentStatus,
    Role, Ticket, TicketId, TicketStatus, User, UserId,
};

use crate::store::{
    BatchOp, DocumentStore, Precondition, StoreError, StoreResult, Versioned, WriteBatch,
};

/// Default capacity of the change broadcast channel.
const DEFAULT_CHANGE_CAPACITY: usize = 64;

/// A change applied by the store, for live views and tests.
///
/// Purges emit no events of their own; they only ever ride along with the
/// removal of their owning ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A ticket was created or updated.
    TicketUpserted {
        /// The ticket.
        id: TicketId,
        /// Its new version.
        version: u64,
    },
    /// A ticket was removed.
    TicketRemoved {
        /// The ticket.
        id: TicketId,
    },
    /// A payment was created or updated.
    PaymentUpserted {
        /// The payment.
        id: PaymentId,
        /// Its new version.
        version: u64,
    },
    /// A user was created or updated.
    UserUpserted {
        /// The user.
        id: UserId,
        /// Its new version.
        version: u64,
    },
    /// A chat message was appended.
    MessageAppended {
        /// The ticket whose conversation grew.
        ticket_id: TicketId,
    },
    /// A notification was created or updated.
    NotificationSaved {
        /// The recipient.
        user_id: UserId,
    },
}

/// A live feed of store changes.
///
/// Dropping the stream unsubscribes it. A slow consumer that falls behind
/// the channel capacity skips the missed events with a warning rather than
/// stalling the store.
#[derive(Debug)]
pub struct ChangeStream {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeStream {
    /// Waits for the next change, or `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change stream lagged, skipping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Debug, Default)]
struct Documents {
    users: HashMap<UserId, Versioned<User>>,
    tickets: HashMap<TicketId, Versioned<Ticket>>,
    payments: HashMap<PaymentId, Versioned<Payment>>,
    messages: Vec<ChatMessage>,
    notifications: HashMap<NotificationId, Notification>,
    audit: Vec<AuditLogEntry>,
}

impl Documents {
    fn version_for(&self, op: &BatchOp) -> Option<u64> {
        match op {
            BatchOp::PutTicket { ticket, .. } => {
                self.tickets.get(&ticket.id).map(|stored| stored.version)
            }
            BatchOp::DeleteTicket { id, .. } => self.tickets.get(id).map(|stored| stored.version),
            BatchOp::PutPayment { payment, .. } => {
                self.payments.get(&payment.id).map(|stored| stored.version)
            }
            BatchOp::PutUser { user, .. } => self.users.get(&user.id).map(|stored| stored.version),
            BatchOp::PurgePayments { .. }
            | BatchOp::AppendMessage { .. }
            | BatchOp::PurgeMessages { .. }
            | BatchOp::AppendAudit { .. } => None,
        }
    }
}

/// In-memory [`DocumentStore`] backed by tokio locks.
#[derive(Debug)]
pub struct InMemoryStore {
    docs: RwLock<Documents>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryStore {
    /// Creates an empty store with the default change-channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_change_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Creates an empty store with a custom change-channel capacity.
    ///
    /// Raise the capacity when many slow subscribers watch a busy store.
    #[must_use]
    pub fn with_change_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            docs: RwLock::new(Documents::default()),
            changes,
        }
    }

    /// Subscribes to changes applied after this call.
    #[must_use]
    pub fn subscribe(&self) -> ChangeStream {
        ChangeStream {
            rx: self.changes.subscribe(),
        }
    }

    fn emit(&self, event: ChangeEvent) {
        // Err means no live subscribers, which is fine.
        let _ = self.changes.send(event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

const fn precondition_holds(expect: Precondition, current: Option<u64>) -> bool {
    match (expect, current) {
        (Precondition::Absent, None) | (Precondition::Any, _) => true,
        (Precondition::Version(expected), Some(actual)) => expected == actual,
        (Precondition::Absent | Precondition::Version(_), _) => false,
    }
}

const fn entity_label(op: &BatchOp) -> &'static str {
    match op {
        BatchOp::PutTicket { .. } | BatchOp::DeleteTicket { .. } | BatchOp::PurgeMessages { .. } => {
            "ticket"
        }
        BatchOp::PutPayment { .. } | BatchOp::PurgePayments { .. } => "payment",
        BatchOp::PutUser { .. } => "user",
        BatchOp::AppendMessage { .. } => "message",
        BatchOp::AppendAudit { .. } => "audit",
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>> {
        Ok(self.docs.read().await.users.get(&id).cloned())
    }

    async fn users_with_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let docs = self.docs.read().await;
        let mut users: Vec<User> = docs
            .users
            .values()
            .filter(|stored| stored.doc.role == role)
            .map(|stored| stored.doc.clone())
            .collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(users)
    }

    async fn ticket(&self, id: TicketId) -> StoreResult<Option<Versioned<Ticket>>> {
        Ok(self.docs.read().await.tickets.get(&id).cloned())
    }

    async fn tickets_for_client(&self, client_id: UserId) -> StoreResult<Vec<Ticket>> {
        let docs = self.docs.read().await;
        Ok(newest_first(
            docs.tickets
                .values()
                .filter(|stored| stored.doc.client_id == client_id)
                .map(|stored| stored.doc.clone()),
        ))
    }

    async fn tickets_for_tech(&self, tech_id: UserId) -> StoreResult<Vec<Ticket>> {
        let docs = self.docs.read().await;
        Ok(newest_first(
            docs.tickets
                .values()
                .filter(|stored| stored.doc.tech_id == Some(tech_id))
                .map(|stored| stored.doc.clone()),
        ))
    }

    async fn open_tickets(&self) -> StoreResult<Vec<Ticket>> {
        let docs = self.docs.read().await;
        Ok(newest_first(
            docs.tickets
                .values()
                .filter(|stored| stored.doc.status == TicketStatus::Open)
                .map(|stored| stored.doc.clone()),
        ))
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Versioned<Payment>>> {
        Ok(self.docs.read().await.payments.get(&id).cloned())
    }

    async fn active_payment_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> StoreResult<Option<Versioned<Payment>>> {
        let docs = self.docs.read().await;
        Ok(docs
            .payments
            .values()
            .filter(|stored| stored.doc.ticket_id == ticket_id && stored.doc.status.is_active())
            .max_by_key(|stored| (stored.doc.created_at, *stored.doc.id.as_uuid()))
            .cloned())
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> StoreResult<Vec<Payment>> {
        let docs = self.docs.read().await;
        let mut payments: Vec<Payment> = docs
            .payments
            .values()
            .filter(|stored| stored.doc.status == status)
            .map(|stored| stored.doc.clone())
            .collect();
        payments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(payments)
    }

    async fn messages_for_ticket(&self, ticket_id: TicketId) -> StoreResult<Vec<ChatMessage>> {
        let docs = self.docs.read().await;
        let mut messages: Vec<ChatMessage> = docs
            .messages
            .iter()
            .filter(|message| message.ticket_id == ticket_id)
            .cloned()
            .collect();
        // Stable sort keeps append order for identical timestamps.
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }

    async fn notification(&self, id: NotificationId) -> StoreResult<Option<Notification>> {
        Ok(self.docs.read().await.notifications.get(&id).cloned())
    }

    async fn notifications_for_user(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        let docs = self.docs.read().await;
        let mut notifications: Vec<Notification> = docs
            .notifications
            .values()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(notifications)
    }

    async fn save_notification(&self, notification: Notification) -> StoreResult<()> {
        let user_id = notification.user_id;
        self.docs
            .write()
            .await
            .notifications
            .insert(notification.id, notification);
        self.emit(ChangeEvent::NotificationSaved { user_id });
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>> {
        let docs = self.docs.read().await;
        Ok(docs.audit.iter().rev().take(limit).cloned().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut docs = self.docs.write().await;

        // Preconditions are evaluated against the state before the batch.
        for op in batch.ops() {
            let expect = match op {
                BatchOp::PutTicket { expect, .. }
                | BatchOp::DeleteTicket { expect, .. }
                | BatchOp::PutPayment { expect, .. }
                | BatchOp::PutUser { expect, .. } => *expect,
                BatchOp::PurgePayments { .. }
                | BatchOp::AppendMessage { .. }
                | BatchOp::PurgeMessages { .. }
                | BatchOp::AppendAudit { .. } => Precondition::Any,
            };
            if !precondition_holds(expect, docs.version_for(op)) {
                return Err(StoreError::Conflict {
                    entity: entity_label(op),
                });
            }
        }

        let mut events = Vec::with_capacity(batch.len());
        for op in batch.into_ops() {
            match op {
                BatchOp::PutTicket { ticket, .. } => {
                    let version = docs
                        .tickets
                        .get(&ticket.id)
                        .map_or(1, |stored| stored.version + 1);
                    events.push(ChangeEvent::TicketUpserted {
                        id: ticket.id,
                        version,
                    });
                    docs.tickets.insert(ticket.id, Versioned::new(ticket, version));
                }
                BatchOp::DeleteTicket { id, .. } => {
                    docs.tickets.remove(&id);
                    events.push(ChangeEvent::TicketRemoved { id });
                }
                BatchOp::PutPayment { payment, .. } => {
                    let version = docs
                        .payments
                        .get(&payment.id)
                        .map_or(1, |stored| stored.version + 1);
                    events.push(ChangeEvent::PaymentUpserted {
                        id: payment.id,
                        version,
                    });
                    docs.payments
                        .insert(payment.id, Versioned::new(payment, version));
                }
                BatchOp::PurgePayments { ticket_id } => {
                    docs.payments.retain(|_, stored| stored.doc.ticket_id != ticket_id);
                }
                BatchOp::PutUser { user, .. } => {
                    let version = docs
                        .users
                        .get(&user.id)
                        .map_or(1, |stored| stored.version + 1);
                    events.push(ChangeEvent::UserUpserted {
                        id: user.id,
                        version,
                    });
                    docs.users.insert(user.id, Versioned::new(user, version));
                }
                BatchOp::AppendMessage { message } => {
                    events.push(ChangeEvent::MessageAppended {
                        ticket_id: message.ticket_id,
                    });
                    docs.messages.push(message);
                }
                BatchOp::PurgeMessages { ticket_id } => {
                    docs.messages.retain(|message| message.ticket_id != ticket_id);
                }
                BatchOp::AppendAudit { entry } => {
                    docs.audit.push(entry);
                }
            }
        }
        drop(docs);

        for event in events {
            self.emit(event);
        }
        Ok(())
    }
}

fn newest_first(tickets: impl Iterator<Item = Ticket>) -> Vec<Ticket> {
    let mut tickets: Vec<Ticket> = tickets.collect();
    tickets.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
    });
    tickets
}
