//! The lifecycle engines: pure decision code for tickets, payments and
//! disputes.
//!
//! Each engine call takes fresh entity snapshots, the acting party and a
//! payload, and either refuses with a [`LifecycleError`] or returns a
//! [`Transition`]: the full set of documents to write, the domain event the
//! change emits, and the audit entry recording it. Engines never perform
//! I/O; committing a transition atomically (and detecting concurrent
//! mutation) is the runtime's job.

use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use crate::error::LifecycleError;
use crate::events::DomainEvent;
use crate::types::{
    Actor, ActorRef, AuditLogEntry, AuditLogId, AuditTarget, ChatMessage, Payment, Role, Ticket,
    TicketId, TicketStatus, User,
};

pub mod dispute;
pub mod payment;
pub mod ticket;

/// One document write requested by a transition.
///
/// Entity writes are upserts from the engine's point of view; the runtime
/// attaches create/expected-version preconditions from the snapshots it
/// read, so a concurrent mutation fails the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or replace a ticket.
    Ticket(Ticket),
    /// Remove a ticket.
    DeleteTicket(TicketId),
    /// Create or replace a payment.
    Payment(Payment),
    /// Remove every payment attached to a ticket.
    PurgePayments(TicketId),
    /// Replace a user (rating fields only ever change).
    User(User),
    /// Append a chat message.
    Message(ChatMessage),
    /// Remove a ticket's chat history.
    PurgeMessages(TicketId),
}

/// The outcome of an accepted lifecycle decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Documents to write, all or nothing.
    pub writes: SmallVec<[Write; 4]>,
    /// The single domain event this transition emits.
    pub event: DomainEvent,
    /// The audit entry recording who did what.
    pub audit: AuditLogEntry,
}

impl Transition {
    /// Assembles a transition, deriving the audit entry from the event.
    pub(crate) fn assemble(
        writes: SmallVec<[Write; 4]>,
        event: DomainEvent,
        actor: ActorRef,
        target: AuditTarget,
        details: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let audit = AuditLogEntry {
            id: AuditLogId::new(),
            actor,
            action: event.action(),
            target,
            details,
            created_at: at,
        };
        Self {
            writes,
            event,
            audit,
        }
    }
}

// ─── Shared guards ─────────────────────────────────────────────────────────

pub(crate) fn ensure_admin(actor: &Actor, rule: &str) -> Result<(), LifecycleError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(rule))
    }
}

pub(crate) fn ensure_owning_client(
    ticket: &Ticket,
    actor: &Actor,
    rule: &str,
) -> Result<(), LifecycleError> {
    if actor.role == Role::Client && ticket.is_owned_by(actor.id) {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(rule))
    }
}

pub(crate) fn ensure_assigned_tech(
    ticket: &Ticket,
    actor: &Actor,
    rule: &str,
) -> Result<(), LifecycleError> {
    if actor.role == Role::Tech && ticket.is_assigned_to(actor.id) {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(rule))
    }
}

pub(crate) fn ensure_ticket_status(
    ticket: &Ticket,
    expected: TicketStatus,
    action: &str,
) -> Result<(), LifecycleError> {
    if ticket.status == expected {
        Ok(())
    } else {
        Err(LifecycleError::invalid_state(format!(
            "ticket must be {expected} to {action} (currently {})",
            ticket.status
        )))
    }
}

/// A payment snapshot must belong to the ticket snapshot handed alongside.
pub(crate) fn ensure_payment_matches(
    ticket: &Ticket,
    payment: &Payment,
) -> Result<(), LifecycleError> {
    if payment.ticket_id == ticket.id {
        Ok(())
    } else {
        Err(LifecycleError::validation(format!(
            "payment {} does not belong to ticket {}",
            payment.id, ticket.id
        )))
    }
}

pub(crate) fn ensure_nonempty(value: &str, rule: &str) -> Result<String, LifecycleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LifecycleError::validation(rule.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Snapshot builders shared by the engine test modules.
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use chrono::Utc;

    use crate::environment::{Environment, SystemClock};
    use crate::types::{
        Actor, FeePercent, Money, PaymentStatus, Role, Ticket, TicketStatus, User, UserId,
        UserStatus,
    };

    use super::*;

    pub fn env() -> Environment {
        Environment::new(Arc::new(SystemClock), FeePercent::STANDARD)
    }

    pub fn user(role: Role) -> User {
        User {
            id: UserId::new(),
            name: format!("{role} user"),
            email: format!("{role}@example.test"),
            role,
            status: UserStatus::Active,
            rating: None,
            total_ratings: 0,
            created_at: Utc::now(),
        }
    }

    pub fn actor_for(user: &User) -> Actor {
        Actor::new(user.id, user.role)
    }

    pub fn open_ticket(client: &User) -> Ticket {
        Ticket {
            id: TicketId::new(),
            client_id: client.id,
            tech_id: None,
            status: TicketStatus::Open,
            title: "Printer will not print".into(),
            category: "Hardware".into(),
            description: "It beeps three times and gives up.".into(),
            image_url: None,
            platform_fee_pct: FeePercent::STANDARD,
            budget_amount: None,
            dispute_reason: None,
            rating: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn ticket_at(client: &User, tech: &User, status: TicketStatus) -> Ticket {
        let mut ticket = open_ticket(client);
        ticket.tech_id = Some(tech.id);
        ticket.status = status;
        if matches!(
            status,
            TicketStatus::AwaitingPayment
                | TicketStatus::Paid
                | TicketStatus::InProgress
                | TicketStatus::Completed
                | TicketStatus::Disputed
        ) {
            ticket.budget_amount = Some(Money::from_major(100));
        }
        ticket
    }

    pub fn payment_for(ticket: &Ticket, status: PaymentStatus) -> Payment {
        let split = crate::ledger::PaymentSplit::compute(
            ticket.budget_amount.unwrap_or(Money::from_major(100)),
            ticket.platform_fee_pct,
        );
        Payment {
            id: crate::types::PaymentId::new(),
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: ticket.tech_id.unwrap(),
            status,
            amount_total: split.total,
            platform_fee: split.platform_fee,
            tech_receives: split.tech_receives,
            proof_text: None,
            proof_image_url: None,
            confirmed_by: None,
            confirmed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Pulls the updated ticket out of a transition's writes.
    pub fn written_ticket(transition: &Transition) -> &Ticket {
        transition
            .writes
            .iter()
            .find_map(|write| match write {
                Write::Ticket(ticket) => Some(ticket),
                _ => None,
            })
            .unwrap()
    }

    /// Pulls the written payment out of a transition's writes.
    pub fn written_payment(transition: &Transition) -> &Payment {
        transition
            .writes
            .iter()
            .find_map(|write| match write {
                Write::Payment(payment) => Some(payment),
                _ => None,
            })
            .unwrap()
    }
}
