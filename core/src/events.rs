//! Domain events emitted by lifecycle transitions.
//!
//! Every accepted transition produces exactly one event. Events carry the
//! identifiers and display facts notification routing needs, so the
//! dispatcher never has to load extra state to decide who hears about
//! what.

use serde::{Deserialize, Serialize};

use crate::types::{ActorRef, Money, PaymentId, Role, TicketId, UserId};

/// Audit-trail action labels, serialized in SCREAMING_SNAKE form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// A client opened a ticket.
    CreateTicket,
    /// A technician was assigned (by admin or self-accept).
    AssignTech,
    /// The technician priced the work, creating a payment.
    SetBudget,
    /// The client attached proof of payment.
    SubmitProof,
    /// The payment was confirmed (admin or gateway).
    ConfirmPayment,
    /// The payment was rejected.
    RejectPayment,
    /// The technician started working.
    StartExecution,
    /// The technician finished the work.
    FinishTicket,
    /// The client opened a dispute.
    OpenDispute,
    /// An admin settled a dispute.
    ResolveDispute,
    /// Title or description changed.
    EditTicket,
    /// The ticket was removed.
    DeleteTicket,
    /// The client rated the completed work.
    RateTicket,
    /// A chat message was admitted.
    SendMessage,
}

impl AuditAction {
    /// The audit-trail label for this action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTicket => "CREATE_TICKET",
            Self::AssignTech => "ASSIGN_TECH",
            Self::SetBudget => "SET_BUDGET",
            Self::SubmitProof => "SUBMIT_PROOF",
            Self::ConfirmPayment => "CONFIRM_PAYMENT",
            Self::RejectPayment => "REJECT_PAYMENT",
            Self::StartExecution => "START_EXECUTION",
            Self::FinishTicket => "FINISH_TICKET",
            Self::OpenDispute => "OPEN_DISPUTE",
            Self::ResolveDispute => "RESOLVE_DISPUTE",
            Self::EditTicket => "EDIT_TICKET",
            Self::DeleteTicket => "DELETE_TICKET",
            Self::RateTicket => "RATE_TICKET",
            Self::SendMessage => "SEND_MESSAGE",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an admin settled a dispute.
///
/// Binary for now; a partial-settlement variant would slot in here and be
/// handled at the single `match` in the dispute engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// Ticket cancelled, payment rejected, money back to the client.
    FavorClient,
    /// Ticket completed, payment confirmed, payout to the technician.
    FavorTech,
}

impl std::fmt::Display for DisputeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FavorClient => write!(f, "favor_client"),
            Self::FavorTech => write!(f, "favor_tech"),
        }
    }
}

/// One lifecycle fact, emitted by exactly one accepted transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A client opened a new ticket.
    TicketCreated {
        /// The new ticket.
        ticket_id: TicketId,
        /// The opening client.
        client_id: UserId,
        /// Ticket title, for notification text.
        title: String,
    },
    /// A technician was attached to an open ticket.
    TechAssigned {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician.
        tech_id: UserId,
        /// True when the technician accepted the ticket themselves.
        self_accepted: bool,
        /// Ticket title.
        title: String,
    },
    /// The technician priced the work and a payment was opened.
    BudgetSet {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician.
        tech_id: UserId,
        /// The new payment record.
        payment_id: PaymentId,
        /// Gross amount the client owes.
        amount: Money,
        /// Ticket title.
        title: String,
    },
    /// The client attached proof of payment.
    ProofSubmitted {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician.
        tech_id: UserId,
        /// The payment awaiting review.
        payment_id: PaymentId,
        /// Ticket title.
        title: String,
    },
    /// The payment settled in the technician's favor.
    PaymentConfirmed {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician.
        tech_id: UserId,
        /// The confirmed payment.
        payment_id: PaymentId,
        /// Admin or gateway.
        confirmed_by: ActorRef,
        /// Ticket title.
        title: String,
    },
    /// The payment was refused; the ticket reverted for re-budgeting.
    PaymentRejected {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician.
        tech_id: UserId,
        /// The rejected payment.
        payment_id: PaymentId,
        /// Ticket title.
        title: String,
    },
    /// The technician started working the ticket.
    ExecutionStarted {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The working technician.
        tech_id: UserId,
        /// Ticket title.
        title: String,
    },
    /// The technician finished the work.
    TicketFinished {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The technician who finished.
        tech_id: UserId,
        /// Ticket title.
        title: String,
    },
    /// The client escalated an in-progress ticket.
    DisputeOpened {
        /// The ticket.
        ticket_id: TicketId,
        /// The disputing client.
        client_id: UserId,
        /// The technician under dispute.
        tech_id: UserId,
        /// Why the client escalated.
        reason: String,
        /// Ticket title.
        title: String,
    },
    /// An admin settled a dispute.
    DisputeResolved {
        /// The ticket.
        ticket_id: TicketId,
        /// The client party.
        client_id: UserId,
        /// The technician party.
        tech_id: UserId,
        /// Which way it went.
        outcome: DisputeOutcome,
        /// Ticket title.
        title: String,
    },
    /// Title or description changed.
    TicketEdited {
        /// The ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// Ticket title after the edit.
        title: String,
    },
    /// The ticket was removed.
    TicketDeleted {
        /// The removed ticket.
        ticket_id: TicketId,
        /// The owning client.
        client_id: UserId,
        /// The assigned technician, if any.
        tech_id: Option<UserId>,
        /// Role of whoever deleted it.
        deleted_by: Role,
        /// Ticket title.
        title: String,
    },
    /// The client rated the completed work.
    TicketRated {
        /// The ticket.
        ticket_id: TicketId,
        /// The rating client.
        client_id: UserId,
        /// The rated technician.
        tech_id: UserId,
        /// Score in `1..=5`.
        score: u8,
        /// Ticket title.
        title: String,
    },
    /// A chat message passed moderation and was admitted.
    MessageSent {
        /// The ticket whose conversation grew.
        ticket_id: TicketId,
        /// The author.
        sender_id: UserId,
        /// The author's role.
        sender_role: Role,
        /// The ticket's owning client.
        client_id: UserId,
        /// The assigned technician, if any.
        tech_id: Option<UserId>,
        /// Ticket title.
        title: String,
    },
}

impl DomainEvent {
    /// The audit-trail action this event corresponds to.
    #[must_use]
    pub const fn action(&self) -> AuditAction {
        match self {
            Self::TicketCreated { .. } => AuditAction::CreateTicket,
            Self::TechAssigned { .. } => AuditAction::AssignTech,
            Self::BudgetSet { .. } => AuditAction::SetBudget,
            Self::ProofSubmitted { .. } => AuditAction::SubmitProof,
            Self::PaymentConfirmed { .. } => AuditAction::ConfirmPayment,
            Self::PaymentRejected { .. } => AuditAction::RejectPayment,
            Self::ExecutionStarted { .. } => AuditAction::StartExecution,
            Self::TicketFinished { .. } => AuditAction::FinishTicket,
            Self::DisputeOpened { .. } => AuditAction::OpenDispute,
            Self::DisputeResolved { .. } => AuditAction::ResolveDispute,
            Self::TicketEdited { .. } => AuditAction::EditTicket,
            Self::TicketDeleted { .. } => AuditAction::DeleteTicket,
            Self::TicketRated { .. } => AuditAction::RateTicket,
            Self::MessageSent { .. } => AuditAction::SendMessage,
        }
    }

    /// The ticket the event concerns.
    #[must_use]
    pub const fn ticket_id(&self) -> TicketId {
        match self {
            Self::TicketCreated { ticket_id, .. }
            | Self::TechAssigned { ticket_id, .. }
            | Self::BudgetSet { ticket_id, .. }
            | Self::ProofSubmitted { ticket_id, .. }
            | Self::PaymentConfirmed { ticket_id, .. }
            | Self::PaymentRejected { ticket_id, .. }
            | Self::ExecutionStarted { ticket_id, .. }
            | Self::TicketFinished { ticket_id, .. }
            | Self::DisputeOpened { ticket_id, .. }
            | Self::DisputeResolved { ticket_id, .. }
            | Self::TicketEdited { ticket_id, .. }
            | Self::TicketDeleted { ticket_id, .. }
            | Self::TicketRated { ticket_id, .. }
            | Self::MessageSent { ticket_id, .. } => *ticket_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_screaming_snake() {
        let json = serde_json::to_string(&AuditAction::StartExecution).unwrap();
        assert_eq!(json, "\"START_EXECUTION\"");
        assert_eq!(AuditAction::ConfirmPayment.as_str(), "CONFIRM_PAYMENT");
    }

    #[test]
    fn events_map_to_their_actions() {
        let event = DomainEvent::TicketCreated {
            ticket_id: TicketId::new(),
            client_id: UserId::new(),
            title: "printer".into(),
        };
        assert_eq!(event.action(), AuditAction::CreateTicket);
        assert_eq!(event.ticket_id(), event.ticket_id());
    }
}
