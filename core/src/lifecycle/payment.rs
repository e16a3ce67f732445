//! The payment state machine.
//!
//! `Pending → ProofSubmitted → Confirmed | Rejected`. A payment is born
//! when the assigned technician prices the work; its three amounts come
//! from [`PaymentSplit`] and are never recomputed. Confirmation marks the
//! ticket `Paid`; rejection keeps the payment on file and returns the
//! ticket to `Assigned` for a fresh budget.

use smallvec::smallvec;

use crate::environment::{Clock, Environment};
use crate::error::LifecycleError;
use crate::events::DomainEvent;
use crate::ledger::PaymentSplit;
use crate::types::{
    Actor, ActorRef, AuditTarget, Money, Payment, PaymentId, PaymentStatus, Role, Ticket,
    TicketStatus,
};

use super::{
    Transition, Write, ensure_admin, ensure_assigned_tech, ensure_payment_matches,
    ensure_ticket_status,
};

/// Client-supplied evidence that a payment was made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentProof {
    /// Free-text description of the payment.
    pub text: Option<String>,
    /// Reference to an uploaded receipt image.
    pub image_url: Option<String>,
}

/// Decision logic for the payment state machine.
pub struct PaymentEngine;

impl PaymentEngine {
    /// The assigned technician prices the work, opening a payment.
    ///
    /// Splits the amount at the ticket's snapshotted fee rate and moves
    /// the ticket to `AwaitingPayment` in the same transition.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the assigned technician;
    /// `InvalidState` unless the ticket is `Assigned` with no active
    /// payment; `Validation` for a non-positive amount.
    pub fn set_budget(
        ticket: &Ticket,
        amount: Money,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Tech {
            return Err(LifecycleError::unauthorized(
                "only a technician may set a budget",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::Assigned, "receive a budget")?;
        ensure_assigned_tech(
            ticket,
            actor,
            "only the assigned technician may set the budget",
        )?;
        if ticket.budget_amount.is_some() {
            return Err(LifecycleError::invalid_state(
                "ticket already has an active payment",
            ));
        }
        if amount.is_zero() {
            return Err(LifecycleError::validation(
                "budget amount must be positive",
            ));
        }

        let now = env.clock.now();
        let split = PaymentSplit::compute(amount, ticket.platform_fee_pct);
        let payment = Payment {
            id: PaymentId::new(),
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: actor.id,
            status: PaymentStatus::Pending,
            amount_total: split.total,
            platform_fee: split.platform_fee,
            tech_receives: split.tech_receives,
            proof_text: None,
            proof_image_url: None,
            confirmed_by: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };
        let updated = Ticket {
            status: TicketStatus::AwaitingPayment,
            budget_amount: Some(amount),
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::BudgetSet {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: actor.id,
            payment_id: payment.id,
            amount,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated), Write::Payment(payment)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(format!(
                "budget {} (fee {}, tech receives {})",
                split.total, split.platform_fee, split.tech_receives
            )),
            now,
        ))
    }

    /// The paying client attaches proof of payment.
    ///
    /// The ticket stays in `AwaitingPayment`; only the payment advances.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the paying client;
    /// `InvalidState` unless the payment is `Pending`; `Validation` when
    /// neither text nor image reference is supplied.
    pub fn submit_proof(
        ticket: &Ticket,
        payment: &Payment,
        proof: PaymentProof,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Client {
            return Err(LifecycleError::unauthorized(
                "only a client may submit proof of payment",
            ));
        }
        ensure_payment_matches(ticket, payment)?;
        if payment.status != PaymentStatus::Pending {
            return Err(LifecycleError::invalid_state(format!(
                "proof may only be submitted while the payment is pending (currently {})",
                payment.status
            )));
        }
        if payment.client_id != actor.id {
            return Err(LifecycleError::unauthorized(
                "only the paying client may submit proof",
            ));
        }
        let text = normalize(proof.text);
        let image_url = normalize(proof.image_url);
        if text.is_none() && image_url.is_none() {
            return Err(LifecycleError::validation(
                "proof requires text or an image reference",
            ));
        }

        let now = env.clock.now();
        let updated = Payment {
            status: PaymentStatus::ProofSubmitted,
            proof_text: text,
            proof_image_url: image_url,
            updated_at: now,
            ..payment.clone()
        };
        let event = DomainEvent::ProofSubmitted {
            ticket_id: ticket.id,
            client_id: actor.id,
            tech_id: payment.tech_id,
            payment_id: payment.id,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Payment(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Payment(payment.id),
            Some("proof of payment submitted".to_string()),
            now,
        ))
    }

    /// An admin confirms the payment, marking the ticket `Paid`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is an admin; `InvalidState` when
    /// the payment is already settled or the ticket is not awaiting
    /// payment.
    pub fn confirm(
        ticket: &Ticket,
        payment: &Payment,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        ensure_admin(actor, "only an admin may confirm a payment")?;
        Self::apply_confirm(ticket, payment, ActorRef::User(actor.id), env)
    }

    /// The payment gateway confirms after verifying its checkout session.
    ///
    /// Same effect as [`PaymentEngine::confirm`], recorded with the
    /// gateway as the acting party.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the payment is already settled or the ticket is
    /// not awaiting payment.
    pub fn confirm_by_gateway(
        ticket: &Ticket,
        payment: &Payment,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        Self::apply_confirm(ticket, payment, ActorRef::Gateway, env)
    }

    /// An admin rejects the payment.
    ///
    /// The payment stays on file as `Rejected`; the ticket returns to
    /// `Assigned` with its budget cleared so the technician can price the
    /// work again.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is an admin; `InvalidState` when
    /// the payment is already settled or the ticket is not awaiting
    /// payment.
    pub fn reject(
        ticket: &Ticket,
        payment: &Payment,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        ensure_admin(actor, "only an admin may reject a payment")?;
        ensure_payment_matches(ticket, payment)?;
        ensure_settleable(payment)?;
        ensure_ticket_status(ticket, TicketStatus::AwaitingPayment, "have its payment rejected")?;

        let now = env.clock.now();
        let updated_payment = Payment {
            status: PaymentStatus::Rejected,
            updated_at: now,
            ..payment.clone()
        };
        let updated_ticket = Ticket {
            status: TicketStatus::Assigned,
            budget_amount: None,
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::PaymentRejected {
            ticket_id: ticket.id,
            client_id: payment.client_id,
            tech_id: payment.tech_id,
            payment_id: payment.id,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated_ticket), Write::Payment(updated_payment)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Payment(payment.id),
            Some("payment rejected; ticket returned for re-budgeting".to_string()),
            now,
        ))
    }

    fn apply_confirm(
        ticket: &Ticket,
        payment: &Payment,
        by: ActorRef,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        ensure_payment_matches(ticket, payment)?;
        ensure_settleable(payment)?;
        ensure_ticket_status(ticket, TicketStatus::AwaitingPayment, "be marked paid")?;

        let now = env.clock.now();
        let updated_payment = Payment {
            status: PaymentStatus::Confirmed,
            confirmed_by: Some(by),
            confirmed_at: Some(now),
            updated_at: now,
            ..payment.clone()
        };
        let updated_ticket = Ticket {
            status: TicketStatus::Paid,
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::PaymentConfirmed {
            ticket_id: ticket.id,
            client_id: payment.client_id,
            tech_id: payment.tech_id,
            payment_id: payment.id,
            confirmed_by: by,
            title: ticket.title.clone(),
        };
        let details = match by {
            ActorRef::User(_) => "payment confirmed".to_string(),
            ActorRef::Gateway => "payment confirmed via gateway verification".to_string(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated_ticket), Write::Payment(updated_payment)],
            event,
            by,
            AuditTarget::Payment(payment.id),
            Some(details),
            now,
        ))
    }
}

/// A payment may settle only while `Pending` or `ProofSubmitted`.
fn ensure_settleable(payment: &Payment) -> Result<(), LifecycleError> {
    match payment.status {
        PaymentStatus::Pending | PaymentStatus::ProofSubmitted => Ok(()),
        settled => Err(LifecycleError::invalid_state(format!(
            "payment already settled (currently {settled})"
        ))),
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::events::AuditAction;
    use crate::lifecycle::test_support::{
        actor_for, env, open_ticket, payment_for, ticket_at, user, written_payment,
        written_ticket,
    };

    use super::*;

    #[test]
    fn budget_creates_pending_payment_with_split() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let mut ticket = ticket_at(&client, &tech, TicketStatus::Assigned);
        ticket.budget_amount = None;

        let transition = PaymentEngine::set_budget(
            &ticket,
            Money::from_major(100),
            &actor_for(&tech),
            &env(),
        )
        .unwrap();

        let payment = written_payment(&transition);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount_total, Money::from_major(100));
        assert_eq!(payment.platform_fee, Money::from_major(20));
        assert_eq!(payment.tech_receives, Money::from_major(80));
        assert_eq!(payment.client_id, client.id);
        assert_eq!(payment.tech_id, tech.id);

        let updated = written_ticket(&transition);
        assert_eq!(updated.status, TicketStatus::AwaitingPayment);
        assert_eq!(updated.budget_amount, Some(Money::from_major(100)));
        assert_eq!(transition.audit.action, AuditAction::SetBudget);
    }

    #[test]
    fn budget_on_open_ticket_is_invalid_state() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = open_ticket(&client);

        let err = PaymentEngine::set_budget(
            &ticket,
            Money::from_major(100),
            &actor_for(&tech),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
    }

    #[test]
    fn only_the_assigned_tech_budgets() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let other_tech = user(Role::Tech);
        let mut ticket = ticket_at(&client, &tech, TicketStatus::Assigned);
        ticket.budget_amount = None;

        let err = PaymentEngine::set_budget(
            &ticket,
            Money::from_major(100),
            &actor_for(&other_tech),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));

        let err = PaymentEngine::set_budget(
            &ticket,
            Money::from_major(100),
            &actor_for(&client),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let mut ticket = ticket_at(&client, &tech, TicketStatus::Assigned);
        ticket.budget_amount = None;

        let err =
            PaymentEngine::set_budget(&ticket, Money::ZERO, &actor_for(&tech), &env())
                .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[test]
    fn client_submits_proof() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let transition = PaymentEngine::submit_proof(
            &ticket,
            &payment,
            PaymentProof {
                text: Some("wire transfer, reference 8841".into()),
                image_url: None,
            },
            &actor_for(&client),
            &env(),
        )
        .unwrap();

        let updated = written_payment(&transition);
        assert_eq!(updated.status, PaymentStatus::ProofSubmitted);
        assert_eq!(
            updated.proof_text.as_deref(),
            Some("wire transfer, reference 8841")
        );
    }

    #[test]
    fn someone_elses_client_cannot_submit_proof() {
        let client = user(Role::Client);
        let other_client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let err = PaymentEngine::submit_proof(
            &ticket,
            &payment,
            PaymentProof {
                text: Some("not mine".into()),
                image_url: None,
            },
            &actor_for(&other_client),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }

    #[test]
    fn proof_twice_is_invalid_state() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::ProofSubmitted);

        let err = PaymentEngine::submit_proof(
            &ticket,
            &payment,
            PaymentProof {
                text: Some("again".into()),
                image_url: None,
            },
            &actor_for(&client),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
    }

    #[test]
    fn empty_proof_is_rejected() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let err = PaymentEngine::submit_proof(
            &ticket,
            &payment,
            PaymentProof::default(),
            &actor_for(&client),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[test]
    fn admin_confirms_and_ticket_goes_paid() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);

        for status in [PaymentStatus::Pending, PaymentStatus::ProofSubmitted] {
            let payment = payment_for(&ticket, status);
            let transition =
                PaymentEngine::confirm(&ticket, &payment, &actor_for(&admin), &env()).unwrap();

            let updated_payment = written_payment(&transition);
            assert_eq!(updated_payment.status, PaymentStatus::Confirmed);
            assert_eq!(updated_payment.confirmed_by, Some(ActorRef::User(admin.id)));
            assert!(updated_payment.confirmed_at.is_some());
            assert_eq!(written_ticket(&transition).status, TicketStatus::Paid);
        }
    }

    #[test]
    fn client_cannot_confirm_even_with_proof_submitted() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::ProofSubmitted);

        let err =
            PaymentEngine::confirm(&ticket, &payment, &actor_for(&client), &env()).unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }

    #[test]
    fn confirming_a_settled_payment_fails() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);

        for status in [PaymentStatus::Confirmed, PaymentStatus::Rejected] {
            let payment = payment_for(&ticket, status);
            let err = PaymentEngine::confirm(&ticket, &payment, &actor_for(&admin), &env())
                .unwrap_err();
            assert!(matches!(err, LifecycleError::InvalidState { .. }));
        }
    }

    #[test]
    fn gateway_confirmation_records_the_gateway() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let transition = PaymentEngine::confirm_by_gateway(&ticket, &payment, &env()).unwrap();
        let updated = written_payment(&transition);
        assert_eq!(updated.confirmed_by, Some(ActorRef::Gateway));
        assert_eq!(transition.audit.actor, ActorRef::Gateway);
        assert_eq!(written_ticket(&transition).status, TicketStatus::Paid);
    }

    #[test]
    fn rejection_reverts_ticket_for_rebudgeting() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::ProofSubmitted);

        let transition =
            PaymentEngine::reject(&ticket, &payment, &actor_for(&admin), &env()).unwrap();

        assert_eq!(written_payment(&transition).status, PaymentStatus::Rejected);
        let updated_ticket = written_ticket(&transition);
        assert_eq!(updated_ticket.status, TicketStatus::Assigned);
        assert!(updated_ticket.budget_amount.is_none());
        assert_eq!(transition.audit.action, AuditAction::RejectPayment);
    }

    #[test]
    fn only_admins_reject() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let err =
            PaymentEngine::reject(&ticket, &payment, &actor_for(&tech), &env()).unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }

    #[test]
    fn mismatched_payment_snapshot_is_rejected() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let other_ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&other_ticket, PaymentStatus::Pending);

        let err =
            PaymentEngine::confirm(&ticket, &payment, &actor_for(&admin), &env()).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[test]
    fn rebudget_after_rejection_round_trips() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::AwaitingPayment);
        let payment = payment_for(&ticket, PaymentStatus::Pending);

        let rejected =
            PaymentEngine::reject(&ticket, &payment, &actor_for(&admin), &env()).unwrap();
        let reverted = written_ticket(&rejected).clone();

        // The reverted ticket accepts a fresh budget.
        let transition = PaymentEngine::set_budget(
            &reverted,
            Money::from_major(90),
            &actor_for(&tech),
            &env(),
        )
        .unwrap();
        let second = written_payment(&transition);
        assert_eq!(second.status, PaymentStatus::Pending);
        assert_eq!(second.amount_total, Money::from_major(90));
        assert_ne!(second.id, payment.id);
    }
}
