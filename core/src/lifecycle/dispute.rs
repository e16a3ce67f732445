//! Dispute settlement.
//!
//! A dispute is a ticket in `Disputed` carrying a reason, not a separate
//! entity. Settlement is admin-only and binary, and always lands ticket
//! and payment together in one atomic transition: favor the client and
//! the ticket cancels while the payment rejects (money back); favor the
//! technician and the ticket completes while the payment confirms
//! (payout). Moving a confirmed payment to rejected here is the single
//! exception to confirmed-is-terminal.

use smallvec::{SmallVec, smallvec};

use crate::environment::{Clock, Environment};
use crate::error::LifecycleError;
use crate::events::{DisputeOutcome, DomainEvent};
use crate::types::{
    Actor, ActorRef, AuditTarget, Payment, PaymentStatus, Ticket, TicketStatus,
};

use super::{Transition, Write, ensure_admin, ensure_payment_matches, ensure_ticket_status};

/// Decision logic for settling disputes.
pub struct DisputeEngine;

impl DisputeEngine {
    /// An admin settles a disputed ticket one way or the other.
    ///
    /// `payment` is the ticket's active payment, if one exists; both
    /// entities land in the same transition so neither outcome can apply
    /// halfway.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is an admin; `InvalidState` unless
    /// the ticket is `Disputed`; `Validation` when the payment snapshot
    /// belongs to another ticket.
    pub fn resolve(
        ticket: &Ticket,
        payment: Option<&Payment>,
        outcome: DisputeOutcome,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        ensure_admin(actor, "only an admin may resolve a dispute")?;
        ensure_ticket_status(ticket, TicketStatus::Disputed, "be resolved")?;
        if let Some(payment) = payment {
            ensure_payment_matches(ticket, payment)?;
        }
        let Some(tech_id) = ticket.tech_id else {
            // Disputed guarantees an assignee; guard the invariant anyway.
            return Err(LifecycleError::invalid_state(
                "ticket has no assigned technician",
            ));
        };

        let now = env.clock.now();
        let ticket_status = match outcome {
            DisputeOutcome::FavorClient => TicketStatus::Cancelled,
            DisputeOutcome::FavorTech => TicketStatus::Completed,
        };
        let updated_ticket = Ticket {
            status: ticket_status,
            updated_at: now,
            ..ticket.clone()
        };

        let mut writes: SmallVec<[Write; 4]> = smallvec![Write::Ticket(updated_ticket)];
        if let Some(payment) = payment {
            let settled = match outcome {
                DisputeOutcome::FavorClient => Payment {
                    status: PaymentStatus::Rejected,
                    updated_at: now,
                    ..payment.clone()
                },
                DisputeOutcome::FavorTech => Payment {
                    status: PaymentStatus::Confirmed,
                    // Keep the original confirmation record when the
                    // payment had already settled before the dispute.
                    confirmed_by: payment
                        .confirmed_by
                        .or(Some(ActorRef::User(actor.id))),
                    confirmed_at: payment.confirmed_at.or(Some(now)),
                    updated_at: now,
                    ..payment.clone()
                },
            };
            writes.push(Write::Payment(settled));
        }

        let event = DomainEvent::DisputeResolved {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id,
            outcome,
            title: ticket.title.clone(),
        };
        let side = match outcome {
            DisputeOutcome::FavorClient => "client",
            DisputeOutcome::FavorTech => "technician",
        };
        let details = match &ticket.dispute_reason {
            Some(reason) => format!("dispute resolved in favor of the {side} (reason: {reason})"),
            None => format!("dispute resolved in favor of the {side}"),
        };
        Ok(Transition::assemble(
            writes,
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(details),
            now,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::events::AuditAction;
    use crate::lifecycle::test_support::{
        actor_for, env, payment_for, ticket_at, user, written_payment, written_ticket,
    };
    use crate::types::Role;

    use super::*;

    fn disputed_ticket() -> (crate::types::User, crate::types::User, Ticket) {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let mut ticket = ticket_at(&client, &tech, TicketStatus::Disputed);
        ticket.dispute_reason = Some("technician unresponsive".into());
        (client, tech, ticket)
    }

    #[test]
    fn favor_tech_completes_and_confirms_together() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);
        let payment = payment_for(&ticket, PaymentStatus::Confirmed);

        let transition = DisputeEngine::resolve(
            &ticket,
            Some(&payment),
            DisputeOutcome::FavorTech,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        // Both entities settle in the same atomic transition.
        assert_eq!(transition.writes.len(), 2);
        assert_eq!(written_ticket(&transition).status, TicketStatus::Completed);
        assert_eq!(written_payment(&transition).status, PaymentStatus::Confirmed);
        assert_eq!(transition.audit.action, AuditAction::ResolveDispute);
    }

    #[test]
    fn favor_client_cancels_and_rejects_together() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);
        // Disputes arise after payment, so the payment is confirmed; the
        // settlement override moves it to rejected.
        let payment = payment_for(&ticket, PaymentStatus::Confirmed);

        let transition = DisputeEngine::resolve(
            &ticket,
            Some(&payment),
            DisputeOutcome::FavorClient,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        assert_eq!(written_ticket(&transition).status, TicketStatus::Cancelled);
        assert_eq!(written_payment(&transition).status, PaymentStatus::Rejected);
    }

    #[test]
    fn dispute_reason_is_preserved() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);

        let transition = DisputeEngine::resolve(
            &ticket,
            None,
            DisputeOutcome::FavorClient,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        assert_eq!(
            written_ticket(&transition).dispute_reason.as_deref(),
            Some("technician unresponsive")
        );
        assert!(transition.audit.details.as_deref().unwrap().contains("unresponsive"));
    }

    #[test]
    fn only_admins_resolve() {
        let (client, tech, ticket) = disputed_ticket();
        for loser in [client, tech] {
            let err = DisputeEngine::resolve(
                &ticket,
                None,
                DisputeOutcome::FavorClient,
                &actor_for(&loser),
                &env(),
            )
            .unwrap_err();
            assert!(matches!(err, LifecycleError::Unauthorized { .. }));
        }
    }

    #[test]
    fn only_disputed_tickets_resolve() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);

        let err = DisputeEngine::resolve(
            &ticket,
            None,
            DisputeOutcome::FavorTech,
            &actor_for(&admin),
            &env(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
    }

    #[test]
    fn favor_tech_confirms_an_unsettled_payment_as_the_admin() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);
        let payment = payment_for(&ticket, PaymentStatus::ProofSubmitted);

        let transition = DisputeEngine::resolve(
            &ticket,
            Some(&payment),
            DisputeOutcome::FavorTech,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        let settled = written_payment(&transition);
        assert_eq!(settled.status, PaymentStatus::Confirmed);
        assert_eq!(settled.confirmed_by, Some(ActorRef::User(admin.id)));
        assert!(settled.confirmed_at.is_some());
    }

    #[test]
    fn favor_tech_keeps_the_original_confirmation_record() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);
        let original_admin = user(Role::Admin);
        let mut payment = payment_for(&ticket, PaymentStatus::Confirmed);
        payment.confirmed_by = Some(ActorRef::User(original_admin.id));
        let confirmed_at = chrono::Utc::now();
        payment.confirmed_at = Some(confirmed_at);

        let transition = DisputeEngine::resolve(
            &ticket,
            Some(&payment),
            DisputeOutcome::FavorTech,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        let settled = written_payment(&transition);
        assert_eq!(settled.confirmed_by, Some(ActorRef::User(original_admin.id)));
        assert_eq!(settled.confirmed_at, Some(confirmed_at));
    }

    #[test]
    fn resolution_without_payment_settles_the_ticket_alone() {
        let (_client, _tech, ticket) = disputed_ticket();
        let admin = user(Role::Admin);

        let transition = DisputeEngine::resolve(
            &ticket,
            None,
            DisputeOutcome::FavorTech,
            &actor_for(&admin),
            &env(),
        )
        .unwrap();

        assert_eq!(transition.writes.len(), 1);
        assert_eq!(written_ticket(&transition).status, TicketStatus::Completed);
    }
}
