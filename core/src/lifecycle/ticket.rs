//! The ticket state machine.
//!
//! States: `Open → Assigned → AwaitingPayment → Paid → InProgress →
//! Completed`, with `Disputed` reachable from `InProgress` and `Cancelled`
//! from `Disputed`. `Completed` and `Cancelled` are terminal.
//!
//! Guard ordering is uniform across operations: coarse role first
//! (an actor who could never perform the operation gets `Unauthorized`),
//! then the status precondition (`InvalidState`), then ownership
//! (`Unauthorized`), then payload validation (`Validation`).

use smallvec::smallvec;

use crate::environment::{Clock, Environment};
use crate::error::LifecycleError;
use crate::events::DomainEvent;
use crate::ledger;
use crate::types::{
    Actor, ActorRef, AuditTarget, Role, Ticket, TicketId, TicketRating, TicketStatus, User,
};

use super::{
    Transition, Write, ensure_assigned_tech, ensure_nonempty, ensure_owning_client,
    ensure_ticket_status,
};

/// Payload for opening a new ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    /// Short summary of the problem.
    pub title: String,
    /// Category label; resolve via the category advisor before calling in.
    pub category: String,
    /// Full problem description.
    pub description: String,
    /// Optional reference to an uploaded illustration.
    pub image_url: Option<String>,
}

/// Payload for editing a ticket's text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketEdit {
    /// Replacement title, if changing.
    pub title: Option<String>,
    /// Replacement description, if changing.
    pub description: Option<String>,
}

/// Decision logic for the ticket state machine.
///
/// Pure functions from snapshots to [`Transition`]s; nothing here touches
/// storage or the network.
pub struct TicketEngine;

impl TicketEngine {
    /// A client opens a new ticket.
    ///
    /// The platform fee rate is snapshotted from the environment and never
    /// recomputed for the ticket's lifetime.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is a client; `Validation` for empty
    /// title, category or description.
    pub fn create(
        actor: &Actor,
        draft: TicketDraft,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Client {
            return Err(LifecycleError::unauthorized(
                "only a client may open a ticket",
            ));
        }
        let title = ensure_nonempty(&draft.title, "ticket title must not be empty")?;
        let category = ensure_nonempty(&draft.category, "ticket category must not be empty")?;
        let description =
            ensure_nonempty(&draft.description, "ticket description must not be empty")?;

        let now = env.clock.now();
        let ticket = Ticket {
            id: TicketId::new(),
            client_id: actor.id,
            tech_id: None,
            status: TicketStatus::Open,
            title: title.clone(),
            category: category.clone(),
            description,
            image_url: normalize_optional(draft.image_url),
            platform_fee_pct: env.platform_fee,
            budget_amount: None,
            dispute_reason: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        let event = DomainEvent::TicketCreated {
            ticket_id: ticket.id,
            client_id: actor.id,
            title: title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(ticket.clone())],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(format!("\"{title}\" opened in category {category}")),
            now,
        ))
    }

    /// An admin assigns a technician, or a technician self-accepts.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for clients and for technicians accepting on someone
    /// else's behalf; `InvalidState` unless the ticket is `Open`;
    /// `Validation` when the assignee is not an active technician.
    pub fn assign(
        ticket: &Ticket,
        tech: &User,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role == Role::Client {
            return Err(LifecycleError::unauthorized(
                "only an admin or an accepting technician may assign a ticket",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::Open, "be assigned")?;
        if ticket.tech_id.is_some() {
            return Err(LifecycleError::invalid_state(
                "ticket already has a technician",
            ));
        }
        let self_accepted = actor.role == Role::Tech;
        if self_accepted && tech.id != actor.id {
            return Err(LifecycleError::unauthorized(
                "a technician may only accept a ticket for themselves",
            ));
        }
        if tech.role != Role::Tech {
            return Err(LifecycleError::validation("assignee is not a technician"));
        }
        if !tech.is_active() {
            return Err(LifecycleError::validation(
                "assignee account is suspended",
            ));
        }

        let now = env.clock.now();
        let updated = Ticket {
            tech_id: Some(tech.id),
            status: TicketStatus::Assigned,
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::TechAssigned {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: tech.id,
            self_accepted,
            title: ticket.title.clone(),
        };
        let details = if self_accepted {
            format!("technician {} self-accepted", tech.name)
        } else {
            format!("technician {} assigned", tech.name)
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(details),
            now,
        ))
    }

    /// Title/description edit: admins anytime, the owning client while the
    /// ticket is still `Open` or `Assigned`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for technicians and non-owning clients;
    /// `InvalidState` for client edits past `Assigned`; `Validation` when
    /// the patch is empty or blanks a field.
    pub fn edit(
        ticket: &Ticket,
        patch: TicketEdit,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        match actor.role {
            Role::Admin => {}
            Role::Client => {
                ensure_owning_client(ticket, actor, "only the owning client may edit a ticket")?;
                if !matches!(ticket.status, TicketStatus::Open | TicketStatus::Assigned) {
                    return Err(LifecycleError::invalid_state(format!(
                        "client edits are only allowed while open or assigned (currently {})",
                        ticket.status
                    )));
                }
            }
            Role::Tech => {
                return Err(LifecycleError::unauthorized(
                    "technicians may not edit tickets",
                ));
            }
        }
        if patch.title.is_none() && patch.description.is_none() {
            return Err(LifecycleError::validation("nothing to edit"));
        }
        let title = patch
            .title
            .map(|t| ensure_nonempty(&t, "ticket title must not be empty"))
            .transpose()?;
        let description = patch
            .description
            .map(|d| ensure_nonempty(&d, "ticket description must not be empty"))
            .transpose()?;

        let now = env.clock.now();
        let updated = Ticket {
            title: title.unwrap_or_else(|| ticket.title.clone()),
            description: description.unwrap_or_else(|| ticket.description.clone()),
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::TicketEdited {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            title: updated.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some("title/description updated".to_string()),
            now,
        ))
    }

    /// Removes a ticket: admins anytime, the owning client while `Open`.
    ///
    /// The ticket's payments and chat history go with it, in the same
    /// atomic batch.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for technicians and non-owning clients;
    /// `InvalidState` for client deletes past `Open`.
    pub fn delete(
        ticket: &Ticket,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        match actor.role {
            Role::Admin => {}
            Role::Client => {
                ensure_owning_client(ticket, actor, "only the owning client may delete a ticket")?;
                ensure_ticket_status(ticket, TicketStatus::Open, "be deleted by the client")?;
            }
            Role::Tech => {
                return Err(LifecycleError::unauthorized(
                    "technicians may not delete tickets",
                ));
            }
        }

        let now = env.clock.now();
        let event = DomainEvent::TicketDeleted {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: ticket.tech_id,
            deleted_by: actor.role,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![
                Write::DeleteTicket(ticket.id),
                Write::PurgePayments(ticket.id),
                Write::PurgeMessages(ticket.id),
            ],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(format!("\"{}\" removed", ticket.title)),
            now,
        ))
    }

    /// The assigned technician starts working a paid ticket.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the assigned technician;
    /// `InvalidState` unless the ticket is `Paid`.
    pub fn start_execution(
        ticket: &Ticket,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Tech {
            return Err(LifecycleError::unauthorized(
                "only a technician may start execution",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::Paid, "start execution")?;
        ensure_assigned_tech(
            ticket,
            actor,
            "only the assigned technician may start execution",
        )?;

        let now = env.clock.now();
        let updated = Ticket {
            status: TicketStatus::InProgress,
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::ExecutionStarted {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: actor.id,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some("execution started".to_string()),
            now,
        ))
    }

    /// The assigned technician marks the work finished.
    ///
    /// The ticket completes immediately; the client's rating, if any,
    /// arrives afterwards via [`TicketEngine::rate`].
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the assigned technician;
    /// `InvalidState` unless the ticket is `InProgress`.
    pub fn finish(
        ticket: &Ticket,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Tech {
            return Err(LifecycleError::unauthorized(
                "only a technician may finish a ticket",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::InProgress, "be finished")?;
        ensure_assigned_tech(
            ticket,
            actor,
            "only the assigned technician may finish the ticket",
        )?;

        let now = env.clock.now();
        let updated = Ticket {
            status: TicketStatus::Completed,
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::TicketFinished {
            ticket_id: ticket.id,
            client_id: ticket.client_id,
            tech_id: actor.id,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some("work marked finished".to_string()),
            now,
        ))
    }

    /// The owning client escalates an in-progress ticket.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the owning client;
    /// `InvalidState` unless the ticket is `InProgress`; `Validation` for
    /// an empty reason.
    pub fn dispute(
        ticket: &Ticket,
        reason: &str,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Client {
            return Err(LifecycleError::unauthorized(
                "only a client may open a dispute",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::InProgress, "be disputed")?;
        ensure_owning_client(ticket, actor, "only the owning client may open a dispute")?;
        let reason = ensure_nonempty(reason, "dispute reason must not be empty")?;
        let Some(tech_id) = ticket.tech_id else {
            // InProgress guarantees an assignee; guard the invariant anyway.
            return Err(LifecycleError::invalid_state(
                "ticket has no assigned technician",
            ));
        };

        let now = env.clock.now();
        let updated = Ticket {
            status: TicketStatus::Disputed,
            dispute_reason: Some(reason.clone()),
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::DisputeOpened {
            ticket_id: ticket.id,
            client_id: actor.id,
            tech_id,
            reason: reason.clone(),
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(format!("dispute opened: {reason}")),
            now,
        ))
    }

    /// The owning client rates the completed work, once.
    ///
    /// Folds the score into the technician's running average in the same
    /// transition: `new_avg = (old_avg * old_count + score) / (old_count
    /// + 1)`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor is the owning client;
    /// `InvalidState` unless the ticket is `Completed` and unrated;
    /// `Validation` for scores outside `1..=5` or a mismatched technician
    /// snapshot.
    pub fn rate(
        ticket: &Ticket,
        tech: &User,
        score: u8,
        comment: Option<String>,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        if actor.role != Role::Client {
            return Err(LifecycleError::unauthorized(
                "only a client may rate a ticket",
            ));
        }
        ensure_ticket_status(ticket, TicketStatus::Completed, "be rated")?;
        ensure_owning_client(ticket, actor, "only the owning client may rate the ticket")?;
        if ticket.rating.is_some() {
            return Err(LifecycleError::invalid_state("ticket already rated"));
        }
        if !(1..=5).contains(&score) {
            return Err(LifecycleError::validation(
                "rating score must be between 1 and 5",
            ));
        }
        if ticket.tech_id != Some(tech.id) {
            return Err(LifecycleError::validation(
                "technician snapshot does not match the ticket",
            ));
        }

        let now = env.clock.now();
        let (new_avg, new_count) = ledger::fold_rating(tech.rating, tech.total_ratings, score);
        let rated_tech = User {
            rating: Some(new_avg),
            total_ratings: new_count,
            ..tech.clone()
        };
        let updated = Ticket {
            rating: Some(TicketRating {
                score,
                comment: normalize_optional(comment),
                rated_at: now,
            }),
            updated_at: now,
            ..ticket.clone()
        };
        let event = DomainEvent::TicketRated {
            ticket_id: ticket.id,
            client_id: actor.id,
            tech_id: tech.id,
            score,
            title: ticket.title.clone(),
        };
        Ok(Transition::assemble(
            smallvec![Write::Ticket(updated), Write::User(rated_tech)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Ticket(ticket.id),
            Some(format!("rated {score}/5")),
            now,
        ))
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}
