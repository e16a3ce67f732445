//! The support desk: lifecycle operations wired to storage and
//! collaborators.
//!
//! Every mutating operation follows the same shape: read fresh snapshots
//! (recording their versions), let an engine decide, then commit the
//! transition's writes in one batch whose preconditions carry those
//! versions. A concurrent mutation between read and commit fails the batch
//! with a conflict; nothing is partially applied. After a successful
//! commit, notifications fan out best-effort.
//!
//! The desk never trusts a caller-supplied role: the actor is loaded from
//! the store and a suspended account is refused before anything else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;

use remotedesk_core::advisor::{
    AuditSummarizer, CategoryAdvisor, categorize_with_fallback, describe_with_fallback,
};
use remotedesk_core::events::DisputeOutcome;
use remotedesk_core::gateway::{CheckoutSession, GatewayError, PaymentGateway, SessionStatus};
use remotedesk_core::lifecycle::payment::PaymentProof;
use remotedesk_core::lifecycle::ticket::{TicketDraft, TicketEdit};
use remotedesk_core::types::{
    Actor, AuditLogEntry, ChatMessage, Money, Notification, NotificationId, Payment, PaymentId,
    PaymentStatus, Role, Ticket, TicketId, TicketStatus, User, UserId,
};
use remotedesk_core::{
    DisputeEngine, Environment, LifecycleError, ModerationGate, PaymentEngine, SafetyClassifier,
    TicketEngine, Transition, Write,
};

use crate::dispatcher::NotificationDispatcher;
use crate::metrics::{
    DisputeMetrics, GatewayMetrics, ModerationMetrics, PaymentMetrics, TransitionMetrics,
};
use crate::store::{DocumentStore, Precondition, StoreError, WriteBatch};

/// Result alias for desk operations.
pub type DeskResult<T> = Result<T, LifecycleError>;

/// A ticket with its conversation and active payment, for detail views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketView {
    /// The ticket itself.
    pub ticket: Ticket,
    /// The active payment, when one exists.
    pub payment: Option<Payment>,
    /// The conversation in timestamp order.
    pub messages: Vec<ChatMessage>,
}

/// An audit entry paired with its display line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditView {
    /// The raw entry.
    pub entry: AuditLogEntry,
    /// A short human-readable description of it.
    pub summary: String,
}

/// The support-desk service.
///
/// Shareable and cheap to clone; all state lives behind the store.
#[derive(Clone)]
pub struct SupportDesk {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    moderation: ModerationGate,
    categories: Arc<dyn CategoryAdvisor>,
    summaries: Arc<dyn AuditSummarizer>,
    dispatcher: NotificationDispatcher,
    env: Environment,
}

/// Versions observed while reading the snapshots an operation decides on.
///
/// Entities absent from a map were not read, so a write to them expects
/// them absent — exactly right for freshly created documents.
#[derive(Debug, Default)]
struct Snapshots {
    tickets: HashMap<TicketId, u64>,
    payments: HashMap<PaymentId, u64>,
    users: HashMap<UserId, u64>,
}

impl Snapshots {
    fn expect_ticket(&self, id: TicketId) -> Precondition {
        self.tickets
            .get(&id)
            .copied()
            .map_or(Precondition::Absent, Precondition::Version)
    }

    fn expect_payment(&self, id: PaymentId) -> Precondition {
        self.payments
            .get(&id)
            .copied()
            .map_or(Precondition::Absent, Precondition::Version)
    }

    fn expect_user(&self, id: UserId) -> Precondition {
        self.users
            .get(&id)
            .copied()
            .map_or(Precondition::Absent, Precondition::Version)
    }
}

impl SupportDesk {
    /// Wires a desk over its store and collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        classifier: Arc<dyn SafetyClassifier>,
        categories: Arc<dyn CategoryAdvisor>,
        summaries: Arc<dyn AuditSummarizer>,
        env: Environment,
    ) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(Arc::clone(&store)),
            moderation: ModerationGate::new(classifier),
            store,
            gateway,
            categories,
            summaries,
            env,
        }
    }

    // ─── Ticket operations ─────────────────────────────────────────────

    /// A client opens a ticket.
    ///
    /// A blank category is filled in by the category advisor before the
    /// engine sees the draft; an advisor outage falls back to the default
    /// label rather than failing the creation.
    ///
    /// # Errors
    ///
    /// Refuses suspended or non-client actors and malformed drafts.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create_ticket(&self, actor_id: UserId, mut draft: TicketDraft) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;

        if draft.category.trim().is_empty() {
            draft.category =
                categorize_with_fallback(self.categories.as_ref(), &draft.description).await;
        }

        let transition = TicketEngine::create(&actor, draft, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// An admin assigns a technician, or a technician accepts the ticket.
    ///
    /// # Errors
    ///
    /// Refuses clients, non-open tickets, technicians accepting for someone
    /// else, and inactive or non-technician assignees.
    #[tracing::instrument(skip(self))]
    pub async fn assign_ticket(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        tech_id: UserId,
    ) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;
        let tech = self.require_user(tech_id, &mut snaps).await?;

        let transition = TicketEngine::assign(&ticket, &tech, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// The owning client or an admin edits the ticket's text fields.
    ///
    /// # Errors
    ///
    /// Refuses non-owners, tickets past `Assigned`, and empty replacements.
    #[tracing::instrument(skip(self, patch))]
    pub async fn edit_ticket(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        patch: TicketEdit,
    ) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = TicketEngine::edit(&ticket, patch, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// The owning client or an admin removes a ticket, with its payments
    /// and chat history.
    ///
    /// # Errors
    ///
    /// Refuses non-owners and tickets with money in flight.
    #[tracing::instrument(skip(self))]
    pub async fn delete_ticket(&self, actor_id: UserId, ticket_id: TicketId) -> DeskResult<()> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = TicketEngine::delete(&ticket, &actor, &self.env).map_err(refuse)?;
        self.apply(transition, &snaps).await?;
        Ok(())
    }

    /// The assigned technician starts working a paid ticket.
    ///
    /// # Errors
    ///
    /// Refuses anyone but the assigned technician and tickets not `Paid`.
    #[tracing::instrument(skip(self))]
    pub async fn start_execution(&self, actor_id: UserId, ticket_id: TicketId) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = TicketEngine::start_execution(&ticket, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// The assigned technician declares the work finished.
    ///
    /// # Errors
    ///
    /// Refuses anyone but the assigned technician and tickets not
    /// `InProgress`.
    #[tracing::instrument(skip(self))]
    pub async fn finish_ticket(&self, actor_id: UserId, ticket_id: TicketId) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = TicketEngine::finish(&ticket, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// The owning client escalates an in-progress ticket.
    ///
    /// # Errors
    ///
    /// Refuses non-owners, tickets not `InProgress`, and empty reasons.
    #[tracing::instrument(skip(self, reason))]
    pub async fn open_dispute(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        reason: &str,
    ) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = TicketEngine::dispute(&ticket, reason, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    /// An admin settles a dispute in one party's favor.
    ///
    /// The ticket, its payment and the audit entry change in one atomic
    /// batch; there is no intermediate state where the ticket is settled
    /// but the money is not.
    ///
    /// # Errors
    ///
    /// Refuses non-admins and tickets not `Disputed`.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_dispute(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        outcome: DisputeOutcome,
    ) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;
        let payment = match self
            .store
            .active_payment_for_ticket(ticket_id)
            .await
            .map_err(store_failure)?
        {
            Some(stored) => {
                snaps.payments.insert(stored.doc.id, stored.version);
                Some(stored.doc)
            }
            None => None,
        };

        let transition =
            DisputeEngine::resolve(&ticket, payment.as_ref(), outcome, &actor, &self.env)
                .map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;

        DisputeMetrics::record_resolution(outcome);
        if let Some(payment) = payment {
            match outcome {
                DisputeOutcome::FavorTech => PaymentMetrics::record_confirmed(payment.amount_total),
                DisputeOutcome::FavorClient => PaymentMetrics::record_rejected(),
            }
        }
        Ok(updated_ticket(&transition))
    }

    /// The owning client rates the completed work, updating the
    /// technician's running average in the same transition.
    ///
    /// # Errors
    ///
    /// Refuses non-owners, tickets not `Completed`, second ratings and
    /// scores outside `1..=5`.
    #[tracing::instrument(skip(self, comment))]
    pub async fn rate_ticket(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        score: u8,
        comment: Option<String>,
    ) -> DeskResult<Ticket> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;
        let tech_id = ticket.tech_id.ok_or_else(|| {
            refuse(LifecycleError::invalid_state(
                "ticket has no technician to rate",
            ))
        })?;
        let tech = self.require_user(tech_id, &mut snaps).await?;

        let transition = TicketEngine::rate(&ticket, &tech, score, comment, &actor, &self.env)
            .map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_ticket(&transition))
    }

    // ─── Payment operations ────────────────────────────────────────────

    /// The assigned technician prices the work, opening a payment and
    /// moving the ticket to `AwaitingPayment`.
    ///
    /// # Errors
    ///
    /// Refuses anyone but the assigned technician, tickets not `Assigned`,
    /// and zero amounts.
    #[tracing::instrument(skip(self))]
    pub async fn set_budget(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        amount: Money,
    ) -> DeskResult<Payment> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition =
            PaymentEngine::set_budget(&ticket, amount, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_payment(&transition))
    }

    /// The owning client attaches proof of payment.
    ///
    /// # Errors
    ///
    /// Refuses non-owners, payments not `Pending`, and empty proofs.
    #[tracing::instrument(skip(self, proof))]
    pub async fn submit_proof(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        proof: PaymentProof,
    ) -> DeskResult<Payment> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;
        let payment = self.require_active_payment(ticket_id, &mut snaps).await?;

        let transition = PaymentEngine::submit_proof(&ticket, &payment, proof, &actor, &self.env)
            .map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(updated_payment(&transition))
    }

    /// An admin confirms a payment, marking the ticket `Paid`.
    ///
    /// # Errors
    ///
    /// Refuses non-admins and payments already settled.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, actor_id: UserId, payment_id: PaymentId) -> DeskResult<Payment> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let payment = self.require_payment(payment_id, &mut snaps).await?;
        let ticket = self.require_ticket(payment.ticket_id, &mut snaps).await?;

        let transition =
            PaymentEngine::confirm(&ticket, &payment, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;

        PaymentMetrics::record_confirmed(payment.amount_total);
        Ok(updated_payment(&transition))
    }

    /// An admin rejects a payment; the ticket reverts to `Assigned` with
    /// its budget cleared so the technician can re-price.
    ///
    /// # Errors
    ///
    /// Refuses non-admins and payments already settled.
    #[tracing::instrument(skip(self))]
    pub async fn reject_payment(&self, actor_id: UserId, payment_id: PaymentId) -> DeskResult<Payment> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let payment = self.require_payment(payment_id, &mut snaps).await?;
        let ticket = self.require_ticket(payment.ticket_id, &mut snaps).await?;

        let transition =
            PaymentEngine::reject(&ticket, &payment, &actor, &self.env).map_err(refuse)?;
        let transition = self.apply(transition, &snaps).await?;

        PaymentMetrics::record_rejected();
        Ok(updated_payment(&transition))
    }

    // ─── Checkout glue ─────────────────────────────────────────────────

    /// The owning client opens a hosted checkout session for the active
    /// payment.
    ///
    /// Pure gateway glue: no document changes, no audit entry. The later
    /// [`verify_checkout`](Self::verify_checkout) call is what confirms
    /// the payment.
    ///
    /// # Errors
    ///
    /// Refuses non-owners and tickets not `AwaitingPayment`;
    /// `CollaboratorUnavailable` when the gateway cannot be reached.
    #[tracing::instrument(skip(self))]
    pub async fn create_checkout(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
    ) -> DeskResult<CheckoutSession> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        if !(actor.role == Role::Client && ticket.is_owned_by(actor.id)) {
            return Err(refuse(LifecycleError::unauthorized(
                "only the owning client may start checkout",
            )));
        }
        if ticket.status != TicketStatus::AwaitingPayment {
            return Err(refuse(LifecycleError::invalid_state(format!(
                "ticket must be awaiting_payment to start checkout (currently {})",
                ticket.status
            ))));
        }
        let payment = self.require_active_payment(ticket_id, &mut snaps).await?;

        let session = self
            .gateway
            .create_session(ticket.id, payment.amount_total, &ticket.title)
            .await
            .map_err(gateway_failure)?;
        GatewayMetrics::record_session_created();
        tracing::info!(
            ticket_id = %ticket.id,
            session_id = %session.session_id,
            "checkout session created"
        );
        Ok(session)
    }

    /// Verifies a checkout session and, when it settled, confirms the
    /// payment on the gateway's authority.
    ///
    /// Idempotent: re-verifying an already confirmed payment returns it
    /// unchanged, and an unpaid session changes nothing.
    ///
    /// # Errors
    ///
    /// Refuses callers who are neither the owning client nor an admin;
    /// `CollaboratorUnavailable` when the gateway cannot be reached.
    #[tracing::instrument(skip(self, session_id))]
    pub async fn verify_checkout(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        session_id: &str,
    ) -> DeskResult<Payment> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let authorized =
            actor.role == Role::Admin || (actor.role == Role::Client && ticket.is_owned_by(actor.id));
        if !authorized {
            return Err(refuse(LifecycleError::unauthorized(
                "only the owning client or an admin may verify checkout",
            )));
        }
        let payment = self.require_active_payment(ticket_id, &mut snaps).await?;
        if payment.status == PaymentStatus::Confirmed {
            return Ok(payment);
        }

        let status = self
            .gateway
            .verify_session(session_id)
            .await
            .map_err(gateway_failure)?;
        GatewayMetrics::record_verified(status == SessionStatus::Paid);

        match status {
            SessionStatus::Pending => {
                tracing::info!(ticket_id = %ticket.id, "checkout session not paid yet");
                Ok(payment)
            }
            SessionStatus::Paid => {
                let transition =
                    PaymentEngine::confirm_by_gateway(&ticket, &payment, &self.env).map_err(refuse)?;
                let transition = self.apply(transition, &snaps).await?;
                PaymentMetrics::record_confirmed(payment.amount_total);
                Ok(updated_payment(&transition))
            }
        }
    }

    // ─── Chat and notifications ────────────────────────────────────────

    /// A participant sends a chat message, passing the moderation gate.
    ///
    /// # Errors
    ///
    /// Refuses outsiders, empty text and unsafe content. A classifier
    /// outage admits the message.
    #[tracing::instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        actor_id: UserId,
        ticket_id: TicketId,
        text: &str,
    ) -> DeskResult<ChatMessage> {
        let mut snaps = Snapshots::default();
        let (_, actor) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let transition = self
            .moderation
            .admit(&ticket, text, &actor, &self.env)
            .await
            .map_err(|error| {
                if matches!(error, LifecycleError::Validation { .. }) {
                    ModerationMetrics::record_refusal();
                }
                refuse(error)
            })?;
        let transition = self.apply(transition, &snaps).await?;
        Ok(written_message(&transition))
    }

    /// The recipient marks one of their notifications read.
    ///
    /// Not a lifecycle transition: no audit entry, and marking an
    /// already-read notification is a no-op.
    ///
    /// # Errors
    ///
    /// Refuses anyone but the recipient.
    #[tracing::instrument(skip(self))]
    pub async fn mark_notification_read(
        &self,
        actor_id: UserId,
        notification_id: NotificationId,
    ) -> DeskResult<Notification> {
        let mut snaps = Snapshots::default();
        let (_, _) = self.active_actor(actor_id, &mut snaps).await?;

        let mut notification = self
            .store
            .notification(notification_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| {
                refuse(LifecycleError::validation(format!(
                    "notification {notification_id} not found"
                )))
            })?;
        if notification.user_id != actor_id {
            return Err(refuse(LifecycleError::unauthorized(
                "only the recipient may mark a notification read",
            )));
        }
        if !notification.read {
            notification.read = true;
            self.store
                .save_notification(notification.clone())
                .await
                .map_err(store_failure)?;
        }
        Ok(notification)
    }

    // ─── Queries ───────────────────────────────────────────────────────

    /// The caller's working set: own tickets for clients, assigned tickets
    /// for technicians, the open board for admins.
    ///
    /// # Errors
    ///
    /// Refuses suspended accounts.
    #[tracing::instrument(skip(self))]
    pub async fn my_tickets(&self, actor_id: UserId) -> DeskResult<Vec<Ticket>> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        let tickets = match user.role {
            Role::Client => self.store.tickets_for_client(user.id).await,
            Role::Tech => self.store.tickets_for_tech(user.id).await,
            Role::Admin => self.store.open_tickets().await,
        };
        tickets.map_err(store_failure)
    }

    /// Unassigned tickets, for technicians picking up work and admins
    /// assigning it.
    ///
    /// # Errors
    ///
    /// Refuses clients and suspended accounts.
    #[tracing::instrument(skip(self))]
    pub async fn open_board(&self, actor_id: UserId) -> DeskResult<Vec<Ticket>> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        if user.role == Role::Client {
            return Err(refuse(LifecycleError::unauthorized(
                "the open board is for technicians and admins",
            )));
        }
        self.store.open_tickets().await.map_err(store_failure)
    }

    /// Payments awaiting admin review, newest first.
    ///
    /// # Errors
    ///
    /// Refuses non-admins.
    #[tracing::instrument(skip(self))]
    pub async fn payment_review_queue(&self, actor_id: UserId) -> DeskResult<Vec<Payment>> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        if user.role != Role::Admin {
            return Err(refuse(LifecycleError::unauthorized(
                "only an admin may review payments",
            )));
        }
        self.store
            .payments_with_status(PaymentStatus::ProofSubmitted)
            .await
            .map_err(store_failure)
    }

    /// The caller's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Refuses suspended accounts.
    #[tracing::instrument(skip(self))]
    pub async fn my_notifications(&self, actor_id: UserId) -> DeskResult<Vec<Notification>> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        self.store
            .notifications_for_user(user.id)
            .await
            .map_err(store_failure)
    }

    /// A ticket with its conversation and active payment.
    ///
    /// # Errors
    ///
    /// Refuses callers who are not a participant or an admin.
    #[tracing::instrument(skip(self))]
    pub async fn ticket_detail(&self, actor_id: UserId, ticket_id: TicketId) -> DeskResult<TicketView> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        let ticket = self.require_ticket(ticket_id, &mut snaps).await?;

        let participant = match user.role {
            Role::Admin => true,
            Role::Client => ticket.is_owned_by(user.id),
            Role::Tech => ticket.is_assigned_to(user.id),
        };
        if !participant {
            return Err(refuse(LifecycleError::unauthorized(
                "only ticket participants may view the ticket",
            )));
        }

        let payment = self
            .store
            .active_payment_for_ticket(ticket_id)
            .await
            .map_err(store_failure)?
            .map(|stored| stored.doc);
        let messages = self
            .store
            .messages_for_ticket(ticket_id)
            .await
            .map_err(store_failure)?;
        Ok(TicketView {
            ticket,
            payment,
            messages,
        })
    }

    /// The most recent audit entries with display summaries, newest first.
    ///
    /// Summaries come from the audit summarizer; an outage falls back to
    /// the raw action label.
    ///
    /// # Errors
    ///
    /// Refuses non-admins.
    #[tracing::instrument(skip(self))]
    pub async fn audit_trail(&self, actor_id: UserId, limit: usize) -> DeskResult<Vec<AuditView>> {
        let mut snaps = Snapshots::default();
        let (user, _) = self.active_actor(actor_id, &mut snaps).await?;
        if user.role != Role::Admin {
            return Err(refuse(LifecycleError::unauthorized(
                "only an admin may read the audit trail",
            )));
        }

        let entries = self.store.recent_audit(limit).await.map_err(store_failure)?;
        let summaries = join_all(
            entries
                .iter()
                .map(|entry| describe_with_fallback(self.summaries.as_ref(), entry)),
        )
        .await;
        Ok(entries
            .into_iter()
            .zip(summaries)
            .map(|(entry, summary)| AuditView { entry, summary })
            .collect())
    }

    // ─── Internals ─────────────────────────────────────────────────────

    /// Loads the acting user, refusing suspended accounts up front.
    async fn active_actor(
        &self,
        id: UserId,
        snaps: &mut Snapshots,
    ) -> DeskResult<(User, Actor)> {
        let stored = self
            .store
            .user(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| refuse(LifecycleError::validation(format!("user {id} not found"))))?;
        snaps.users.insert(id, stored.version);
        let user = stored.doc;
        if !user.is_active() {
            return Err(refuse(LifecycleError::unauthorized("account is suspended")));
        }
        let actor = Actor::new(user.id, user.role);
        Ok((user, actor))
    }

    async fn require_user(&self, id: UserId, snaps: &mut Snapshots) -> DeskResult<User> {
        let stored = self
            .store
            .user(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| refuse(LifecycleError::validation(format!("user {id} not found"))))?;
        snaps.users.insert(id, stored.version);
        Ok(stored.doc)
    }

    async fn require_ticket(&self, id: TicketId, snaps: &mut Snapshots) -> DeskResult<Ticket> {
        let stored = self
            .store
            .ticket(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| refuse(LifecycleError::validation(format!("ticket {id} not found"))))?;
        snaps.tickets.insert(id, stored.version);
        Ok(stored.doc)
    }

    async fn require_payment(&self, id: PaymentId, snaps: &mut Snapshots) -> DeskResult<Payment> {
        let stored = self
            .store
            .payment(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| refuse(LifecycleError::validation(format!("payment {id} not found"))))?;
        snaps.payments.insert(id, stored.version);
        Ok(stored.doc)
    }

    async fn require_active_payment(
        &self,
        ticket_id: TicketId,
        snaps: &mut Snapshots,
    ) -> DeskResult<Payment> {
        let stored = self
            .store
            .active_payment_for_ticket(ticket_id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| {
                refuse(LifecycleError::invalid_state(format!(
                    "ticket {ticket_id} has no active payment"
                )))
            })?;
        snaps.payments.insert(stored.doc.id, stored.version);
        Ok(stored.doc)
    }

    /// Commits a transition's writes atomically, then fans out
    /// notifications best-effort.
    async fn apply(&self, transition: Transition, snaps: &Snapshots) -> DeskResult<Transition> {
        let action = transition.audit.action;
        let batch = batch_for(&transition, snaps);

        let started = Instant::now();
        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StoreError::Conflict { entity }) => {
                TransitionMetrics::record_conflict(action);
                tracing::warn!(action = %action, entity, "transition lost to a concurrent update");
                return Err(LifecycleError::conflict(entity));
            }
            Err(error) => return Err(store_failure(error)),
        }
        TransitionMetrics::record_committed(action, started.elapsed());
        tracing::info!(
            action = %action,
            audit_id = %transition.audit.id,
            "transition committed"
        );

        self.dispatcher
            .dispatch(&transition.event, transition.audit.created_at)
            .await;
        Ok(transition)
    }
}

impl std::fmt::Debug for SupportDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportDesk")
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

/// Translates a transition's writes into a batch whose preconditions carry
/// the versions the decision was made against.
fn batch_for(transition: &Transition, snaps: &Snapshots) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for write in &transition.writes {
        batch = match write {
            Write::Ticket(ticket) => {
                batch.put_ticket(ticket.clone(), snaps.expect_ticket(ticket.id))
            }
            Write::DeleteTicket(id) => batch.delete_ticket(*id, snaps.expect_ticket(*id)),
            Write::Payment(payment) => {
                batch.put_payment(payment.clone(), snaps.expect_payment(payment.id))
            }
            Write::PurgePayments(id) => batch.purge_payments(*id),
            Write::User(user) => batch.put_user(user.clone(), snaps.expect_user(user.id)),
            Write::Message(message) => batch.append_message(message.clone()),
            Write::PurgeMessages(id) => batch.purge_messages(*id),
        };
    }
    batch.append_audit(transition.audit.clone())
}

fn store_failure(error: StoreError) -> LifecycleError {
    match error {
        StoreError::Conflict { entity } => LifecycleError::conflict(entity),
        StoreError::Unavailable { message } => {
            tracing::warn!(%message, "document store unavailable");
            LifecycleError::collaborator_unavailable("document store")
        }
    }
}

fn gateway_failure(error: GatewayError) -> LifecycleError {
    tracing::warn!(%error, "payment gateway failure");
    LifecycleError::collaborator_unavailable("payment gateway")
}

/// Records a refusal and passes the error through.
fn refuse(error: LifecycleError) -> LifecycleError {
    TransitionMetrics::record_refusal(&error);
    error
}

#[allow(clippy::expect_used)] // every accepting ticket transition writes its ticket
fn updated_ticket(transition: &Transition) -> Ticket {
    transition
        .writes
        .iter()
        .find_map(|write| match write {
            Write::Ticket(ticket) => Some(ticket.clone()),
            _ => None,
        })
        .expect("accepted transition carries a ticket write")
}

#[allow(clippy::expect_used)] // every accepting payment transition writes its payment
fn updated_payment(transition: &Transition) -> Payment {
    transition
        .writes
        .iter()
        .find_map(|write| match write {
            Write::Payment(payment) => Some(payment.clone()),
            _ => None,
        })
        .expect("accepted transition carries a payment write")
}

#[allow(clippy::expect_used)] // message admission writes exactly one message
fn written_message(transition: &Transition) -> ChatMessage {
    transition
        .writes
        .iter()
        .find_map(|write| match write {
            Write::Message(message) => Some(message.clone()),
            _ => None,
        })
        .expect("admitted message carries a message write")
}
