//! The moderation gate for ticket chat.
//!
//! Every outbound message passes through an advisory safety classifier
//! before admission. An unsafe verdict rejects the message with the
//! classifier's reason. A classifier failure admits the message: the gate
//! **fails open**, and the failure is logged at warn. That policy is
//! explicit and covered by tests — do not change it casually.

use std::sync::Arc;

use async_trait::async_trait;
use smallvec::smallvec;
use thiserror::Error;

use crate::environment::{Clock, Environment};
use crate::error::LifecycleError;
use crate::events::DomainEvent;
use crate::lifecycle::{Transition, Write, ensure_nonempty};
use crate::types::{Actor, ActorRef, AuditTarget, ChatMessage, MessageId, Role, Ticket};

/// What the safety classifier thinks of a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    /// Whether the text may be published.
    pub is_safe: bool,
    /// Why not, when unsafe.
    pub reason: Option<String>,
}

impl SafetyVerdict {
    /// A verdict admitting the text.
    #[must_use]
    pub const fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
        }
    }

    /// A verdict rejecting the text with a reason.
    #[must_use]
    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Failure to obtain a verdict at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("safety classifier failed: {message}")]
pub struct ClassifierError {
    /// What went wrong.
    pub message: String,
}

impl ClassifierError {
    /// Wraps a failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Advisory text-safety collaborator.
///
/// Implementations may call out to a remote model; the gate tolerates any
/// failure, so implementations should surface errors rather than guess.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    /// Classifies one message body.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError`] when no verdict could be obtained.
    async fn classify(&self, text: &str) -> Result<SafetyVerdict, ClassifierError>;
}

/// Wraps chat-message admission with the safety check.
#[derive(Clone)]
pub struct ModerationGate {
    classifier: Arc<dyn SafetyClassifier>,
}

impl ModerationGate {
    /// Creates a gate over the given classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn SafetyClassifier>) -> Self {
        Self { classifier }
    }

    /// Admits a chat message to a ticket's conversation, or refuses it.
    ///
    /// Participants are the owning client, the assigned technician and any
    /// admin. The classifier runs only after the cheap guards pass.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for non-participants; `Validation` for empty text or
    /// an unsafe verdict. Classifier failure is not an error here: the
    /// message is admitted (fail-open).
    pub async fn admit(
        &self,
        ticket: &Ticket,
        text: &str,
        actor: &Actor,
        env: &Environment,
    ) -> Result<Transition, LifecycleError> {
        let participant = match actor.role {
            Role::Admin => true,
            Role::Client => ticket.is_owned_by(actor.id),
            Role::Tech => ticket.is_assigned_to(actor.id),
        };
        if !participant {
            return Err(LifecycleError::unauthorized(
                "only ticket participants may send messages",
            ));
        }
        let text = ensure_nonempty(text, "message text must not be empty")?;

        match self.classifier.classify(&text).await {
            Ok(verdict) if !verdict.is_safe => {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| "unsafe content".to_string());
                return Err(LifecycleError::validation(format!(
                    "message rejected by moderation: {reason}"
                )));
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    error = %error,
                    "safety classifier unavailable; admitting message (fail-open)"
                );
            }
        }

        let now = env.clock.now();
        let message = ChatMessage {
            id: MessageId::new(),
            ticket_id: ticket.id,
            sender_id: actor.id,
            sender_role: actor.role,
            text,
            created_at: now,
        };
        let event = DomainEvent::MessageSent {
            ticket_id: ticket.id,
            sender_id: actor.id,
            sender_role: actor.role,
            client_id: ticket.client_id,
            tech_id: ticket.tech_id,
            title: ticket.title.clone(),
        };
        let message_id = message.id;
        Ok(Transition::assemble(
            smallvec![Write::Message(message)],
            event,
            ActorRef::User(actor.id),
            AuditTarget::Message(message_id),
            None,
            now,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::lifecycle::test_support::{actor_for, env, ticket_at, user};
    use crate::types::TicketStatus;

    use super::*;

    struct AlwaysSafe;

    #[async_trait]
    impl SafetyClassifier for AlwaysSafe {
        async fn classify(&self, _text: &str) -> Result<SafetyVerdict, ClassifierError> {
            Ok(SafetyVerdict::safe())
        }
    }

    struct AlwaysUnsafe;

    #[async_trait]
    impl SafetyClassifier for AlwaysUnsafe {
        async fn classify(&self, _text: &str) -> Result<SafetyVerdict, ClassifierError> {
            Ok(SafetyVerdict::unsafe_because("contact details detected"))
        }
    }

    struct AlwaysFailing;

    #[async_trait]
    impl SafetyClassifier for AlwaysFailing {
        async fn classify(&self, _text: &str) -> Result<SafetyVerdict, ClassifierError> {
            Err(ClassifierError::new("model timed out"))
        }
    }

    #[tokio::test]
    async fn safe_messages_are_admitted() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);
        let gate = ModerationGate::new(Arc::new(AlwaysSafe));

        let transition = gate
            .admit(&ticket, "how is it going?", &actor_for(&client), &env())
            .await
            .unwrap();
        assert!(matches!(transition.writes[0], Write::Message(_)));
        assert!(matches!(transition.event, DomainEvent::MessageSent { .. }));
    }

    #[tokio::test]
    async fn unsafe_messages_carry_the_reason() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);
        let gate = ModerationGate::new(Arc::new(AlwaysUnsafe));

        let err = gate
            .admit(&ticket, "call me at 555-0100", &actor_for(&client), &env())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            LifecycleError::Validation { rule } if rule.contains("contact details detected")
        ));
    }

    #[tokio::test]
    async fn classifier_failure_fails_open() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);
        let gate = ModerationGate::new(Arc::new(AlwaysFailing));

        // The documented policy: a classifier outage never blocks chat.
        let transition = gate
            .admit(&ticket, "still there?", &actor_for(&tech), &env())
            .await
            .unwrap();
        assert!(matches!(transition.writes[0], Write::Message(_)));
    }

    #[tokio::test]
    async fn outsiders_are_refused_before_classification() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let stranger = user(Role::Client);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);
        let gate = ModerationGate::new(Arc::new(AlwaysSafe));

        let err = gate
            .admit(&ticket, "hello", &actor_for(&stranger), &env())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn empty_text_is_refused() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let ticket = ticket_at(&client, &tech, TicketStatus::InProgress);
        let gate = ModerationGate::new(Arc::new(AlwaysSafe));

        let err = gate
            .admit(&ticket, "   ", &actor_for(&client), &env())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation { .. }));
    }

    #[tokio::test]
    async fn admins_may_join_any_conversation() {
        let client = user(Role::Client);
        let tech = user(Role::Tech);
        let admin = user(Role::Admin);
        let ticket = ticket_at(&client, &tech, TicketStatus::Disputed);
        let gate = ModerationGate::new(Arc::new(AlwaysSafe));

        assert!(
            gate.admit(&ticket, "mediating here", &actor_for(&admin), &env())
                .await
                .is_ok()
        );
    }
}
