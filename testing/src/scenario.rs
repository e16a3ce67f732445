//! Fluent harness for asserting on engine decisions.
//!
//! An engine call answers with either an accepted transition or a refusal.
//! [`TransitionTest`] lets a test state which one it expects and pile up
//! assertions against the parts it cares about, instead of repeating the
//! same `match` scaffolding everywhere.
//!
//! # Example
//!
//! ```ignore
//! TransitionTest::new()
//!     .when(TicketEngine::create(&actor, draft, &env))
//!     .then_event(|event| assert!(matches!(event, DomainEvent::TicketCreated { .. })))
//!     .then_writes(|writes| assert_eq!(writes.len(), 1))
//!     .run();
//! ```

use remotedesk_core::types::AuditLogEntry;
use remotedesk_core::{DomainEvent, LifecycleError, Transition, Write};

type TransitionAssertion = Box<dyn FnOnce(&Transition)>;
type RefusalAssertion = Box<dyn FnOnce(&LifecycleError)>;

/// Builder collecting assertions against one engine decision.
///
/// Expecting acceptance and refusal at the same time is a test bug, and
/// [`run`](Self::run) fails loudly on it.
pub struct TransitionTest {
    outcome: Option<Result<Transition, LifecycleError>>,
    accepted: Vec<TransitionAssertion>,
    refused: Vec<RefusalAssertion>,
}

impl TransitionTest {
    /// Creates an empty harness.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outcome: None,
            accepted: Vec::new(),
            refused: Vec::new(),
        }
    }

    /// Records the engine decision under test.
    #[must_use]
    pub fn when(mut self, outcome: Result<Transition, LifecycleError>) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Asserts on the whole accepted transition.
    #[must_use]
    pub fn then_transition(mut self, assertion: impl FnOnce(&Transition) + 'static) -> Self {
        self.accepted.push(Box::new(assertion));
        self
    }

    /// Asserts on the accepted transition's writes.
    #[must_use]
    pub fn then_writes(mut self, assertion: impl FnOnce(&[Write]) + 'static) -> Self {
        self.accepted
            .push(Box::new(move |transition| assertion(&transition.writes)));
        self
    }

    /// Asserts on the accepted transition's domain event.
    #[must_use]
    pub fn then_event(mut self, assertion: impl FnOnce(&DomainEvent) + 'static) -> Self {
        self.accepted
            .push(Box::new(move |transition| assertion(&transition.event)));
        self
    }

    /// Asserts on the accepted transition's audit entry.
    #[must_use]
    pub fn then_audit(mut self, assertion: impl FnOnce(&AuditLogEntry) + 'static) -> Self {
        self.accepted
            .push(Box::new(move |transition| assertion(&transition.audit)));
        self
    }

    /// Asserts on the refusal.
    #[must_use]
    pub fn then_refusal(mut self, assertion: impl FnOnce(&LifecycleError) + 'static) -> Self {
        self.refused.push(Box::new(assertion));
        self
    }

    /// Runs every collected assertion against the recorded outcome.
    ///
    /// # Panics
    ///
    /// Panics when [`when`](Self::when) was never called, when the outcome
    /// does not match the side the assertions were registered on, or when
    /// any assertion fails.
    #[allow(clippy::panic)]
    pub fn run(self) {
        match self.outcome {
            None => panic!("when() must be called before run()"),
            Some(Ok(transition)) => {
                assert!(
                    self.refused.is_empty(),
                    "expected a refusal but the transition was accepted: {:?}",
                    transition.event
                );
                for assertion in self.accepted {
                    assertion(&transition);
                }
            }
            Some(Err(error)) => {
                assert!(
                    self.accepted.is_empty(),
                    "expected acceptance but the engine refused: {error}"
                );
                for assertion in self.refused {
                    assertion(&error);
                }
            }
        }
    }
}

impl Default for TransitionTest {
    fn default() -> Self {
        Self::new()
    }
}

/// Assertion helpers for picking documents out of a transition's writes.
pub mod assertions {
    #![allow(clippy::panic)]

    use remotedesk_core::types::{ChatMessage, Payment, Ticket};
    use remotedesk_core::{Transition, Write};

    /// Asserts the transition carries exactly `expected` writes.
    pub fn assert_write_count(transition: &Transition, expected: usize) {
        assert_eq!(
            transition.writes.len(),
            expected,
            "unexpected write count: {:?}",
            transition.writes
        );
    }

    /// The ticket written by the transition.
    ///
    /// # Panics
    ///
    /// Panics when the transition writes no ticket.
    #[must_use]
    pub fn written_ticket(transition: &Transition) -> &Ticket {
        transition
            .writes
            .iter()
            .find_map(|write| match write {
                Write::Ticket(ticket) => Some(ticket),
                _ => None,
            })
            .unwrap_or_else(|| panic!("transition writes no ticket: {:?}", transition.writes))
    }

    /// The payment written by the transition.
    ///
    /// # Panics
    ///
    /// Panics when the transition writes no payment.
    #[must_use]
    pub fn written_payment(transition: &Transition) -> &Payment {
        transition
            .writes
            .iter()
            .find_map(|write| match write {
                Write::Payment(payment) => Some(payment),
                _ => None,
            })
            .unwrap_or_else(|| panic!("transition writes no payment: {:?}", transition.writes))
    }

    /// The chat message written by the transition.
    ///
    /// # Panics
    ///
    /// Panics when the transition writes no message.
    #[must_use]
    pub fn written_message(transition: &Transition) -> &ChatMessage {
        transition
            .writes
            .iter()
            .find_map(|write| match write {
                Write::Message(message) => Some(message),
                _ => None,
            })
            .unwrap_or_else(|| panic!("transition writes no message: {:?}", transition.writes))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use remotedesk_core::TicketEngine;
    use remotedesk_core::types::{Actor, Role};

    use crate::fixtures::{make_user, sample_draft, test_environment};

    use super::assertions::{assert_write_count, written_ticket};
    use super::*;

    #[test]
    fn accepted_outcome_runs_transition_assertions() {
        let client = make_user(Role::Client);
        let actor = Actor::new(client.id, client.role);

        TransitionTest::new()
            .when(TicketEngine::create(&actor, sample_draft(), &test_environment()))
            .then_event(|event| assert!(matches!(event, DomainEvent::TicketCreated { .. })))
            .then_writes(|writes| assert_eq!(writes.len(), 1))
            .then_transition(move |transition| {
                assert_write_count(transition, 1);
                assert_eq!(written_ticket(transition).client_id, client.id);
            })
            .then_audit(|entry| assert!(entry.details.is_some()))
            .run();
    }

    #[test]
    fn refusal_outcome_runs_refusal_assertions() {
        let tech = make_user(Role::Tech);
        let actor = Actor::new(tech.id, tech.role);

        TransitionTest::new()
            .when(TicketEngine::create(&actor, sample_draft(), &test_environment()))
            .then_refusal(|error| assert!(matches!(error, LifecycleError::Unauthorized { .. })))
            .run();
    }

    #[test]
    #[should_panic(expected = "expected a refusal")]
    fn acceptance_fails_a_test_expecting_refusal() {
        let client = make_user(Role::Client);
        let actor = Actor::new(client.id, client.role);

        TransitionTest::new()
            .when(TicketEngine::create(&actor, sample_draft(), &test_environment()))
            .then_refusal(|_| {})
            .run();
    }
}
