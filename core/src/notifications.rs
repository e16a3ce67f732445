//! Event-to-notification routing.
//!
//! One pure function maps a domain event to the notifications it should
//! produce: the "other party" relative to the actor, or every admin for
//! events needing platform attention. Delivery itself is the runtime
//! dispatcher's job and is best-effort by policy; routing stays here so
//! who-hears-about-what lives in exactly one place.

use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use crate::events::{DisputeOutcome, DomainEvent};
use crate::types::{Notification, NotificationId, NotificationKind, Role, TicketId, UserId};

/// A notification before it gets an id, a timestamp and a read flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    /// The recipient.
    pub user_id: UserId,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity/flavor.
    pub kind: NotificationKind,
    /// The ticket the notification is about.
    pub link: Option<TicketId>,
}

impl NotificationDraft {
    /// Materializes the draft into a persistable notification.
    #[must_use]
    pub fn materialize(self, at: DateTime<Utc>) -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            read: false,
            link: self.link,
            created_at: at,
        }
    }
}

/// Computes the notifications a lifecycle event produces.
///
/// `admins` is the current set of admin users, for events that address
/// the platform rather than a party.
#[must_use]
pub fn route(event: &DomainEvent, admins: &[UserId]) -> SmallVec<[NotificationDraft; 4]> {
    let mut drafts: SmallVec<[NotificationDraft; 4]> = SmallVec::new();
    let link = Some(event.ticket_id());

    match event {
        DomainEvent::TicketCreated { title, .. } => {
            for admin in admins {
                drafts.push(NotificationDraft {
                    user_id: *admin,
                    title: "New ticket".into(),
                    message: format!("\"{title}\" was opened and awaits assignment"),
                    kind: NotificationKind::Info,
                    link,
                });
            }
        }
        DomainEvent::TechAssigned {
            client_id,
            self_accepted,
            title,
            ..
        } => {
            let message = if *self_accepted {
                format!("A technician accepted \"{title}\"")
            } else {
                format!("A technician was assigned to \"{title}\"")
            };
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Technician assigned".into(),
                message,
                kind: NotificationKind::Info,
                link,
            });
        }
        DomainEvent::BudgetSet {
            client_id,
            amount,
            title,
            ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Budget set".into(),
                message: format!("\"{title}\" was priced at {amount}; payment is awaited"),
                kind: NotificationKind::Warning,
                link,
            });
        }
        DomainEvent::ProofSubmitted { title, .. } => {
            for admin in admins {
                drafts.push(NotificationDraft {
                    user_id: *admin,
                    title: "Proof of payment submitted".into(),
                    message: format!("The payment for \"{title}\" awaits review"),
                    kind: NotificationKind::Info,
                    link,
                });
            }
        }
        DomainEvent::PaymentConfirmed {
            client_id,
            tech_id,
            title,
            ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *tech_id,
                title: "Payment confirmed".into(),
                message: format!("Payment for \"{title}\" was confirmed; you may start working"),
                kind: NotificationKind::Success,
                link,
            });
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Payment confirmed".into(),
                message: format!("Your payment for \"{title}\" was confirmed"),
                kind: NotificationKind::Success,
                link,
            });
        }
        DomainEvent::PaymentRejected {
            client_id,
            tech_id,
            title,
            ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Payment rejected".into(),
                message: format!(
                    "The payment for \"{title}\" was rejected; the technician will set a new budget"
                ),
                kind: NotificationKind::Error,
                link,
            });
            drafts.push(NotificationDraft {
                user_id: *tech_id,
                title: "Payment rejected".into(),
                message: format!("The payment for \"{title}\" was rejected; set a new budget"),
                kind: NotificationKind::Warning,
                link,
            });
        }
        DomainEvent::ExecutionStarted {
            client_id, title, ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Work started".into(),
                message: format!("The technician started working on \"{title}\""),
                kind: NotificationKind::Info,
                link,
            });
        }
        DomainEvent::TicketFinished {
            client_id, title, ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Work finished".into(),
                message: format!("\"{title}\" was marked finished; please rate the service"),
                kind: NotificationKind::Success,
                link,
            });
        }
        DomainEvent::DisputeOpened {
            tech_id,
            reason,
            title,
            ..
        } => {
            for admin in admins {
                drafts.push(NotificationDraft {
                    user_id: *admin,
                    title: "Dispute opened".into(),
                    message: format!("\"{title}\" is disputed: {reason}"),
                    kind: NotificationKind::Warning,
                    link,
                });
            }
            drafts.push(NotificationDraft {
                user_id: *tech_id,
                title: "Dispute opened".into(),
                message: format!("The client disputed \"{title}\": {reason}"),
                kind: NotificationKind::Warning,
                link,
            });
        }
        DomainEvent::DisputeResolved {
            client_id,
            tech_id,
            outcome,
            title,
            ..
        } => {
            let (client_kind, tech_kind, client_msg, tech_msg) = match outcome {
                DisputeOutcome::FavorClient => (
                    NotificationKind::Success,
                    NotificationKind::Error,
                    format!(
                        "The dispute over \"{title}\" was resolved in your favor; the ticket was cancelled and the payment rejected"
                    ),
                    format!("The dispute over \"{title}\" was resolved in the client's favor"),
                ),
                DisputeOutcome::FavorTech => (
                    NotificationKind::Error,
                    NotificationKind::Success,
                    format!("The dispute over \"{title}\" was resolved in the technician's favor"),
                    format!(
                        "The dispute over \"{title}\" was resolved in your favor; the ticket is completed and the payment confirmed"
                    ),
                ),
            };
            drafts.push(NotificationDraft {
                user_id: *client_id,
                title: "Dispute resolved".into(),
                message: client_msg,
                kind: client_kind,
                link,
            });
            drafts.push(NotificationDraft {
                user_id: *tech_id,
                title: "Dispute resolved".into(),
                message: tech_msg,
                kind: tech_kind,
                link,
            });
        }
        DomainEvent::TicketEdited { .. } => {}
        DomainEvent::TicketDeleted {
            client_id,
            tech_id,
            deleted_by,
            title,
            ..
        } => {
            // A client deleting their own open ticket notifies nobody.
            if *deleted_by == Role::Admin {
                drafts.push(NotificationDraft {
                    user_id: *client_id,
                    title: "Ticket removed".into(),
                    message: format!("\"{title}\" was removed by the platform"),
                    kind: NotificationKind::Warning,
                    link: None,
                });
                if let Some(tech_id) = tech_id {
                    drafts.push(NotificationDraft {
                        user_id: *tech_id,
                        title: "Ticket removed".into(),
                        message: format!("\"{title}\" was removed by the platform"),
                        kind: NotificationKind::Warning,
                        link: None,
                    });
                }
            }
        }
        DomainEvent::TicketRated {
            tech_id,
            score,
            title,
            ..
        } => {
            drafts.push(NotificationDraft {
                user_id: *tech_id,
                title: "New rating".into(),
                message: format!("\"{title}\" was rated {score}/5"),
                kind: NotificationKind::Info,
                link,
            });
        }
        DomainEvent::MessageSent {
            sender_role,
            client_id,
            tech_id,
            title,
            ..
        } => {
            let message = format!("New message on \"{title}\"");
            match sender_role {
                Role::Client => {
                    if let Some(tech_id) = tech_id {
                        drafts.push(NotificationDraft {
                            user_id: *tech_id,
                            title: "New message".into(),
                            message,
                            kind: NotificationKind::Info,
                            link,
                        });
                    }
                }
                Role::Tech => {
                    drafts.push(NotificationDraft {
                        user_id: *client_id,
                        title: "New message".into(),
                        message,
                        kind: NotificationKind::Info,
                        link,
                    });
                }
                Role::Admin => {
                    drafts.push(NotificationDraft {
                        user_id: *client_id,
                        title: "New message".into(),
                        message: message.clone(),
                        kind: NotificationKind::Info,
                        link,
                    });
                    if let Some(tech_id) = tech_id {
                        drafts.push(NotificationDraft {
                            user_id: *tech_id,
                            title: "New message".into(),
                            message,
                            kind: NotificationKind::Info,
                            link,
                        });
                    }
                }
            }
        }
    }
    drafts
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::types::Money;

    use super::*;

    fn ids() -> (TicketId, UserId, UserId, Vec<UserId>) {
        (
            TicketId::new(),
            UserId::new(),
            UserId::new(),
            vec![UserId::new(), UserId::new()],
        )
    }

    #[test]
    fn ticket_creation_addresses_every_admin() {
        let (ticket_id, client_id, _tech, admins) = ids();
        let event = DomainEvent::TicketCreated {
            ticket_id,
            client_id,
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| admins.contains(&d.user_id)));
        assert!(drafts.iter().all(|d| d.link == Some(ticket_id)));
    }

    #[test]
    fn budget_addresses_the_client_with_the_amount() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let event = DomainEvent::BudgetSet {
            ticket_id,
            client_id,
            tech_id,
            payment_id: crate::types::PaymentId::new(),
            amount: Money::from_major(100),
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].user_id, client_id);
        assert!(drafts[0].message.contains("100.00"));
        assert_eq!(drafts[0].kind, NotificationKind::Warning);
    }

    #[test]
    fn confirmation_addresses_both_parties() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let event = DomainEvent::PaymentConfirmed {
            ticket_id,
            client_id,
            tech_id,
            payment_id: crate::types::PaymentId::new(),
            confirmed_by: crate::types::ActorRef::Gateway,
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        let recipients: Vec<_> = drafts.iter().map(|d| d.user_id).collect();
        assert!(recipients.contains(&client_id));
        assert!(recipients.contains(&tech_id));
        assert_eq!(drafts.len(), 2);
    }

    #[test]
    fn dispute_open_addresses_admins_and_the_tech() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let event = DomainEvent::DisputeOpened {
            ticket_id,
            client_id,
            tech_id,
            reason: "unresponsive".into(),
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        assert_eq!(drafts.len(), admins.len() + 1);
        assert!(drafts.iter().any(|d| d.user_id == tech_id));
        assert!(drafts.iter().all(|d| d.message.contains("unresponsive")));
    }

    #[test]
    fn resolution_kinds_follow_the_outcome() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let event = DomainEvent::DisputeResolved {
            ticket_id,
            client_id,
            tech_id,
            outcome: DisputeOutcome::FavorClient,
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        let client_draft = drafts.iter().find(|d| d.user_id == client_id).unwrap();
        let tech_draft = drafts.iter().find(|d| d.user_id == tech_id).unwrap();
        assert_eq!(client_draft.kind, NotificationKind::Success);
        assert_eq!(tech_draft.kind, NotificationKind::Error);
    }

    #[test]
    fn edits_and_own_deletes_stay_silent() {
        let (ticket_id, client_id, _tech, admins) = ids();
        let edited = DomainEvent::TicketEdited {
            ticket_id,
            client_id,
            title: "printer".into(),
        };
        assert!(route(&edited, &admins).is_empty());

        let deleted = DomainEvent::TicketDeleted {
            ticket_id,
            client_id,
            tech_id: None,
            deleted_by: Role::Client,
            title: "printer".into(),
        };
        assert!(route(&deleted, &admins).is_empty());
    }

    #[test]
    fn admin_delete_notifies_the_parties() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let event = DomainEvent::TicketDeleted {
            ticket_id,
            client_id,
            tech_id: Some(tech_id),
            deleted_by: Role::Admin,
            title: "printer".into(),
        };

        let drafts = route(&event, &admins);
        assert_eq!(drafts.len(), 2);
    }

    #[test]
    fn messages_address_the_other_party() {
        let (ticket_id, client_id, tech_id, admins) = ids();
        let sender_id = client_id;
        let from_client = DomainEvent::MessageSent {
            ticket_id,
            sender_id,
            sender_role: Role::Client,
            client_id,
            tech_id: Some(tech_id),
            title: "printer".into(),
        };
        let drafts = route(&from_client, &admins);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].user_id, tech_id);

        let from_tech = DomainEvent::MessageSent {
            ticket_id,
            sender_id: tech_id,
            sender_role: Role::Tech,
            client_id,
            tech_id: Some(tech_id),
            title: "printer".into(),
        };
        let drafts = route(&from_tech, &admins);
        assert_eq!(drafts[0].user_id, client_id);

        // No technician yet: a client message has no counterparty.
        let unassigned = DomainEvent::MessageSent {
            ticket_id,
            sender_id,
            sender_role: Role::Client,
            client_id,
            tech_id: None,
            title: "printer".into(),
        };
        assert!(route(&unassigned, &admins).is_empty());
    }

    #[test]
    fn materialize_fills_the_bookkeeping_fields() {
        let (ticket_id, client_id, _tech, _admins) = ids();
        let draft = NotificationDraft {
            user_id: client_id,
            title: "t".into(),
            message: "m".into(),
            kind: NotificationKind::Info,
            link: Some(ticket_id),
        };
        let at = chrono::Utc::now();
        let notification = draft.materialize(at);
        assert!(!notification.read);
        assert_eq!(notification.created_at, at);
        assert_eq!(notification.link, Some(ticket_id));
    }
}
