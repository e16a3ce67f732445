//! Best-effort notification dispatch.
//!
//! Runs after a transition commits. Nothing here may fail the transition:
//! a store hiccup loses notifications, never lifecycle facts. The routing
//! itself is pure; this module only resolves the admin audience and writes
//! whatever the routing produced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use remotedesk_core::events::DomainEvent;
use remotedesk_core::notifications::route;
use remotedesk_core::types::{Role, UserId};

use crate::metrics::NotificationMetrics;
use crate::store::DocumentStore;

/// Writes the notifications a committed transition fans out to.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher writing through the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Routes `event` to its recipients and writes the notifications.
    ///
    /// Timestamps every notification with `at`, the commit time of the
    /// transition that produced the event. Returns how many were written;
    /// failed writes are logged and counted, never propagated.
    pub async fn dispatch(&self, event: &DomainEvent, at: DateTime<Utc>) -> usize {
        let admins = self.admin_audience().await;
        let drafts = route(event, &admins);
        if drafts.is_empty() {
            return 0;
        }

        let writes = drafts.into_iter().map(|draft| {
            let store = Arc::clone(&self.store);
            async move {
                let recipient = draft.user_id;
                match store.save_notification(draft.materialize(at)).await {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(%recipient, %error, "dropping undeliverable notification");
                        NotificationMetrics::record_failure();
                        false
                    }
                }
            }
        });
        let delivered = join_all(writes).await.into_iter().filter(|ok| *ok).count();

        NotificationMetrics::record_dispatched(delivered);
        tracing::debug!(action = %event.action(), delivered, "notifications dispatched");
        delivered
    }

    async fn admin_audience(&self) -> Vec<UserId> {
        match self.store.users_with_role(Role::Admin).await {
            Ok(admins) => admins.into_iter().map(|admin| admin.id).collect(),
            Err(error) => {
                tracing::warn!(%error, "could not resolve admin audience, skipping admin notifications");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}
