//! Seeded documents and pre-wired desks for integration tests.

use std::sync::Arc;

use remotedesk_core::lifecycle::ticket::TicketDraft;
use remotedesk_core::{Clock, Environment};
use remotedesk_core::types::{FeePercent, Role, User, UserId, UserStatus};
use remotedesk_runtime::{DocumentStore, Precondition, StoreResult, SupportDesk, WriteBatch};

use crate::mocks::{CannedAdvisor, ScriptedGateway, StaticClassifier, test_clock};

/// An active user document with the given role, not stored anywhere.
#[must_use]
pub fn make_user(role: Role) -> User {
    User {
        id: UserId::new(),
        name: format!("{role} user"),
        email: format!("{role}@example.test"),
        role,
        status: UserStatus::Active,
        rating: None,
        total_ratings: 0,
        created_at: test_clock().now(),
    }
}

/// Seeds an active user with the given role and returns the document.
///
/// # Errors
///
/// Returns an error when the store refuses the write.
pub async fn seed_user(store: &dyn DocumentStore, role: Role) -> StoreResult<User> {
    let user = make_user(role);
    store
        .commit(WriteBatch::new().put_user(user.clone(), Precondition::Absent))
        .await?;
    Ok(user)
}

/// Seeds a suspended user with the given role and returns the document.
///
/// # Errors
///
/// Returns an error when the store refuses the write.
pub async fn seed_suspended_user(store: &dyn DocumentStore, role: Role) -> StoreResult<User> {
    let user = User {
        status: UserStatus::Suspended,
        ..seed_user(store, role).await?
    };
    store
        .commit(WriteBatch::new().put_user(user.clone(), Precondition::Version(1)))
        .await?;
    Ok(user)
}

/// A well-formed ticket draft with a category already set.
#[must_use]
pub fn sample_draft() -> TicketDraft {
    TicketDraft {
        title: "Laptop overheats under load".to_string(),
        category: "Hardware".to_string(),
        description: "Fans spin up and the machine shuts down after ten minutes.".to_string(),
        image_url: None,
    }
}

/// A draft whose category is blank, so the desk must ask the advisor.
#[must_use]
pub fn uncategorized_draft() -> TicketDraft {
    TicketDraft {
        category: String::new(),
        ..sample_draft()
    }
}

/// The deterministic environment shared by tests: fixed clock, standard fee.
#[must_use]
pub fn test_environment() -> Environment {
    Environment::new(Arc::new(test_clock()), FeePercent::STANDARD)
}

/// A desk over the given store with cooperative mock collaborators.
///
/// The gateway opens sessions that verify as paid, the classifier admits
/// everything, and the advisor answers with a fixed category. Tests that
/// need an uncooperative collaborator build the desk themselves.
#[must_use]
pub fn test_desk(store: Arc<dyn DocumentStore>) -> SupportDesk {
    let advisor = Arc::new(CannedAdvisor::suggesting("Software"));
    SupportDesk::new(
        store,
        Arc::new(ScriptedGateway::paying()),
        Arc::new(StaticClassifier::allow_all()),
        advisor.clone(),
        advisor,
        test_environment(),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use remotedesk_runtime::InMemoryStore;

    use super::*;

    #[tokio::test]
    async fn seeded_users_are_queryable_by_role() {
        let store = InMemoryStore::new();
        let client = seed_user(&store, Role::Client).await.unwrap();
        seed_user(&store, Role::Tech).await.unwrap();

        let clients = store.users_with_role(Role::Client).await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, client.id);
    }

    #[tokio::test]
    async fn suspended_seed_is_stored_suspended() {
        let store = InMemoryStore::new();
        let user = seed_suspended_user(&store, Role::Client).await.unwrap();

        let stored = store.user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.doc.status, UserStatus::Suspended);
        assert_eq!(stored.version, 2);
    }
}
