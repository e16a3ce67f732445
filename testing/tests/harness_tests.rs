//! End-to-end checks that the harness pieces compose against a real desk.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use remotedesk_core::LifecycleError;
use remotedesk_core::types::{Role, TicketStatus};
use remotedesk_runtime::{DocumentStore, InMemoryStore, SupportDesk};
use remotedesk_testing::{
    CannedAdvisor, FlakyStore, ScriptedGateway, StaticClassifier, init_tracing, sample_draft,
    seed_user, test_desk, test_environment, uncategorized_draft,
};

#[tokio::test]
async fn desk_fixture_runs_a_create_flow() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let desk = test_desk(store.clone());
    let client = seed_user(store.as_ref(), Role::Client).await.unwrap();

    let ticket = desk.create_ticket(client.id, sample_draft()).await.unwrap();

    assert_eq!(ticket.client_id, client.id);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.category, "Hardware");
}

#[tokio::test]
async fn blank_categories_are_filled_by_the_advisor() {
    let store = Arc::new(InMemoryStore::new());
    let desk = test_desk(store.clone());
    let client = seed_user(store.as_ref(), Role::Client).await.unwrap();

    let ticket = desk
        .create_ticket(client.id, uncategorized_draft())
        .await
        .unwrap();

    assert_eq!(ticket.category, "Software");
}

#[tokio::test]
async fn flaky_store_drops_notifications_without_failing_transitions() {
    let inner = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let desk = test_desk(flaky.clone());
    let client = seed_user(flaky.as_ref(), Role::Client).await.unwrap();
    let admin = seed_user(flaky.as_ref(), Role::Admin).await.unwrap();

    desk.create_ticket(client.id, sample_draft()).await.unwrap();
    let delivered = inner.notifications_for_user(admin.id).await.unwrap();
    assert_eq!(delivered.len(), 1);

    flaky.refuse_notifications();
    desk.create_ticket(client.id, sample_draft()).await.unwrap();

    let after = inner.notifications_for_user(admin.id).await.unwrap();
    assert_eq!(after.len(), 1, "no new notification should have landed");
    let tickets = desk.my_tickets(client.id).await.unwrap();
    assert_eq!(tickets.len(), 2, "both transitions should have committed");
}

#[tokio::test]
async fn blocking_classifier_surfaces_its_reason() {
    let store = Arc::new(InMemoryStore::new());
    let advisor = Arc::new(CannedAdvisor::suggesting("Software"));
    let desk = SupportDesk::new(
        store.clone(),
        Arc::new(ScriptedGateway::paying()),
        Arc::new(StaticClassifier::block_all("solicitation")),
        advisor.clone(),
        advisor,
        test_environment(),
    );
    let client = seed_user(store.as_ref(), Role::Client).await.unwrap();
    let ticket = desk.create_ticket(client.id, sample_draft()).await.unwrap();

    let refusal = desk
        .send_message(client.id, ticket.id, "buy my miracle cleaner")
        .await
        .unwrap_err();

    assert!(
        matches!(&refusal, LifecycleError::Validation { rule } if rule.contains("solicitation")),
        "unexpected refusal: {refusal}"
    );
}
