//! Wire-level tests for the advisory services client against a mock server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use remotedesk_core::advisor::{AuditSummarizer, CategoryAdvisor};
use remotedesk_core::events::AuditAction;
use remotedesk_core::moderation::SafetyClassifier;
use remotedesk_core::types::{ActorRef, AuditLogEntry, AuditLogId, AuditTarget, TicketId, UserId};
use remotedesk_core::{Clock, SystemClock};
use remotedesk_integrations::{AdvisorClient, RetryPolicy};

fn confirm_entry() -> AuditLogEntry {
    AuditLogEntry {
        id: AuditLogId::new(),
        actor: ActorRef::User(UserId::new()),
        action: AuditAction::ConfirmPayment,
        target: AuditTarget::Ticket(TicketId::new()),
        details: Some("payment confirmed".into()),
        created_at: SystemClock.now(),
    }
}

#[tokio::test]
async fn safe_text_comes_back_as_a_safe_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderate"))
        .and(header("authorization", "Bearer advisor-key"))
        .and(body_json(json!({ "text": "how is the repair going?" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "safe": true })))
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key");
    let verdict = client.classify("how is the repair going?").await.unwrap();
    assert!(verdict.is_safe);
    assert!(verdict.reason.is_none());
}

#[tokio::test]
async fn unsafe_text_carries_the_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "safe": false,
            "reason": "contact details detected",
        })))
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key");
    let verdict = client.classify("call me at 555-0100").await.unwrap();
    assert!(!verdict.is_safe);
    assert_eq!(verdict.reason.as_deref(), Some("contact details detected"));
}

#[tokio::test]
async fn a_blocked_verdict_without_reason_gets_the_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "safe": false })))
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key");
    let verdict = client.classify("something oblique").await.unwrap();
    assert_eq!(verdict.reason.as_deref(), Some("policy violation"));
}

#[tokio::test]
async fn categorization_returns_the_label() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/categorize"))
        .and(body_json(json!({ "description": "router drops wifi every hour" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "category": "Network" })))
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key");
    let label = client
        .suggest_category("router drops wifi every hour")
        .await
        .unwrap();
    assert_eq!(label, "Network");
}

#[tokio::test]
async fn summaries_come_back_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/summarize"))
        .and(body_json(json!({
            "action": "CONFIRM_PAYMENT",
            "details": "payment confirmed",
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "summary": "An admin confirmed the payment." })),
        )
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key");
    let summary = client.summarize(&confirm_entry()).await.unwrap();
    assert_eq!(summary, "An admin confirmed the payment.");
}

#[tokio::test]
async fn an_advisor_fault_is_an_error_not_a_guess() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("scaling up"))
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key").with_retry(RetryPolicy::None);
    let error = client.classify("anything").await.unwrap_err();
    assert!(error.message.contains("503"));
}

#[tokio::test]
async fn rate_limits_are_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/categorize"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(3)
        .mount(&server)
        .await;

    let client = AdvisorClient::new(server.uri(), "advisor-key").with_retry(RetryPolicy::Fixed {
        attempts: 3,
        delay: Duration::from_millis(1),
    });
    let error = client.suggest_category("anything").await.unwrap_err();
    assert!(error.message.contains("429"));
}

#[tokio::test]
async fn a_connection_refusal_is_an_advisor_error() {
    let client =
        AdvisorClient::new("http://127.0.0.1:1", "advisor-key").with_retry(RetryPolicy::None);
    let error = client.suggest_category("anything").await.unwrap_err();
    assert!(error.message.contains("unreachable"));
}
