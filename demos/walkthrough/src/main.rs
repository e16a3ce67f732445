//! Support-desk walkthrough binary.
//!
//! Seeds a client, a technician and an admin into the in-memory store,
//! then drives two tickets end to end: one priced, paid and completed,
//! one paid through the hosted checkout and then disputed. Collaborators
//! are offline stand-ins, so the walkthrough runs without any network.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remotedesk_core::advisor::{AdvisorError, AuditSummarizer, CategoryAdvisor, DEFAULT_CATEGORY};
use remotedesk_core::gateway::MockGateway;
use remotedesk_core::lifecycle::payment::PaymentProof;
use remotedesk_core::lifecycle::ticket::TicketDraft;
use remotedesk_core::moderation::{ClassifierError, SafetyClassifier, SafetyVerdict};
use remotedesk_core::types::{AuditLogEntry, Money, Role, User, UserId, UserStatus};
use remotedesk_core::{Clock, DisputeOutcome, SystemClock};
use remotedesk_runtime::{
    DeskConfig, DocumentStore, InMemoryStore, Precondition, SupportDesk, WriteBatch,
};

/// Offline advisor: keyword category matching, templated audit lines and
/// a moderation rule against taking payment off the platform.
struct KeywordAdvisor;

#[async_trait::async_trait]
impl CategoryAdvisor for KeywordAdvisor {
    async fn suggest_category(&self, description: &str) -> Result<String, AdvisorError> {
        let lowered = description.to_lowercase();
        let label = if lowered.contains("fan") || lowered.contains("screen") {
            "Hardware"
        } else if lowered.contains("wifi") || lowered.contains("router") {
            "Network"
        } else if lowered.contains("virus") || lowered.contains("password") {
            "Security"
        } else if lowered.contains("install") || lowered.contains("update") {
            "Software"
        } else {
            DEFAULT_CATEGORY
        };
        Ok(label.to_string())
    }
}

#[async_trait::async_trait]
impl AuditSummarizer for KeywordAdvisor {
    async fn summarize(&self, entry: &AuditLogEntry) -> Result<String, AdvisorError> {
        let line = match &entry.details {
            Some(details) => format!("{}: {details}", entry.action),
            None => entry.action.to_string(),
        };
        Ok(line)
    }
}

#[async_trait::async_trait]
impl SafetyClassifier for KeywordAdvisor {
    async fn classify(&self, text: &str) -> Result<SafetyVerdict, ClassifierError> {
        if text.to_lowercase().contains("pay me directly") {
            Ok(SafetyVerdict::unsafe_because(
                "off-platform payment solicitation",
            ))
        } else {
            Ok(SafetyVerdict::safe())
        }
    }
}

async fn seed_user(
    store: &dyn DocumentStore,
    name: &str,
    role: Role,
) -> Result<User, Box<dyn std::error::Error>> {
    let user = User {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{}@remotedesk.example", name.to_lowercase()),
        role,
        status: UserStatus::Active,
        rating: None,
        total_ratings: 0,
        created_at: SystemClock.now(),
    };
    store
        .commit(WriteBatch::new().put_user(user.clone(), Precondition::Absent))
        .await?;
    Ok(user)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,remotedesk_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== RemoteDesk Walkthrough ===\n");

    let config = DeskConfig::from_env();
    let store = Arc::new(InMemoryStore::with_change_capacity(config.change_capacity));
    let advisor = Arc::new(KeywordAdvisor);
    let desk = SupportDesk::new(
        store.clone(),
        MockGateway::shared(),
        advisor.clone(),
        advisor.clone(),
        advisor,
        config.environment(),
    );
    tracing::info!(fee = %config.platform_fee, "desk configured");

    let client = seed_user(store.as_ref(), "Ada", Role::Client).await?;
    let tech = seed_user(store.as_ref(), "Bo", Role::Tech).await?;
    let admin = seed_user(store.as_ref(), "Mel", Role::Admin).await?;
    println!(
        "Seeded {} (client), {} (technician), {} (admin)\n",
        client.name, tech.name, admin.name
    );

    println!("=== Scenario 1: priced, paid and completed ===\n");

    println!(">>> Ada opens a ticket without a category; the advisor fills it in");
    let ticket = desk
        .create_ticket(
            client.id,
            TicketDraft {
                title: "Wifi drops every evening".to_string(),
                category: String::new(),
                description: "The router reboots itself around 8pm, every day.".to_string(),
                image_url: None,
            },
        )
        .await?;
    println!(
        "    ticket {} [{}] categorized as {}",
        ticket.id, ticket.status, ticket.category
    );

    println!("\n>>> Mel assigns Bo");
    let ticket = desk.assign_ticket(admin.id, ticket.id, tech.id).await?;
    println!("    ticket now [{}]", ticket.status);

    println!("\n>>> Bo prices the work at $120");
    let payment = desk
        .set_budget(tech.id, ticket.id, Money::from_major(120))
        .await?;
    println!(
        "    total ${}, platform keeps ${}, Bo receives ${}",
        payment.amount_total, payment.platform_fee, payment.tech_receives
    );

    println!("\n>>> Ada submits proof of a wire transfer; Mel confirms");
    let payment = desk
        .submit_proof(
            client.id,
            ticket.id,
            PaymentProof {
                text: Some("wire transfer ref 2209".to_string()),
                image_url: None,
            },
        )
        .await?;
    let payment = desk.confirm_payment(admin.id, payment.id).await?;
    println!("    payment now [{}]", payment.status);

    println!("\n>>> Bo starts work; a quick chat happens alongside");
    desk.start_execution(tech.id, ticket.id).await?;
    desk.send_message(client.id, ticket.id, "Any progress?")
        .await?;
    desk.send_message(tech.id, ticket.id, "Firmware was stale; flashing an update now.")
        .await?;
    if let Err(refusal) = desk
        .send_message(tech.id, ticket.id, "You could pay me directly next time.")
        .await
    {
        println!("    moderation refused a message: {refusal}");
    }

    println!("\n>>> Bo finishes; Ada rates the job 5/5");
    desk.finish_ticket(tech.id, ticket.id).await?;
    desk.rate_ticket(client.id, ticket.id, 5, Some("Fast and friendly.".to_string()))
        .await?;
    if let Some(stored) = store.user(tech.id).await? {
        if let Some(average) = stored.doc.rating {
            println!(
                "    Bo's rating is now {average:.1} across {} job(s)",
                stored.doc.total_ratings
            );
        }
    }

    println!("\n=== Scenario 2: hosted checkout, then a dispute ===\n");

    println!(">>> Ada opens a second ticket and Mel assigns Bo again");
    let ticket = desk
        .create_ticket(
            client.id,
            TicketDraft {
                title: "Screen flickers after an update".to_string(),
                category: "Hardware".to_string(),
                description: "The panel flickers once a minute since yesterday.".to_string(),
                image_url: None,
            },
        )
        .await?;
    desk.assign_ticket(admin.id, ticket.id, tech.id).await?;
    desk.set_budget(tech.id, ticket.id, Money::from_major(80))
        .await?;

    println!(">>> Ada pays through the hosted checkout");
    let session = desk.create_checkout(client.id, ticket.id).await?;
    println!("    redirecting Ada to {}", session.redirect_url);
    let payment = desk
        .verify_checkout(client.id, ticket.id, &session.session_id)
        .await?;
    println!("    gateway settled the session; payment now [{}]", payment.status);

    println!("\n>>> Bo starts, but the fix does not hold and Ada disputes");
    desk.start_execution(tech.id, ticket.id).await?;
    desk.open_dispute(client.id, ticket.id, "The flicker came back within an hour.")
        .await?;

    println!(">>> Mel rules for the client: ticket cancelled, payment refunded");
    let ticket = desk
        .resolve_dispute(admin.id, ticket.id, DisputeOutcome::FavorClient)
        .await?;
    if let Some(settled) = store.payment(payment.id).await? {
        println!(
            "    ticket now [{}], payment now [{}]",
            ticket.status, settled.doc.status
        );
    }

    println!("\n=== What the parties saw ===\n");
    println!("Ada's inbox:");
    for note in desk.my_notifications(client.id).await? {
        println!("  [{:?}] {}: {}", note.kind, note.title, note.message);
    }

    let trail = desk.audit_trail(admin.id, 12).await?;
    println!("\nAudit trail (newest first, {} entries shown):", trail.len());
    for view in &trail {
        println!("  {}", view.summary);
    }

    println!("\n=== Walkthrough complete ===");
    Ok(())
}
