//! Metrics for the support-desk runtime.
//!
//! Collected through the `metrics` facade so any exporter the embedding
//! application installs will pick them up. Covered here:
//! - Lifecycle transitions: commits, conflicts, refusals, commit latency
//! - Payments: confirmed volume in cents, rejections
//! - Disputes by outcome
//! - Moderation refusals
//! - Notification dispatch and failures
//! - Checkout sessions created and verified

use std::time::Duration;

use metrics::{describe_counter, describe_histogram};

use remotedesk_core::LifecycleError;
use remotedesk_core::events::{AuditAction, DisputeOutcome};
use remotedesk_core::types::Money;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Register all metric descriptions.
///
/// Call once at startup, after installing an exporter.
pub fn register_metrics() {
    // Lifecycle transitions
    describe_counter!(
        "desk_transitions_total",
        "Total number of committed lifecycle transitions, labeled by action"
    );
    describe_counter!(
        "desk_transition_conflicts_total",
        "Total number of transitions lost to a concurrent update, labeled by action"
    );
    describe_counter!(
        "desk_refusals_total",
        "Total number of refused transitions, labeled by error kind"
    );
    describe_histogram!(
        "desk_commit_duration_seconds",
        "Time taken to commit a transition's write batch"
    );

    // Payments
    describe_counter!(
        "desk_payment_volume_cents_total",
        "Gross confirmed payment volume in cents"
    );
    describe_counter!(
        "desk_payments_rejected_total",
        "Total number of rejected payments"
    );

    // Disputes
    describe_counter!(
        "desk_disputes_resolved_total",
        "Total number of settled disputes, labeled by outcome"
    );

    // Moderation
    describe_counter!(
        "desk_messages_refused_total",
        "Total number of chat messages refused by the moderation gate"
    );

    // Notifications
    describe_counter!(
        "desk_notifications_dispatched_total",
        "Total number of notifications written for recipients"
    );
    describe_counter!(
        "desk_notification_failures_total",
        "Total number of notification writes that failed and were dropped"
    );

    // Checkout
    describe_counter!(
        "desk_checkout_sessions_total",
        "Total number of checkout sessions created at the payment gateway"
    );
    describe_counter!(
        "desk_checkout_verified_total",
        "Total number of checkout verifications, labeled by result"
    );
}

/// Lifecycle transition metrics recorder.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// Record a committed transition and its commit latency.
    pub fn record_committed(action: AuditAction, duration: Duration) {
        counter!("desk_transitions_total", "action" => action.as_str()).increment(1);
        histogram!("desk_commit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a transition lost to a concurrent update.
    pub fn record_conflict(action: AuditAction) {
        counter!("desk_transition_conflicts_total", "action" => action.as_str()).increment(1);
    }

    /// Record a refused transition.
    pub fn record_refusal(error: &LifecycleError) {
        counter!("desk_refusals_total", "kind" => error.kind()).increment(1);
    }
}

/// Payment metrics recorder.
pub struct PaymentMetrics;

impl PaymentMetrics {
    /// Record a confirmed payment's gross volume.
    pub fn record_confirmed(amount: Money) {
        counter!("desk_payment_volume_cents_total").increment(amount.as_cents());
    }

    /// Record a rejected payment.
    pub fn record_rejected() {
        counter!("desk_payments_rejected_total").increment(1);
    }
}

/// Dispute metrics recorder.
pub struct DisputeMetrics;

impl DisputeMetrics {
    /// Record a settled dispute.
    pub fn record_resolution(outcome: DisputeOutcome) {
        counter!("desk_disputes_resolved_total", "outcome" => outcome.to_string()).increment(1);
    }
}

/// Moderation gate metrics recorder.
pub struct ModerationMetrics;

impl ModerationMetrics {
    /// Record a message refused by the gate.
    pub fn record_refusal() {
        counter!("desk_messages_refused_total").increment(1);
    }
}

/// Notification dispatch metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record successfully written notifications.
    pub fn record_dispatched(count: usize) {
        counter!("desk_notifications_dispatched_total").increment(count as u64);
    }

    /// Record a dropped notification write.
    pub fn record_failure() {
        counter!("desk_notification_failures_total").increment(1);
    }
}

/// Checkout gateway metrics recorder.
pub struct GatewayMetrics;

impl GatewayMetrics {
    /// Record a checkout session created at the gateway.
    pub fn record_session_created() {
        counter!("desk_checkout_sessions_total").increment(1);
    }

    /// Record a checkout verification and whether it came back paid.
    pub fn record_verified(paid: bool) {
        let result = if paid { "paid" } else { "pending" };
        counter!("desk_checkout_verified_total", "result" => result).increment(1);
    }
}
