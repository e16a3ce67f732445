//! Mock collaborators for deterministic tests.
//!
//! Every external dependency of the desk has a scripted stand-in here:
//! clocks, the safety classifier, the advisory services, the payment
//! gateway, and a document-store wrapper whose notification writes can be
//! switched off to exercise best-effort delivery.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use remotedesk_core::Clock;
use remotedesk_core::advisor::{AdvisorError, AuditSummarizer, CategoryAdvisor};
use remotedesk_core::gateway::{
    CheckoutSession, GatewayError, GatewayResult, PaymentGateway, SessionStatus,
};
use remotedesk_core::moderation::{ClassifierError, SafetyClassifier, SafetyVerdict};
use remotedesk_core::types::{
    AuditLogEntry, ChatMessage, Money, Notification, NotificationId, Payment, PaymentId,
    PaymentStatus, Role, Ticket, TicketId, User, UserId,
};
use remotedesk_runtime::{DocumentStore, StoreError, StoreResult, Versioned, WriteBatch};

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making timestamps reproducible.
///
/// # Example
///
/// ```
/// use remotedesk_testing::mocks::FixedClock;
/// use remotedesk_core::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// This function will panic if the hardcoded timestamp fails to parse,
/// which should never happen in practice.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// Clock that advances by a fixed step on every reading.
///
/// Useful when a test needs distinguishable `created_at` values, for
/// instance to assert newest-first ordering.
#[derive(Debug)]
pub struct SteppingClock {
    start: DateTime<Utc>,
    step: Duration,
    ticks: Mutex<i32>,
}

impl SteppingClock {
    /// Clock reading `start` first, then `start + step`, and so on.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            start,
            step,
            ticks: Mutex::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        #[allow(clippy::unwrap_used)] // nothing panics while the lock is held
        let mut ticks = self.ticks.lock().unwrap();
        let reading = self.start + self.step * *ticks;
        *ticks += 1;
        reading
    }
}

/// Classifier with a fixed verdict for every message.
#[derive(Debug, Clone)]
pub struct StaticClassifier {
    verdict: SafetyVerdict,
}

impl StaticClassifier {
    /// Classifier that admits every message.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            verdict: SafetyVerdict::safe(),
        }
    }

    /// Classifier that rejects every message with the given reason.
    #[must_use]
    pub fn block_all(reason: impl Into<String>) -> Self {
        Self {
            verdict: SafetyVerdict::unsafe_because(reason),
        }
    }
}

#[async_trait]
impl SafetyClassifier for StaticClassifier {
    async fn classify(&self, _text: &str) -> Result<SafetyVerdict, ClassifierError> {
        Ok(self.verdict.clone())
    }
}

/// Classifier that never produces a verdict, for the fail-open path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingClassifier;

#[async_trait]
impl SafetyClassifier for FailingClassifier {
    async fn classify(&self, _text: &str) -> Result<SafetyVerdict, ClassifierError> {
        Err(ClassifierError::new("classifier offline"))
    }
}

/// Advisory backend with canned answers.
///
/// Suggests the same category for every description and summarizes every
/// audit entry as `"summary of ACTION"`, so tests can tell advisor output
/// apart from the built-in fallbacks.
#[derive(Debug, Clone)]
pub struct CannedAdvisor {
    category: String,
}

impl CannedAdvisor {
    /// Advisor suggesting `category` for every description.
    #[must_use]
    pub fn suggesting(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

#[async_trait]
impl CategoryAdvisor for CannedAdvisor {
    async fn suggest_category(&self, _description: &str) -> Result<String, AdvisorError> {
        Ok(self.category.clone())
    }
}

#[async_trait]
impl AuditSummarizer for CannedAdvisor {
    async fn summarize(&self, entry: &AuditLogEntry) -> Result<String, AdvisorError> {
        Ok(format!("summary of {}", entry.action))
    }
}

/// Advisory backend that always fails, for the fallback paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingAdvisor;

#[async_trait]
impl CategoryAdvisor for FailingAdvisor {
    async fn suggest_category(&self, _description: &str) -> Result<String, AdvisorError> {
        Err(AdvisorError::new("advisor offline"))
    }
}

#[async_trait]
impl AuditSummarizer for FailingAdvisor {
    async fn summarize(&self, _entry: &AuditLogEntry) -> Result<String, AdvisorError> {
        Err(AdvisorError::new("advisor offline"))
    }
}

/// Gateway whose sessions always open and verify with a scripted status.
///
/// Session ids are sequential (`test_cs_1`, `test_cs_2`, ...) so a test
/// can predict and count them.
#[derive(Debug)]
pub struct ScriptedGateway {
    verdict: SessionStatus,
    serial: AtomicU64,
}

impl ScriptedGateway {
    /// Gateway whose sessions verify as paid.
    #[must_use]
    pub const fn paying() -> Self {
        Self {
            verdict: SessionStatus::Paid,
            serial: AtomicU64::new(0),
        }
    }

    /// Gateway whose sessions verify as still pending.
    #[must_use]
    pub const fn stalling() -> Self {
        Self {
            verdict: SessionStatus::Pending,
            serial: AtomicU64::new(0),
        }
    }

    /// How many sessions have been created so far.
    #[must_use]
    pub fn sessions_created(&self) -> u64 {
        self.serial.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for ScriptedGateway {
    fn create_session(
        &self,
        _ticket_id: TicketId,
        _amount: Money,
        _title: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            Ok(CheckoutSession {
                session_id: format!("test_cs_{serial}"),
                redirect_url: format!("https://checkout.invalid/session/test_cs_{serial}"),
            })
        })
    }

    fn verify_session(
        &self,
        _session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<SessionStatus>> + Send>> {
        let verdict = self.verdict;
        Box::pin(async move { Ok(verdict) })
    }
}

/// Gateway that is always unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingGateway;

impl PaymentGateway for FailingGateway {
    fn create_session(
        &self,
        _ticket_id: TicketId,
        _amount: Money,
        _title: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        Box::pin(async {
            Err(GatewayError::Unavailable {
                message: "gateway offline".to_string(),
            })
        })
    }

    fn verify_session(
        &self,
        _session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<SessionStatus>> + Send>> {
        Box::pin(async {
            Err(GatewayError::Unavailable {
                message: "gateway offline".to_string(),
            })
        })
    }
}

/// Store wrapper whose notification writes can be switched off.
///
/// Everything else passes through to the wrapped store unchanged, which
/// makes this the tool for proving that lost notifications never fail a
/// transition.
pub struct FlakyStore {
    inner: Arc<dyn DocumentStore>,
    fail_notifications: AtomicBool,
}

impl FlakyStore {
    /// Wraps a store; all operations pass through until told otherwise.
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            fail_notifications: AtomicBool::new(false),
        }
    }

    /// Makes every following notification write fail.
    pub fn refuse_notifications(&self) {
        self.fail_notifications.store(true, Ordering::SeqCst);
    }

    /// Lets notification writes through again.
    pub fn restore_notifications(&self) {
        self.fail_notifications.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for FlakyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakyStore")
            .field("fail_notifications", &self.fail_notifications)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>> {
        self.inner.user(id).await
    }

    async fn users_with_role(&self, role: Role) -> StoreResult<Vec<User>> {
        self.inner.users_with_role(role).await
    }

    async fn ticket(&self, id: TicketId) -> StoreResult<Option<Versioned<Ticket>>> {
        self.inner.ticket(id).await
    }

    async fn tickets_for_client(&self, client_id: UserId) -> StoreResult<Vec<Ticket>> {
        self.inner.tickets_for_client(client_id).await
    }

    async fn tickets_for_tech(&self, tech_id: UserId) -> StoreResult<Vec<Ticket>> {
        self.inner.tickets_for_tech(tech_id).await
    }

    async fn open_tickets(&self) -> StoreResult<Vec<Ticket>> {
        self.inner.open_tickets().await
    }

    async fn payment(&self, id: PaymentId) -> StoreResult<Option<Versioned<Payment>>> {
        self.inner.payment(id).await
    }

    async fn active_payment_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> StoreResult<Option<Versioned<Payment>>> {
        self.inner.active_payment_for_ticket(ticket_id).await
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> StoreResult<Vec<Payment>> {
        self.inner.payments_with_status(status).await
    }

    async fn messages_for_ticket(&self, ticket_id: TicketId) -> StoreResult<Vec<ChatMessage>> {
        self.inner.messages_for_ticket(ticket_id).await
    }

    async fn notification(&self, id: NotificationId) -> StoreResult<Option<Notification>> {
        self.inner.notification(id).await
    }

    async fn notifications_for_user(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        self.inner.notifications_for_user(user_id).await
    }

    async fn save_notification(&self, notification: Notification) -> StoreResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("notification backend offline"));
        }
        self.inner.save_notification(notification).await
    }

    async fn recent_audit(&self, limit: usize) -> StoreResult<Vec<AuditLogEntry>> {
        self.inner.recent_audit(limit).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use remotedesk_runtime::InMemoryStore;

    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn stepping_clock_advances_per_reading() {
        let clock = SteppingClock::new(test_clock().now(), Duration::seconds(10));
        let first = clock.now();
        let second = clock.now();
        assert_eq!(second - first, Duration::seconds(10));
    }

    #[tokio::test]
    async fn scripted_gateway_counts_sessions() {
        let gateway = ScriptedGateway::paying();
        let first = gateway
            .create_session(TicketId::new(), Money::from_cents(100), "demo")
            .await
            .unwrap();
        let second = gateway
            .create_session(TicketId::new(), Money::from_cents(100), "demo")
            .await
            .unwrap();

        assert_eq!(first.session_id, "test_cs_1");
        assert_eq!(second.session_id, "test_cs_2");
        assert_eq!(gateway.sessions_created(), 2);
    }

    #[tokio::test]
    async fn flaky_store_refuses_only_notifications() {
        let store = FlakyStore::new(Arc::new(InMemoryStore::new()));
        store.refuse_notifications();

        assert!(store.open_tickets().await.is_ok());
        let notification = Notification {
            id: NotificationId::new(),
            user_id: UserId::new(),
            title: "t".to_string(),
            message: "m".to_string(),
            kind: remotedesk_core::types::NotificationKind::Info,
            read: false,
            link: None,
            created_at: test_clock().now(),
        };
        assert!(store.save_notification(notification.clone()).await.is_err());

        store.restore_notifications();
        assert!(store.save_notification(notification).await.is_ok());
    }
}
