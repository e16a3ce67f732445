//! Core types for the support platform.
//!
//! Identifiers are newtype wrappers over [`Uuid`] so tickets, payments,
//! users and the rest can never be mixed up at a call site. Monetary
//! amounts are integer cents ([`Money`]) — no floating point anywhere in
//! financial math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user (client, technician or admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a support ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random ticket ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ticket ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Creates a new random payment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a payment ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new random notification ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a notification ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLogId(Uuid);

impl AuditLogId {
    /// Creates a new random audit log ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an audit log ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuditLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount in cents (to avoid floating point issues).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero money.
    pub const ZERO: Self = Self(0);

    /// Creates money from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates money from whole currency units.
    #[must_use]
    pub const fn from_major(units: u64) -> Self {
        Self(units * 100)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn as_cents(&self) -> u64 {
        self.0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// True when the amount is zero cents.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Platform fee percentage, snapshotted onto each ticket at creation.
///
/// Always in `0..=100`; construction outside that range is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeePercent(u8);

impl FeePercent {
    /// The platform's standard rate.
    pub const STANDARD: Self = Self(20);

    /// Creates a fee percentage, refusing values above 100.
    #[must_use]
    pub const fn new(pct: u8) -> Option<Self> {
        if pct <= 100 { Some(Self(pct)) } else { None }
    }

    /// Returns the percentage as an integer.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for FeePercent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Role of a platform user. Closed set, parsed once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Requests and pays for support.
    Client,
    /// Performs the support work and receives the payout.
    Tech,
    /// Operates the platform: assigns, confirms payments, settles disputes.
    Admin,
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Parses a role label, tolerating stray whitespace and casing.
    ///
    /// This is the single place loose role strings are accepted; everything
    /// past the boundary works with the enum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "tech" => Ok(Self::Tech),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other:?}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Tech => write!(f, "tech"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Account standing of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Account in good standing.
    Active,
    /// Account barred from all lifecycle operations.
    Suspended,
}

/// Lifecycle status of a support ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Created by a client, no technician yet.
    Open,
    /// A technician has been assigned but has not priced the work.
    Assigned,
    /// The technician set a budget; a payment record awaits settlement.
    AwaitingPayment,
    /// Payment confirmed; work may begin.
    Paid,
    /// The technician is working the ticket.
    InProgress,
    /// Work finished (terminal).
    Completed,
    /// The client escalated; awaiting admin mediation.
    Disputed,
    /// Cancelled by dispute settlement (terminal).
    Cancelled,
}

impl TicketStatus {
    /// True for statuses no transition may leave.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// Lifecycle status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created with the budget; waiting for the client to pay.
    Pending,
    /// The client attached proof of payment; waiting for admin review.
    ProofSubmitted,
    /// Settled in the technician's favor (terminal outside disputes).
    Confirmed,
    /// Refused or refunded; kept as an inert record (terminal).
    Rejected,
}

impl PaymentStatus {
    /// True while the payment still participates in the ticket lifecycle.
    ///
    /// A rejected payment stays on file for the audit trail but no longer
    /// blocks a fresh budget on its ticket.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::ProofSubmitted => "proof_submitted",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        };
        write!(f, "{label}")
    }
}

/// Severity/flavor of a notification, used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Neutral update.
    Info,
    /// Something went the recipient's way.
    Success,
    /// Needs attention soon.
    Warning,
    /// Something went wrong or against the recipient.
    Error,
}

/// The authenticated party requesting a transition.
///
/// Identity issuance is external; the engines trust the pair as given and
/// enforce role/ownership rules on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub id: UserId,
    /// The acting user's role.
    pub role: Role,
}

impl Actor {
    /// Creates an actor from an id/role pair.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// Who performed an action: a platform user or the payment gateway.
///
/// Gateway-driven payment confirmation has no human behind it; audit
/// entries and `confirmed_by` record it distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActorRef {
    /// A platform user.
    User(UserId),
    /// The external payment gateway acting on verification.
    Gateway,
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

/// A platform user.
///
/// Owned by the identity collaborator; the lifecycle engines read the role
/// and standing, and update only the two rating fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Role, immutable after creation.
    pub role: Role,
    /// Account standing.
    pub status: UserStatus,
    /// Running average of received scores (technicians only).
    pub rating: Option<f64>,
    /// Number of ratings folded into the average.
    pub total_ratings: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// True when the account may perform lifecycle operations.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active)
    }
}

/// A client's score for a completed ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRating {
    /// Score in `1..=5`.
    pub score: u8,
    /// Optional free-text comment.
    pub comment: Option<String>,
    /// When the rating was given.
    pub rated_at: DateTime<Utc>,
}

/// A support ticket: the central entity of the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier.
    pub id: TicketId,
    /// The client who opened the ticket.
    pub client_id: UserId,
    /// The assigned technician. Set exactly when status has left `Open`.
    pub tech_id: Option<UserId>,
    /// Current lifecycle status.
    pub status: TicketStatus,
    /// Short summary supplied by the client.
    pub title: String,
    /// Problem category label.
    pub category: String,
    /// Full problem description.
    pub description: String,
    /// Optional reference to an uploaded illustration.
    pub image_url: Option<String>,
    /// Platform fee rate snapshotted at creation; never recomputed.
    pub platform_fee_pct: FeePercent,
    /// The agreed price. Set exactly while an active payment exists.
    pub budget_amount: Option<Money>,
    /// Reason supplied when the client opened a dispute.
    pub dispute_reason: Option<String>,
    /// The client's rating, set at most once after completion.
    pub rating: Option<TicketRating>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// True when `user` is the ticket's owning client.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.client_id == user
    }

    /// True when `user` is the assigned technician.
    #[must_use]
    pub fn is_assigned_to(&self, user: UserId) -> bool {
        self.tech_id == Some(user)
    }
}

/// The financial record tied to a ticket once a technician sets a price.
///
/// The three amounts are computed once at creation and never recomputed;
/// `amount_total == platform_fee + tech_receives` holds exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier.
    pub id: PaymentId,
    /// The ticket this payment settles (1:1).
    pub ticket_id: TicketId,
    /// The paying client, denormalized from the ticket at creation.
    pub client_id: UserId,
    /// The receiving technician, denormalized from the ticket at creation.
    pub tech_id: UserId,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Gross amount the client pays.
    pub amount_total: Money,
    /// The platform's cut.
    pub platform_fee: Money,
    /// The technician's payout.
    pub tech_receives: Money,
    /// Client-supplied proof text, if any.
    pub proof_text: Option<String>,
    /// Client-supplied proof image reference, if any.
    pub proof_image_url: Option<String>,
    /// Who confirmed the payment.
    pub confirmed_by: Option<ActorRef>,
    /// When the payment was confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

/// A chat message inside a ticket's conversation.
///
/// Append-only; admitted only through the moderation gate. Observed in
/// creation-timestamp order within its ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: MessageId,
    /// The ticket whose conversation this message belongs to.
    pub ticket_id: TicketId,
    /// The author.
    pub sender_id: UserId,
    /// The author's role, snapshotted for rendering without a join.
    pub sender_role: Role,
    /// Message body.
    pub text: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditTarget {
    /// A support ticket.
    Ticket(TicketId),
    /// A payment record.
    Payment(PaymentId),
    /// A platform user.
    User(UserId),
    /// A chat message.
    Message(MessageId),
    /// A notification.
    Notification(NotificationId),
}

impl std::fmt::Display for AuditTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket:{id}"),
            Self::Payment(id) => write!(f, "payment:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::Message(id) => write!(f, "message:{id}"),
            Self::Notification(id) => write!(f, "notification:{id}"),
        }
    }
}

/// An append-only record of who did what.
///
/// Written atomically with every state-changing transition; never mutated
/// or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique identifier.
    pub id: AuditLogId,
    /// Who performed the action.
    pub actor: ActorRef,
    /// What was done, serialized in SCREAMING_SNAKE form.
    pub action: crate::events::AuditAction,
    /// The entity acted upon.
    pub target: AuditTarget,
    /// Optional human-readable details.
    pub details: Option<String>,
    /// When the action happened.
    pub created_at: DateTime<Utc>,
}

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,
    /// The recipient.
    pub user_id: UserId,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity/flavor.
    pub kind: NotificationKind,
    /// Whether the recipient has seen it. The only mutable field.
    pub read: bool,
    /// Optional link to the ticket the notification is about.
    pub link: Option<TicketId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_and_roundtrip() {
        let a = TicketId::new();
        let b = TicketId::new();
        assert_ne!(a, b);
        assert_eq!(a, TicketId::from_uuid(*a.as_uuid()));
    }

    #[test]
    fn money_from_major_is_cents() {
        assert_eq!(Money::from_major(100).as_cents(), 10_000);
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn money_checked_arithmetic() {
        let a = Money::from_cents(u64::MAX);
        assert!(a.checked_add(Money::from_cents(1)).is_none());
        assert_eq!(
            Money::from_cents(300).checked_sub(Money::from_cents(100)),
            Some(Money::from_cents(200))
        );
        assert!(Money::ZERO.checked_sub(Money::from_cents(1)).is_none());
    }

    #[test]
    fn fee_percent_bounds() {
        assert!(FeePercent::new(0).is_some());
        assert!(FeePercent::new(100).is_some());
        assert!(FeePercent::new(101).is_none());
        assert_eq!(FeePercent::STANDARD.as_u8(), 20);
    }

    #[test]
    fn role_parsing_normalizes_input() {
        assert_eq!("  Admin ".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("TECH".parse::<Role>().unwrap(), Role::Tech);
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn ticket_status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::AwaitingPayment).unwrap();
        assert_eq!(json, "\"awaiting_payment\"");
        let back: TicketStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, TicketStatus::InProgress);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TicketStatus::Completed.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
        assert!(!TicketStatus::Disputed.is_terminal());
        assert!(!PaymentStatus::Rejected.is_active());
        assert!(PaymentStatus::Confirmed.is_active());
    }
}
