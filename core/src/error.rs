//! Error types for lifecycle transitions.
//!
//! Every rejected transition names the violated rule in its message so
//! operators can diagnose refusals straight from logs and the audit trail.

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Error Type
// ═══════════════════════════════════════════════════════════════════════════

/// Why a lifecycle transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The actor lacks the role or ownership the transition requires.
    #[error("not authorized: {rule}")]
    Unauthorized {
        /// The violated rule.
        rule: String,
    },

    /// The entity's current status does not permit the transition.
    #[error("invalid state: {rule}")]
    InvalidState {
        /// The violated rule.
        rule: String,
    },

    /// A precondition held at validation time but not at commit time.
    #[error("conflicting concurrent update on {entity}")]
    Conflict {
        /// The entity whose version check failed.
        entity: String,
    },

    /// The request payload is malformed.
    #[error("validation failed: {rule}")]
    Validation {
        /// The violated rule.
        rule: String,
    },

    /// A required external collaborator could not be reached.
    #[error("collaborator unavailable: {collaborator}")]
    CollaboratorUnavailable {
        /// Which collaborator failed.
        collaborator: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl LifecycleError {
    /// Authorization failure naming the violated rule.
    pub fn unauthorized(rule: impl Into<String>) -> Self {
        Self::Unauthorized { rule: rule.into() }
    }

    /// State-machine failure naming the violated rule.
    pub fn invalid_state(rule: impl Into<String>) -> Self {
        Self::InvalidState { rule: rule.into() }
    }

    /// Commit-time conflict on the named entity.
    pub fn conflict(entity: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
        }
    }

    /// Input validation failure naming the violated rule.
    pub fn validation(rule: impl Into<String>) -> Self {
        Self::Validation { rule: rule.into() }
    }

    /// Collaborator outage naming the collaborator.
    pub fn collaborator_unavailable(collaborator: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: collaborator.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════

impl LifecycleError {
    /// Stable lowercase label for the variant, for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidState { .. } => "invalid_state",
            Self::Conflict { .. } => "conflict",
            Self::Validation { .. } => "validation",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
        }
    }

    /// True when the caller sent a well-formed request that the rules refuse.
    ///
    /// Callers should not retry these without changing the request.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::InvalidState { .. } | Self::Validation { .. }
        )
    }

    /// True when a concurrent mutation beat this transition to the commit.
    ///
    /// Retrying against a fresh snapshot is reasonable.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True when an external dependency failed, not the request itself.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }
}
