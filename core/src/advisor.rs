//! Advisory text services: auto-categorization and audit summaries.
//!
//! Both are best-effort. A failing advisor never fails the operation that
//! consulted it; callers fall back to a default label and log at warn.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::AuditLogEntry;

/// The category applied when no suggestion is available.
pub const DEFAULT_CATEGORY: &str = "Other";

/// The platform's standard category labels.
pub const CATEGORIES: [&str; 5] = ["Hardware", "Software", "Network", "Security", "Other"];

/// Failure to obtain an advisory answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("advisor failed: {message}")]
pub struct AdvisorError {
    /// What went wrong.
    pub message: String,
}

impl AdvisorError {
    /// Wraps a failure description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Suggests a category label for a problem description.
#[async_trait]
pub trait CategoryAdvisor: Send + Sync {
    /// Returns a category label, ideally one of [`CATEGORIES`].
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError`] when no suggestion could be obtained.
    async fn suggest_category(&self, description: &str) -> Result<String, AdvisorError>;
}

/// Produces a short human-readable line for an audit entry.
#[async_trait]
pub trait AuditSummarizer: Send + Sync {
    /// Summarizes one audit entry for display.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError`] when no summary could be produced.
    async fn summarize(&self, entry: &AuditLogEntry) -> Result<String, AdvisorError>;
}

/// Asks the advisor for a category, falling back to [`DEFAULT_CATEGORY`].
pub async fn categorize_with_fallback(
    advisor: &dyn CategoryAdvisor,
    description: &str,
) -> String {
    match advisor.suggest_category(description).await {
        Ok(label) => {
            let trimmed = label.trim();
            if trimmed.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "category advisor unavailable; using default");
            DEFAULT_CATEGORY.to_string()
        }
    }
}

/// Asks the summarizer to describe an entry, falling back to its raw
/// action label and details.
pub async fn describe_with_fallback(
    summarizer: &dyn AuditSummarizer,
    entry: &AuditLogEntry,
) -> String {
    match summarizer.summarize(entry).await {
        Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
        Ok(_) | Err(_) => match &entry.details {
            Some(details) => format!("{}: {details}", entry.action.as_str()),
            None => entry.action.as_str().to_string(),
        },
    }
}
