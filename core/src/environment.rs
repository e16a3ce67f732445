//! Engine environment: injected dependencies for pure decision code.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::FeePercent;

/// Provides the current time (mockable for testing).
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the real current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Dependencies handed to every lifecycle engine call.
///
/// Engines are pure decision code; the clock and the current fee rate are
/// the only outside facts they may consult.
#[derive(Clone)]
pub struct Environment {
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// The platform fee rate snapshotted onto newly created tickets.
    pub platform_fee: FeePercent,
}

impl Environment {
    /// Creates an environment with the given clock and fee rate.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, platform_fee: FeePercent) -> Self {
        Self {
            clock,
            platform_fee,
        }
    }

    /// Real clock, standard fee rate.
    #[must_use]
    pub fn live() -> Self {
        Self::new(Arc::new(SystemClock), FeePercent::STANDARD)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("platform_fee", &self.platform_fee)
            .finish_non_exhaustive()
    }
}
