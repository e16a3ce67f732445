//! Runtime configuration loaded from environment variables.
//!
//! Every knob has a sensible default; a missing or unparsable variable
//! falls back rather than failing startup. The fee rate is the one value
//! worth a warning when it is set but invalid, since it prices every
//! ticket created afterwards.

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use remotedesk_core::types::FeePercent;
use remotedesk_core::{Environment, SystemClock};

/// Support-desk runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Platform fee rate snapshotted onto new tickets.
    pub platform_fee: FeePercent,
    /// Capacity of the in-memory store's change broadcast channel.
    pub change_capacity: usize,
}

impl DeskConfig {
    /// Loads configuration from environment variables.
    ///
    /// Reads `REMOTEDESK_FEE_PCT` (integer percentage, `0..=100`) and
    /// `REMOTEDESK_CHANGE_CAPACITY`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            platform_fee: fee_from_env(),
            change_capacity: env::var("REMOTEDESK_CHANGE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64),
        }
    }

    /// Builds the engine environment: system clock plus the configured fee.
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::new(Arc::new(SystemClock), self.platform_fee)
    }
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            platform_fee: FeePercent::STANDARD,
            change_capacity: 64,
        }
    }
}

fn fee_from_env() -> FeePercent {
    match env::var("REMOTEDESK_FEE_PCT") {
        Ok(raw) => match raw.parse().ok().and_then(FeePercent::new) {
            Some(fee) => fee,
            None => {
                tracing::warn!(
                    raw,
                    default = %FeePercent::STANDARD,
                    "REMOTEDESK_FEE_PCT is not a percentage in 0..=100, using default"
                );
                FeePercent::STANDARD
            }
        },
        Err(_) => FeePercent::STANDARD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_standard_rate() {
        let config = DeskConfig::default();
        assert_eq!(config.platform_fee, FeePercent::STANDARD);
        assert_eq!(config.change_capacity, 64);
    }

    #[test]
    fn environment_carries_the_configured_fee() {
        let config = DeskConfig {
            platform_fee: FeePercent::new(10).unwrap_or(FeePercent::STANDARD),
            change_capacity: 8,
        };
        let env = config.environment();
        assert_eq!(env.platform_fee.as_u8(), 10);
    }
}
