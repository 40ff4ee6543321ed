//! Runtime settings.
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (TOML, JSON or YAML by extension), then `SETTLEMENT_*` environment
//! variables. Nested keys use a double underscore, so
//! `SETTLEMENT_POINTS__PER_UNIT=20` sets `points.per_unit`.

use crate::application::poller::PollConfig;
use crate::domain::allocation::Allocator;
use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    /// Points worth one currency unit.
    pub per_unit: u32,
    /// Reject a charge that asks for more points than the user holds instead
    /// of clamping the request to the balance.
    pub strict: bool,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            per_unit: 10,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Decimal places kept on ledger portions.
    pub scale: u32,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub points: PointsConfig,
    pub currency: CurrencyConfig,
    pub poll: PollSettings,
    pub logging: LoggingConfig,
}

impl SettlementConfig {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("SETTLEMENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn allocator(&self) -> Result<Allocator> {
        Ok(Allocator::new(self.points.per_unit, self.currency.scale)?.strict(self.points.strict))
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll.interval_ms),
            timeout: Duration::from_millis(self.poll.timeout_ms),
        }
    }
}
