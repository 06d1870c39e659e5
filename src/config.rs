// 7.0 config.rs: all settings in one place. system trading defaults, feed, poller.
// 7.1 Settings is what operators change at runtime; the engine re-reads it per operation.
// 7.2 AppConfig is the static process config, loaded from TOML.

use crate::engine::EngineConfig;
use crate::types::MarketClass;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default leverage cap per market class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageCaps {
    pub crypto: Decimal,
    pub stock: Decimal,
    pub forex: Decimal,
    pub commodity: Decimal,
    pub index: Decimal,
}

impl LeverageCaps {
    pub fn for_class(&self, market: MarketClass) -> Decimal {
        match market {
            MarketClass::Crypto => self.crypto,
            MarketClass::Stock => self.stock,
            MarketClass::Forex => self.forex,
            MarketClass::Commodity => self.commodity,
            MarketClass::Index => self.index,
        }
    }
}

impl Default for LeverageCaps {
    fn default() -> Self {
        Self {
            crypto: Decimal::new(10, 0),
            stock: Decimal::new(5, 0),
            forex: Decimal::new(100, 0),
            commodity: Decimal::new(10, 0),
            index: Decimal::new(10, 0),
        }
    }
}

/// Upstream market data credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    pub iex: String,
    pub fcs: String,
}

/** 7.1: system-wide trading defaults. zero means not configured */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub leverage: LeverageCaps,
    // auto-close loss % when an order has no stop loss of its own
    pub stop_loss_protection: Decimal,
    // auto-close gain % when an order has no take profit of its own
    pub take_profit_protection: Decimal,
    // max stop loss % a member may set, unless the member has a lower allowance
    pub stop_loss_allowed: Decimal,
    // max take profit % a member may set
    pub take_profit_allowed: Decimal,
    pub api_keys: ApiKeys,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            leverage: LeverageCaps::default(),
            stop_loss_protection: Decimal::ZERO,
            take_profit_protection: Decimal::ZERO,
            stop_loss_allowed: Decimal::ZERO,
            take_profit_allowed: Decimal::ZERO,
            api_keys: ApiKeys::default(),
        }
    }
}

impl Settings {
    /// Preset with protection enabled, used by the simulation.
    pub fn protected() -> Self {
        Self {
            stop_loss_protection: Decimal::new(50, 0),
            take_profit_protection: Decimal::new(100, 0),
            stop_loss_allowed: Decimal::new(90, 0),
            take_profit_allowed: Decimal::new(500, 0),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for market in MarketClass::ALL {
            let cap = self.leverage.for_class(market);
            if !cap.is_zero() && cap < Decimal::ONE {
                return Err(ConfigError::InvalidSettings {
                    reason: format!("{market} leverage cap must be zero or at least 1"),
                });
            }
        }
        let percents = [
            ("stop_loss_protection", self.stop_loss_protection),
            ("take_profit_protection", self.take_profit_protection),
            ("stop_loss_allowed", self.stop_loss_allowed),
            ("take_profit_allowed", self.take_profit_allowed),
        ];
        for (name, value) in percents {
            if value < Decimal::ZERO {
                return Err(ConfigError::InvalidSettings {
                    reason: format!("{name} cannot be negative"),
                });
            }
        }
        Ok(())
    }
}

/// Read-only view of the current settings. Re-read per operation.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Result<Settings, ConfigError>;
}

/// Settings held in memory and replaceable at runtime.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        *self.inner.write() = settings;
        Ok(())
    }

    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<(), ConfigError> {
        let mut next = self.inner.read().clone();
        change(&mut next);
        self.replace(next)
    }
}

impl SettingsProvider for SharedSettings {
    fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(self.inner.read().clone())
    }
}

// Price feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub cryptonator_url: String,
    pub iex_url: String,
    pub fcs_url: String,
    // per-request timeout
    pub request_timeout_ms: u64,
    // attempts per fetch, including the first
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cryptonator_url: "https://api.cryptonator.com".to_string(),
            iex_url: "https://cloud.iexapis.com/stable".to_string(),
            fcs_url: "https://fcsapi.com/api-v2".to_string(),
            request_timeout_ms: 10_000,
            retry_attempts: 3,
            retry_backoff_ms: 2_000,
        }
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// Polling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub poll_interval_secs: u64,
    // bounded parallelism for per-asset updates
    pub max_concurrency: usize,
    // how stale an asset must be before it is polled again
    pub crypto_interval_secs: u64,
    pub stock_interval_secs: u64,
    pub forex_interval_secs: u64,
    pub commodity_interval_secs: u64,
    pub index_interval_secs: u64,
    // rate samples older than this are pruned
    pub sample_retention_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 20,
            max_concurrency: 8,
            crypto_interval_secs: 20,
            stock_interval_secs: 60,
            forex_interval_secs: 20,
            commodity_interval_secs: 300,
            index_interval_secs: 60,
            sample_retention_secs: 86_400,
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn update_interval(&self, market: MarketClass) -> Duration {
        let secs = match market {
            MarketClass::Crypto => self.crypto_interval_secs,
            MarketClass::Stock => self.stock_interval_secs,
            MarketClass::Forex => self.forex_interval_secs,
            MarketClass::Commodity => self.commodity_interval_secs,
            MarketClass::Index => self.index_interval_secs,
        };
        Duration::from_secs(secs)
    }
}

/** 7.2: the complete process configuration */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings: Settings,
    pub feed: FeedConfig,
    pub poller: PollerConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;

        if self.feed.retry_attempts == 0 {
            return Err(ConfigError::InvalidFeed {
                reason: "Need at least 1 fetch attempt".to_string(),
            });
        }
        if self.feed.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidFeed {
                reason: "Request timeout must be positive".to_string(),
            });
        }

        if self.poller.max_concurrency == 0 {
            return Err(ConfigError::InvalidPoller {
                reason: "Concurrency must be at least 1".to_string(),
            });
        }
        if self.poller.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPoller {
                reason: "Poll interval must be positive".to_string(),
            });
        }

        if self.engine.sample_throttle_ms < 0 || self.engine.change_lookback_ms <= 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "Sample windows must be positive".to_string(),
            });
        }
        if self.engine.channel.is_empty() {
            return Err(ConfigError::InvalidEngine {
                reason: "Notification channel needs a name".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("Invalid feed config: {reason}")]
    InvalidFeed { reason: String },

    #[error("Invalid poller config: {reason}")]
    InvalidPoller { reason: String },

    #[error("Invalid engine config: {reason}")]
    InvalidEngine { reason: String },

    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Cannot parse config: {0}")]
    Parse(String),

    #[error("Settings unavailable: {0}")]
    Unavailable(String),
}
