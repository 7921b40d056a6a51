//! Bot configuration loaded from a TOML file
//!
//! Every field carries a serde default so a partial (or missing) config
//! file yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::Result;
use crate::types::Points;

/// Timing and channel settings for one drop kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropTiming {
    /// Minimum delay in seconds before the next drop is scheduled
    pub min_delay_secs: u64,
    /// Maximum delay in seconds before the next drop is scheduled
    pub max_delay_secs: u64,
    /// How long a published drop stays claimable, in seconds
    pub claim_window_secs: u64,
    /// Channel names the offer may be published to
    pub channels: Vec<String>,
}

impl Default for DropTiming {
    fn default() -> Self {
        Self {
            min_delay_secs: 20 * 60,
            max_delay_secs: 90 * 60,
            claim_window_secs: 10 * 60,
            channels: Vec::new(),
        }
    }
}

impl DropTiming {
    pub fn claim_window(&self) -> Duration {
        Duration::from_secs(self.claim_window_secs)
    }
}

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Directory holding the ledger, collection, and policy snapshots
    pub data_dir: PathBuf,
    /// Directory holding the content pool images
    pub pool_dir: PathBuf,
    pub coin: DropTiming,
    pub toy: DropTiming,
    /// Window in milliseconds during which repeated actions from the
    /// same participant on the same drop are coalesced
    pub debounce_interval_ms: u64,
    /// Inclusive lower bound for the random toy cost
    pub toy_cost_min: Points,
    /// Inclusive upper bound for the random toy cost
    pub toy_cost_max: Points,
    /// Size of the recency ring excluding recently offered assets
    pub recent_use_limit: usize,
    /// Whether a winner retracting their claim is refunded
    pub refund_on_retract: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            pool_dir: PathBuf::from("downloads"),
            coin: DropTiming {
                channels: vec!["coin-collectors".to_string()],
                ..DropTiming::default()
            },
            toy: DropTiming {
                min_delay_secs: 45 * 60,
                max_delay_secs: 3 * 60 * 60,
                claim_window_secs: 24 * 60 * 60,
                channels: vec!["toy-collectors".to_string()],
            },
            debounce_interval_ms: 5000,
            toy_cost_min: 5,
            toy_cost_max: 10,
            recent_use_limit: 50,
            refund_on_retract: true,
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    /// Timing settings for the given drop kind
    pub fn timing(&self, kind: crate::models::DropKind) -> &DropTiming {
        match kind {
            crate::models::DropKind::Coin => &self.coin,
            crate::models::DropKind::Toy => &self.toy,
        }
    }
}
