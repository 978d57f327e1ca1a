//! Configuration loading and management
//!
//! Handles parsing of `.taskorder.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::space::{
    Position, AFTER_LAST_SPREAD, BASE_SPACING, END_SPREAD, POSITION_CEILING, POSITION_FLOOR,
    SEED_MAX, SEED_MIN,
};

/// Name of the configuration file at the data root
pub const CONFIG_FILE: &str = ".taskorder.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Position allocation tuning
    #[serde(default)]
    pub ordering: OrderingConfig,

    /// Gap detection and rebalance worker tuning
    #[serde(default)]
    pub rebalance: RebalanceConfig,
}

/// Allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Distance used for appends and top inserts
    #[serde(default = "default_spacing")]
    pub spacing: Position,

    /// First position in an empty scope is drawn from `[seed_min, seed_max)`
    #[serde(default = "default_seed_min")]
    pub seed_min: Position,

    #[serde(default = "default_seed_max")]
    pub seed_max: Position,

    /// Random spread when inserting after the last sibling
    #[serde(default = "default_after_last_spread")]
    pub after_last_spread: Position,

    /// Random spread when appending to the end
    #[serde(default = "default_end_spread")]
    pub end_spread: Position,
}

fn default_spacing() -> Position {
    BASE_SPACING
}

fn default_seed_min() -> Position {
    SEED_MIN
}

fn default_seed_max() -> Position {
    SEED_MAX
}

fn default_after_last_spread() -> Position {
    AFTER_LAST_SPREAD
}

fn default_end_spread() -> Position {
    END_SPREAD
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            spacing: default_spacing(),
            seed_min: default_seed_min(),
            seed_max: default_seed_max(),
            after_last_spread: default_after_last_spread(),
            end_spread: default_end_spread(),
        }
    }
}

/// Rebalance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Scopes with fewer kept siblings are never rebalanced
    #[serde(default = "default_min_siblings")]
    pub min_siblings: usize,

    /// Rebalance when the smallest positive gap drops below this
    #[serde(default = "default_min_gap")]
    pub min_gap: Position,

    /// Rebalance when the largest position exceeds this
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: Position,

    /// Distance between neighbours after a rebalance
    #[serde(default = "default_spacing")]
    pub spacing: Position,

    /// Attempts per scope before the background worker gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Interval between retry passes in the background worker
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Capacity of the background worker's command channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_min_siblings() -> usize {
    10
}

fn default_min_gap() -> Position {
    2
}

fn default_high_water_mark() -> Position {
    2_000_000_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_siblings: default_min_siblings(),
            min_gap: default_min_gap(),
            high_water_mark: default_high_water_mark(),
            spacing: default_spacing(),
            max_attempts: default_max_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a `.taskorder.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data root, or return defaults
    pub fn load_from_root(root: &Path) -> Self {
        let config_path = Self::path_for(root);
        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(path = %config_path.display(), %err, "ignoring invalid config");
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }

    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.ordering.validate()?;
        self.rebalance.validate()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> crate::error::Error {
    crate::error::Error::InvalidConfig(message.into())
}

impl OrderingConfig {
    fn validate(&self) -> crate::error::Result<()> {
        for (name, value) in [
            ("spacing", self.spacing),
            ("after_last_spread", self.after_last_spread),
            ("end_spread", self.end_spread),
        ] {
            if value <= 0 || value > POSITION_CEILING {
                return Err(invalid(format!(
                    "ordering.{name} must be in 1..={POSITION_CEILING}"
                )));
            }
        }
        if self.seed_min < POSITION_FLOOR || self.seed_max > POSITION_CEILING {
            return Err(invalid(format!(
                "ordering.seed_min and ordering.seed_max must be in {POSITION_FLOOR}..={POSITION_CEILING}"
            )));
        }
        if self.seed_min >= self.seed_max {
            return Err(invalid("ordering.seed_min must be < ordering.seed_max"));
        }
        Ok(())
    }
}

impl RebalanceConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.min_siblings < 2 {
            return Err(invalid("rebalance.min_siblings must be >= 2"));
        }
        if self.min_gap < 1 {
            return Err(invalid("rebalance.min_gap must be >= 1"));
        }
        if self.high_water_mark <= 0 || self.high_water_mark > POSITION_CEILING {
            return Err(invalid(format!(
                "rebalance.high_water_mark must be in 1..={POSITION_CEILING}"
            )));
        }
        if self.spacing <= 0 || self.spacing > POSITION_CEILING {
            return Err(invalid(format!(
                "rebalance.spacing must be in 1..={POSITION_CEILING}"
            )));
        }
        if self.spacing < self.min_gap {
            return Err(invalid("rebalance.spacing must be >= rebalance.min_gap"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("rebalance.max_attempts must be >= 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("rebalance.queue_capacity must be >= 1"));
        }
        Ok(())
    }
}
