//! # Engine Configuration
//!
//! Configuration management for the marketplace engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BAZAAR_SWEEP_INTERVAL_SECS=2                                       │
//! │     BAZAAR_MAX_CAS_RETRIES=128                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/bazaar/bazaar.toml (Linux)                               │
//! │     ~/Library/Application Support/com.bazaar.engine/bazaar.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bazaar.toml
//! [auction]
//! sweep_enabled = true
//! sweep_interval_secs = 5
//!
//! [reservation]
//! max_cas_retries = 64
//!
//! [events]
//! channel_capacity = 256
//!
//! [pricing]
//! max_discounts_per_shop = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Auction Settings
// =============================================================================

/// Expiry sweeper behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSettings {
    /// Run the background sweeper that finalizes expired auctions.
    /// Expiry is also checked lazily on every bid, so this is optional.
    #[serde(default = "default_true")]
    pub sweep_enabled: bool,

    /// Interval between sweeps (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl AuctionSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    5
}

impl Default for AuctionSettings {
    fn default() -> Self {
        AuctionSettings {
            sweep_enabled: true,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

// =============================================================================
// Reservation Settings
// =============================================================================

/// Stock counter behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// Compare-and-swap attempts per line before reporting contention.
    #[serde(default = "default_max_cas_retries")]
    pub max_cas_retries: u32,
}

fn default_max_cas_retries() -> u32 {
    64
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings {
            max_cas_retries: default_max_cas_retries(),
        }
    }
}

// =============================================================================
// Event Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Broadcast ring size. Subscribers further behind than this lag.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Upper bound on a shop's discount set.
    #[serde(default = "default_max_discounts")]
    pub max_discounts_per_shop: usize,
}

fn default_max_discounts() -> usize {
    64
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            max_discounts_per_shop: default_max_discounts(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub auction: AuctionSettings,

    #[serde(default)]
    pub reservation: ReservationSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub pricing: PricingSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bazaar.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.auction.sweep_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if self.reservation.max_cas_retries == 0 {
            return Err(EngineError::InvalidConfig(
                "max_cas_retries must be greater than 0".into(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "channel_capacity must be greater than 0".into(),
            ));
        }

        if self.pricing.max_discounts_per_shop == 0 {
            return Err(EngineError::InvalidConfig(
                "max_discounts_per_shop must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        let ignored = self.apply_overrides(|key| std::env::var(key).ok());
        if !ignored.is_empty() {
            warn!(?ignored, "Some environment overrides were ignored");
        }
    }

    /// Applies `BAZAAR_*` overrides from any key lookup. Values that do not
    /// parse are logged and skipped; their keys are returned.
    fn apply_overrides<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();

        if let Some(value) = lookup("BAZAAR_SWEEP_ENABLED") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.auction.sweep_enabled = true,
                "0" | "false" | "no" | "off" => self.auction.sweep_enabled = false,
                _ => {
                    warn!(value = %value, "Unknown BAZAAR_SWEEP_ENABLED value");
                    ignored.push("BAZAAR_SWEEP_ENABLED");
                }
            }
        }

        if let Some(secs) = parse_override(&lookup, "BAZAAR_SWEEP_INTERVAL_SECS", &mut ignored) {
            debug!(secs, "Overriding sweep interval from environment");
            self.auction.sweep_interval_secs = secs;
        }
        if let Some(retries) = parse_override(&lookup, "BAZAAR_MAX_CAS_RETRIES", &mut ignored) {
            self.reservation.max_cas_retries = retries;
        }
        if let Some(capacity) = parse_override(&lookup, "BAZAAR_EVENT_CHANNEL_CAPACITY", &mut ignored) {
            self.events.channel_capacity = capacity;
        }
        if let Some(max) = parse_override(&lookup, "BAZAAR_MAX_DISCOUNTS_PER_SHOP", &mut ignored) {
            self.pricing.max_discounts_per_shop = max;
        }

        ignored
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bazaar", "engine")
            .map(|dirs| dirs.config_dir().join("bazaar.toml"))
    }
}

/// Parses one numeric override, warning about values that do not parse.
fn parse_override<T, F>(lookup: &F, key: &'static str, ignored: &mut Vec<&'static str>) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring invalid environment override");
            ignored.push(key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.auction.sweep_enabled);
        assert_eq!(config.auction.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.reservation.max_cas_retries, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.auction.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.reservation.max_cas_retries = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.events.channel_capacity = 0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BAZAAR_SWEEP_ENABLED", "off"),
            ("BAZAAR_SWEEP_INTERVAL_SECS", "2"),
            ("BAZAAR_MAX_DISCOUNTS_PER_SHOP", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        let ignored = config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(ignored.is_empty());
        assert!(!config.auction.sweep_enabled);
        assert_eq!(config.auction.sweep_interval_secs, 2);
        assert_eq!(config.pricing.max_discounts_per_shop, 8);
    }

    #[test]
    fn test_invalid_overrides_are_reported() {
        let vars: HashMap<&str, &str> = [
            ("BAZAAR_SWEEP_ENABLED", "maybe"),
            ("BAZAAR_MAX_CAS_RETRIES", "not-a-number"),
            ("BAZAAR_EVENT_CHANNEL_CAPACITY", "-5"),
            ("BAZAAR_MAX_DISCOUNTS_PER_SHOP", "12"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        let ignored = config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(
            ignored,
            vec![
                "BAZAAR_SWEEP_ENABLED",
                "BAZAAR_MAX_CAS_RETRIES",
                "BAZAAR_EVENT_CHANNEL_CAPACITY"
            ]
        );
        // Bad values leave the defaults alone, good ones still apply
        assert!(config.auction.sweep_enabled);
        assert_eq!(config.reservation.max_cas_retries, 64);
        assert_eq!(config.events.channel_capacity, 256);
        assert_eq!(config.pricing.max_discounts_per_shop, 12);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("[auction]\nsweep_interval_secs = 9\n").unwrap();
        assert_eq!(config.auction.sweep_interval_secs, 9);
        assert!(config.auction.sweep_enabled);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bazaar.toml");

        let mut config = EngineConfig::default();
        config.pricing.max_discounts_per_shop = 12;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[pricing]"));

        let reloaded: EngineConfig = toml::from_str(&contents).unwrap();
        assert_eq!(reloaded.pricing.max_discounts_per_shop, 12);
    }

    #[test]
    fn test_invalid_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bazaar.toml");
        std::fs::write(&path, "[auction\nbroken").unwrap();

        assert!(matches!(
            EngineConfig::load(Some(path.clone())),
            Err(EngineError::ConfigLoadFailed(_))
        ));
        // Falls back instead of failing
        assert!(EngineConfig::load_or_default(Some(path)).validate().is_ok());
    }
}
