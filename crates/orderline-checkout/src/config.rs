//! # Checkout Configuration
//!
//! Configuration management for the checkout service.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     ORDERLINE_DATABASE_PATH=/var/lib/orderline/orderline.db             │
//! │     ORDERLINE_TAX_RATE_BPS=1100                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/orderline/orderline.toml (Linux)                          │
//! │     ~/Library/Application Support/com.orderline.orderline/... (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     11% tax, reseller tiers 10/15/20%, 10 s collaborator timeout        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # orderline.toml
//! [database]
//! path = "/var/lib/orderline/orderline.db"
//! max_connections = 5
//! busy_timeout_secs = 15
//!
//! [pricing]
//! tax_rate_bps = 1100
//! free_shipping_threshold = 500000
//!
//! [[pricing.reseller_tiers]]
//! min_quantity = 1
//! discount_bps = 1000
//!
//! [[pricing.reseller_tiers]]
//! min_quantity = 12
//! discount_bps = 1500
//!
//! [shipping]
//! origin = "JKT"
//!
//! [collaborators]
//! timeout_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use orderline_core::{Money, PricingConfig, ResellerTier, TaxRate};
use orderline_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the SQLite lock (seconds).
    /// Must exceed `collaborators.timeout_secs`: the checkout transaction
    /// stays open while the payment gateway answers.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("orderline.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    15
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

/// Tax, reseller discounts and the free-shipping threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Tax rate in basis points (1100 = 11%).
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    /// Discounted subtotal (minor units) from which shipping is free.
    #[serde(default)]
    pub free_shipping_threshold: Option<i64>,

    /// Reseller discount steps by line quantity.
    #[serde(default = "default_reseller_tiers")]
    pub reseller_tiers: Vec<ResellerTier>,
}

fn default_tax_rate_bps() -> u32 {
    PricingConfig::default().tax_rate.bps()
}

fn default_reseller_tiers() -> Vec<ResellerTier> {
    PricingConfig::default().reseller_tiers
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            tax_rate_bps: default_tax_rate_bps(),
            free_shipping_threshold: None,
            reseller_tiers: default_reseller_tiers(),
        }
    }
}

// =============================================================================
// Shipping & Collaborator Settings
// =============================================================================

/// Where parcels ship from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingSettings {
    /// Origin city/area code passed to the shipping rate provider.
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    "JKT".to_string()
}

impl Default for ShippingSettings {
    fn default() -> Self {
        ShippingSettings {
            origin: default_origin(),
        }
    }
}

/// Bounds on calls to external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorSettings {
    /// Payment gateway and notification timeout (seconds).
    #[serde(default = "default_collaborator_timeout")]
    pub timeout_secs: u64,
}

fn default_collaborator_timeout() -> u64 {
    10
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        CollaboratorSettings {
            timeout_secs: default_collaborator_timeout(),
        }
    }
}

// =============================================================================
// Main Checkout Configuration
// =============================================================================

/// Complete checkout configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub shipping: ShippingSettings,

    #[serde(default)]
    pub collaborators: CollaboratorSettings,
}

impl CheckoutConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (orderline.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
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
            warn!("Failed to load checkout config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Checkout config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.pricing_config().validate()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.collaborators.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "collaborators.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.database.busy_timeout_secs <= self.collaborators.timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "database.busy_timeout_secs ({}) must exceed collaborators.timeout_secs ({})",
                self.database.busy_timeout_secs, self.collaborators.timeout_secs
            )));
        }

        if self.shipping.origin.trim().is_empty() {
            return Err(ConfigError::Invalid("shipping.origin is required".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ORDERLINE_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(rate) = std::env::var("ORDERLINE_TAX_RATE_BPS") {
            match rate.parse::<u32>() {
                Ok(bps) => self.pricing.tax_rate_bps = bps,
                Err(_) => warn!(value = %rate, "Ignoring non-numeric ORDERLINE_TAX_RATE_BPS"),
            }
        }

        if let Ok(threshold) = std::env::var("ORDERLINE_FREE_SHIPPING_THRESHOLD") {
            if threshold.trim().is_empty() {
                self.pricing.free_shipping_threshold = None;
            } else {
                match threshold.parse::<i64>() {
                    Ok(minor) => self.pricing.free_shipping_threshold = Some(minor),
                    Err(_) => warn!(value = %threshold, "Ignoring non-numeric ORDERLINE_FREE_SHIPPING_THRESHOLD"),
                }
            }
        }

        if let Ok(origin) = std::env::var("ORDERLINE_ORIGIN_CITY") {
            self.shipping.origin = origin;
        }

        if let Ok(secs) = std::env::var("ORDERLINE_COLLABORATOR_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                debug!(secs = s, "Overriding collaborator timeout from environment");
                self.collaborators.timeout_secs = s;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "orderline", "orderline")
            .map(|dirs| dirs.config_dir().join("orderline.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Pricing rules for the core engine.
    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            tax_rate: TaxRate::from_bps(self.pricing.tax_rate_bps),
            reseller_tiers: self.pricing.reseller_tiers.clone(),
            free_shipping_threshold: self.pricing.free_shipping_threshold.map(Money::from_minor),
        }
    }

    /// Pool settings for the database layer.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    /// Upper bound on a single collaborator call.
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborators.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pricing.tax_rate_bps, 1100);
        assert_eq!(config.collaborators.timeout_secs, 10);
        assert_eq!(config.pricing_config(), PricingConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CheckoutConfig::default();

        config.database.busy_timeout_secs = 10;
        assert!(config.validate().is_err());

        config.database.busy_timeout_secs = 15;
        config.pricing.tax_rate_bps = 20_000;
        assert!(config.validate().is_err());

        config.pricing.tax_rate_bps = 1100;
        config.shipping.origin = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CheckoutConfig = toml::from_str(
            r#"
            [pricing]
            tax_rate_bps = 1200
            free_shipping_threshold = 500000

            [[pricing.reseller_tiers]]
            min_quantity = 6
            discount_bps = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.pricing.tax_rate_bps, 1200);
        assert_eq!(config.database.busy_timeout_secs, 15);
        assert_eq!(config.shipping.origin, "JKT");

        let pricing = config.pricing_config();
        assert_eq!(pricing.free_shipping_threshold, Some(Money::from_minor(500_000)));
        assert_eq!(pricing.reseller_discount_bps(5), None);
        assert_eq!(pricing.reseller_discount_bps(6), Some(500));
    }

    #[test]
    fn test_toml_serialization() {
        let config = CheckoutConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[pricing]"));
        assert!(toml_str.contains("[collaborators]"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let path = std::env::temp_dir().join(format!("orderline-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[shipping]\norigin = \"SUB\"\n").unwrap();

        let config = CheckoutConfig::load(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(!config.shipping.origin.is_empty());
        assert_eq!(config.db_config().max_connections, 5);
    }
}
