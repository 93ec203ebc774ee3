//! # Tally Configuration
//!
//! Configuration for the financial core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH=/data/tally.db                                       │
//! │     TALLY_CURRENCY=USD                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.tally/tally.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     IQD, auto-post on, default chart of accounts                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! [database]
//! path = "/var/lib/tally/tally.db"
//! max_connections = 5
//!
//! [accounting]
//! currency = "IQD"
//! auto_post = true
//! post_purchase_journal = true
//!
//! [accounting.accounts]
//! cash = "1001"
//! receivables = "1100"
//!
//! [inventory]
//! low_stock_threshold = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use tally_core::accounting::codes;
use tally_core::money::Currency;
use tally_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `tally.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Resolved database file path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("com", "tally", "tally").map(|dirs| dirs.data_dir().join("tally.db"))
            })
            .unwrap_or_else(|| PathBuf::from("tally.db"))
    }
}

// =============================================================================
// Accounting Settings
// =============================================================================

/// Account codes the posting use cases write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCodes {
    #[serde(default = "default_cash")]
    pub cash: String,
    #[serde(default = "default_receivables")]
    pub receivables: String,
    #[serde(default = "default_inventory")]
    pub inventory: String,
    #[serde(default = "default_payables")]
    pub payables: String,
    #[serde(default = "default_revenue")]
    pub revenue: String,
    #[serde(default = "default_cogs")]
    pub cogs: String,
}

fn default_cash() -> String {
    codes::CASH.to_string()
}
fn default_receivables() -> String {
    codes::ACCOUNTS_RECEIVABLE.to_string()
}
fn default_inventory() -> String {
    codes::INVENTORY.to_string()
}
fn default_payables() -> String {
    codes::ACCOUNTS_PAYABLE.to_string()
}
fn default_revenue() -> String {
    codes::SALES_REVENUE.to_string()
}
fn default_cogs() -> String {
    codes::COST_OF_GOODS_SOLD.to_string()
}

impl Default for AccountCodes {
    fn default() -> Self {
        AccountCodes {
            cash: default_cash(),
            receivables: default_receivables(),
            inventory: default_inventory(),
            payables: default_payables(),
            revenue: default_revenue(),
            cogs: default_cogs(),
        }
    }
}

impl AccountCodes {
    fn all(&self) -> [(&'static str, &str); 6] {
        [
            ("cash", &self.cash),
            ("receivables", &self.receivables),
            ("inventory", &self.inventory),
            ("payables", &self.payables),
            ("revenue", &self.revenue),
            ("cogs", &self.cogs),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingSettings {
    /// Base currency; payment amounts are minor units of it.
    #[serde(default)]
    pub currency: Currency,

    /// Journal entries created by use cases are posted immediately.
    #[serde(default = "default_true")]
    pub auto_post: bool,

    /// Purchases create an inventory journal entry.
    #[serde(default = "default_true")]
    pub post_purchase_journal: bool,

    #[serde(default)]
    pub accounts: AccountCodes,
}

fn default_true() -> bool {
    true
}

impl Default for AccountingSettings {
    fn default() -> Self {
        AccountingSettings {
            currency: Currency::default(),
            auto_post: true,
            post_purchase_journal: true,
            accounts: AccountCodes::default(),
        }
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// A sale leaving a product at or below this stock raises `LowStock`.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    5
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub accounting: AccountingSettings,

    #[serde(default)]
    pub inventory: InventorySettings,
}

impl TallyConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ServiceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
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
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ServiceResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ServiceError::ConfigLoadFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.database.max_connections == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.inventory.low_stock_threshold < 0 {
            return Err(ServiceError::InvalidConfig(
                "low_stock_threshold must not be negative".into(),
            ));
        }

        for (name, code) in self.accounting.accounts.all() {
            if code.trim().is_empty() {
                return Err(ServiceError::InvalidConfig(format!(
                    "account code for '{}' is empty",
                    name
                )));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(currency) = std::env::var("TALLY_CURRENCY") {
            match currency.parse::<Currency>() {
                Ok(parsed) => self.accounting.currency = parsed,
                Err(_) => warn!(currency = %currency, "Unknown currency in environment"),
            }
        }

        if let Ok(flag) = std::env::var("TALLY_AUTO_POST") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.accounting.auto_post = true,
                "0" | "false" | "no" => self.accounting.auto_post = false,
                _ => warn!(value = %flag, "Unknown TALLY_AUTO_POST value"),
            }
        }

        if let Ok(threshold) = std::env::var("TALLY_LOW_STOCK_THRESHOLD") {
            if let Ok(t) = threshold.parse::<i64>() {
                self.inventory.low_stock_threshold = t;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally").map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    /// Database config built from the `[database]` section.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.resolved_path()).max_connections(self.database.max_connections)
    }

    pub fn currency(&self) -> Currency {
        self.accounting.currency
    }

    pub fn accounts(&self) -> &AccountCodes {
        &self.accounting.accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TallyConfig::default();
        assert_eq!(config.currency(), Currency::Iqd);
        assert!(config.accounting.auto_post);
        assert_eq!(config.accounts().cash, "1001");
        assert_eq!(config.inventory.low_stock_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TallyConfig = toml::from_str(
            r#"
            [accounting]
            currency = "USD"
            auto_post = false

            [accounting.accounts]
            cash = "1010"
            "#,
        )
        .unwrap();

        assert_eq!(config.currency(), Currency::Usd);
        assert!(!config.accounting.auto_post);
        assert_eq!(config.accounts().cash, "1010");
        assert_eq!(config.accounts().receivables, "1100");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TallyConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.accounting.accounts.revenue = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = TallyConfig::default();
        config.inventory.low_stock_threshold = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = TallyConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[accounting]"));
        assert!(toml_str.contains("[inventory]"));
    }
}
