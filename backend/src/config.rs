//! Configuration management for the pharmacy ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::{PaymentMethod, DEFAULT_SEQUENCE_WIDTH};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Store selection
    pub store: StoreConfig,

    /// Ledger behaviour
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

/// Which ledger store backs the server
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// JSON catalog loaded into the memory store at startup
    pub seed_path: Option<String>,
}

/// Counter methods a walk-in retail sale can be settled with by default
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetailMethod {
    Cash,
    Card,
    MobileWallet,
}

impl RetailMethod {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            RetailMethod::Cash => PaymentMethod::Cash,
            RetailMethod::Card => PaymentMethod::Card { reference: None },
            RetailMethod::MobileWallet => PaymentMethod::MobileWallet { reference: None },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Zero-padding of the per-day transaction sequence
    pub sequence_width: usize,

    /// Method recorded when a retail sale is paid in full at creation
    pub retail_method: RetailMethod,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sequence_width: DEFAULT_SEQUENCE_WIDTH,
            retail_method: RetailMethod::Cash,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("store.backend", "postgres")?
            .set_default("ledger.sequence_width", DEFAULT_SEQUENCE_WIDTH as i64)?
            .set_default("ledger.retail_method", "cash")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "database.url is required for the postgres store".to_string(),
            ));
        }
        if !(1..=12).contains(&self.ledger.sequence_width) {
            return Err(ConfigError::Message(
                "ledger.sequence_width must be between 1 and 12".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
