//! API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use stockroom_core::CheckoutConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address (`STOCKROOM_BIND_ADDR`, default `0.0.0.0:8080`)
    pub bind_addr: SocketAddr,

    /// SQLite database file (`STOCKROOM_DB_PATH`, default `stockroom.db`)
    pub db_path: PathBuf,

    /// Pool size (`STOCKROOM_DB_MAX_CONNECTIONS`, default 5)
    pub db_max_connections: u32,

    /// Shared secret the payment gateway sends in `X-Gateway-Secret`
    /// (`STOCKROOM_PAY_CALLBACK_SECRET`). Unset disables the callback route.
    pub pay_callback_secret: Option<String>,

    /// Shipping and numbering settings handed to the services.
    pub checkout: CheckoutConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = CheckoutConfig::default();

        let checkout = CheckoutConfig {
            free_shipping_threshold_cents: parse_or(
                &lookup,
                "STOCKROOM_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold_cents,
            )?,
            shipping_fee_cents: parse_or(&lookup, "STOCKROOM_SHIPPING_FEE", defaults.shipping_fee_cents)?,
            order_prefix: lookup("STOCKROOM_ORDER_PREFIX").unwrap_or(defaults.order_prefix),
            operation_prefix: lookup("STOCKROOM_OPERATION_PREFIX").unwrap_or(defaults.operation_prefix),
        };
        checkout
            .validate()
            .map_err(|e| ConfigError::InvalidCheckout(e.to_string()))?;

        let config = ApiConfig {
            bind_addr: parse_or(&lookup, "STOCKROOM_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            db_path: lookup("STOCKROOM_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("stockroom.db")),
            db_max_connections: parse_or(&lookup, "STOCKROOM_DB_MAX_CONNECTIONS", 5)?,
            pay_callback_secret: lookup("STOCKROOM_PAY_CALLBACK_SECRET")
                .map(|secret| secret.trim().to_string())
                .filter(|secret| !secret.is_empty()),
            checkout,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("STOCKROOM_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid checkout settings: {0}")]
    InvalidCheckout(String),
}
