use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub store: StoreConfig,
    pub carrier: CarrierConfig,
    pub finance: FinanceConfig,
    pub retention: RetentionConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Mongo,
}

/// EMPOST carrier API settings. With `enabled` false (or an empty base
/// URL) all sync calls become logged no-ops.
#[derive(Debug, Clone, Deserialize)]
pub struct CarrierConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Upper bound on any single carrier call; a timeout counts as a
    /// recoverable sync failure, never a transition failure.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinanceConfig {
    /// Currency stamped on invoices, collections and carrier charges.
    pub currency: String,
    /// Base URL the delivery payment QR codes point at.
    pub payment_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Seconds between sweeper passes.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached list response stays valid.
    pub ttl_secs: u64,
}

impl ShipmentConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(ShipmentConfig {
            common,
            store: StoreConfig {
                backend: get_env("STORE_BACKEND", Some("mongo"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                mongodb_uri: env::var("MONGODB_URI").ok(),
                mongodb_database: get_env("MONGODB_DATABASE", Some("shipment_db"), is_prod)?,
            },
            carrier: CarrierConfig {
                enabled: get_parsed_env("EMPOST_ENABLED", Some("false"), is_prod)?,
                base_url: get_env("EMPOST_BASE_URL", Some(""), is_prod)?,
                api_key: Secret::new(get_env("EMPOST_API_KEY", Some(""), is_prod)?),
                timeout_secs: get_parsed_env("EMPOST_TIMEOUT_SECS", Some("5"), is_prod)?,
            },
            finance: FinanceConfig {
                currency: get_env("FINANCE_CURRENCY", Some("AED"), is_prod)?,
                payment_base_url: get_env("PAYMENT_BASE_URL", Some(""), is_prod)?,
            },
            retention: RetentionConfig {
                interval_secs: get_parsed_env("RETENTION_INTERVAL_SECS", Some("21600"), is_prod)?,
            },
            cache: CacheConfig {
                ttl_secs: get_parsed_env("CACHE_TTL_SECS", Some("30"), is_prod)?,
            },
        })
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_parsed_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(format!("Invalid value for {}: {}", key, e)))
    })
}
