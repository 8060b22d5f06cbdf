use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub push: PushConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Push provider batch endpoint
    pub endpoint: String,
    /// Push provider receipt endpoint (best-effort delivery confirmation)
    pub receipt_endpoint: String,
    /// Tokens per provider request (provider caps this at 100)
    pub batch_size: usize,
    /// Delay before the receipt check; 0 disables it
    pub receipt_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Suggestion ("saran") notifications allowed per actor per window
    pub suggestion_limit: u32,
    pub suggestion_window_secs: u64,
    /// TTL for deduplication keys in seconds (default: 120)
    pub dedup_ttl_secs: u64,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &str, default: &str) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var_or(key, default)
        .parse()
        .map_err(|e| AppError::Config(format!("{key}: {e}")))
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Ok(Config {
            app: AppConfig {
                env: var_or("APP_ENV", "development"),
                port: parse_var("APP_PORT", "8000")?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| AppError::Config("DATABASE_URL is not set".to_string()))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            push: PushConfig {
                endpoint: var_or("PUSH_ENDPOINT", "https://exp.host/--/api/v2/push/send"),
                receipt_endpoint: var_or(
                    "PUSH_RECEIPT_ENDPOINT",
                    "https://exp.host/--/api/v2/push/getReceipts",
                ),
                batch_size: parse_var("PUSH_BATCH_SIZE", "100")?,
                receipt_delay_secs: parse_var("PUSH_RECEIPT_DELAY_SECS", "900")?,
            },
            limits: LimitsConfig {
                suggestion_limit: parse_var("SUGGESTION_RATE_LIMIT", "1")?,
                suggestion_window_secs: parse_var("SUGGESTION_RATE_WINDOW_SECS", "5")?,
                dedup_ttl_secs: parse_var("DEDUP_TTL_SECS", "120")?,
            },
        })
    }
}
