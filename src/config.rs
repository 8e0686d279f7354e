// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{FleetError, FleetResult};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    JsonFile(PathBuf),
    Redis(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session_ttl: Duration,
    pub max_failed_attempts: u32,
    pub lockout: Duration,
    pub pin_hash_cost: u32,
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub summary: SummaryConfig,
    pub export_timeout: Duration,
    /// When false, completed missions are never sent to the script URL.
    pub export_enabled: bool,
    pub auth: AuthConfig,
    pub log_level: tracing::Level,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(12 * 60 * 60),
            max_failed_attempts: 5,
            lockout: Duration::from_secs(300),
            pin_hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageBackend::JsonFile(PathBuf::from("data.json")),
            summary: SummaryConfig {
                api_key: None,
                model: DEFAULT_GEMINI_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            },
            export_timeout: Duration::from_secs(10),
            export_enabled: true,
            auth: AuthConfig::default(),
            log_level: tracing::Level::INFO,
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> FleetResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> FleetResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("json") {
            "json" | "file" => StorageBackend::JsonFile(PathBuf::from(
                get("DATA_FILE").unwrap_or_else(|| "data.json".to_string()),
            )),
            "redis" => StorageBackend::Redis(get("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1/".to_string())),
            "memory" => StorageBackend::Memory,
            other => {
                return Err(FleetError::InvalidConfiguration(format!(
                    "STORAGE_BACKEND must be json, redis or memory (got {})",
                    other
                )));
            }
        };

        let pin_hash_cost = parse_or(&get, "PIN_HASH_COST", defaults.auth.pin_hash_cost)?;
        if !(4..=31).contains(&pin_hash_cost) {
            return Err(FleetError::InvalidConfiguration(
                "PIN_HASH_COST must be between 4 and 31".to_string(),
            ));
        }

        let export_enabled = match get("EXPORT_ENABLED").map(|v| v.to_ascii_lowercase()) {
            None => defaults.export_enabled,
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" => false,
            Some(v) => {
                return Err(FleetError::InvalidFieldValue {
                    field: "EXPORT_ENABLED".to_string(),
                    value: v,
                    reason: "must be true or false".to_string(),
                });
            }
        };

        let log_level = match get("LOG_LEVEL") {
            Some(level) => level.parse::<tracing::Level>().map_err(|_| {
                FleetError::InvalidConfiguration(format!("LOG_LEVEL is not a valid level: {}", level))
            })?,
            None => defaults.log_level,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            storage,
            summary: SummaryConfig {
                api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
                model: get("GEMINI_MODEL").unwrap_or(defaults.summary.model),
                base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.summary.base_url),
            },
            export_timeout: Duration::from_secs(parse_or(&get, "EXPORT_TIMEOUT_SECS", 10)?),
            export_enabled,
            auth: AuthConfig {
                session_ttl: Duration::from_secs(parse_or(&get, "ADMIN_SESSION_TTL_SECS", 12 * 60 * 60)?),
                max_failed_attempts: parse_or(&get, "PIN_MAX_ATTEMPTS", defaults.auth.max_failed_attempts)?,
                lockout: Duration::from_secs(parse_or(&get, "PIN_LOCKOUT_SECS", 300)?),
                pin_hash_cost,
            },
            log_level,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> FleetResult<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| FleetError::InvalidFieldValue {
            field: key.to_string(),
            value: raw,
            reason: "not a valid number".to_string(),
        }),
        None => Ok(default),
    }
}
