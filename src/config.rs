//! Application configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::generator::GeneratorConfig;
use crate::llm::{LlmConfig, ProviderKind};

/// Default interval between sync batches, in seconds.
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Interval between scheduled pipeline batches.
    pub check_interval: Duration,
    /// Process-wide toggle: auto-moderated replies are only submitted
    /// when this is on.
    pub auto_send: bool,
    /// Directory for the rolling log file; stdout-only when absent.
    pub log_dir: Option<PathBuf>,
    pub llm: LlmConfig,
    pub generator: GeneratorConfig,
}

impl AppConfig {
    /// Load configuration from `REVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind: ProviderKind =
            env_or("REVIEW_LLM_PROVIDER", ProviderKind::GigaChat.as_str()).parse()?;
        let api_key = std::env::var("REVIEW_LLM_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        Ok(Self {
            db_path: PathBuf::from(env_or("REVIEW_DB_PATH", "./data/review-responder.db")),
            check_interval: Duration::from_secs(env_parse(
                "REVIEW_CHECK_INTERVAL_SECS",
                DEFAULT_CHECK_INTERVAL_SECS,
            )?),
            auto_send: env_flag("REVIEW_AUTO_SEND"),
            log_dir: std::env::var("REVIEW_LOG_DIR").ok().map(PathBuf::from),
            llm: LlmConfig {
                kind,
                api_key,
                model: std::env::var("REVIEW_LLM_MODEL").ok().filter(|m| !m.is_empty()),
                base_url: std::env::var("REVIEW_LLM_BASE_URL").ok().filter(|u| !u.is_empty()),
            },
            generator: GeneratorConfig {
                temperature: env_parse("REVIEW_LLM_TEMPERATURE", 0.7)?,
                max_tokens: env_parse("REVIEW_LLM_MAX_TOKENS", 200)?,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
