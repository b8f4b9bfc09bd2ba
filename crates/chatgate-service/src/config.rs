//! Service configuration.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chatgate_core::{UserId, DEFAULT_DAILY_CAP};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a warm, attentive conversation partner. Answer briefly and kindly.";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:10000").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "./data/chatgate").
    pub data_dir: String,

    /// Messaging platform bot token. The bot loop is disabled without it.
    pub telegram_token: Option<String>,

    /// Chat-completion API base URL.
    pub llm_api_url: String,

    /// Chat-completion API key. Content messages get a fallback reply without it.
    pub llm_api_key: Option<String>,

    /// Chat-completion model name.
    pub llm_model: String,

    /// System prompt sent with every completion request.
    pub llm_system_prompt: String,

    /// Payment processor shop id.
    pub yookassa_shop_id: Option<String>,

    /// Payment processor secret key.
    pub yookassa_secret_key: Option<String>,

    /// Where the processor sends the user after paying.
    pub yookassa_return_url: Option<String>,

    /// ISO currency code for payments.
    pub payment_currency: String,

    /// Shared secret for relayed webhook signatures (optional).
    pub webhook_secret: Option<String>,

    /// User ids allowed to run admin operations.
    pub admin_ids: HashSet<UserId>,

    /// API key for the admin HTTP surface.
    pub admin_api_key: Option<String>,

    /// Daily cap on real messages for free and trial accounts.
    pub daily_free_cap: u32,

    /// Timeout for payment processor calls in seconds.
    pub processor_timeout_seconds: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Long-poll timeout for update retrieval in seconds.
    pub long_poll_timeout_seconds: u64,

    /// Interval between sweeps over open payments in seconds; 0 disables the sweep.
    pub pending_sweep_interval_seconds: u64,

    /// Restarts allowed for a supervised task before giving up.
    pub max_restarts: u32,

    /// Pause before restarting a supervised task in seconds.
    pub restart_backoff_seconds: u64,
}

/// Payment processor secrets file structure.
#[derive(Debug, Deserialize)]
struct YooKassaSecrets {
    shop_id: String,
    secret_key: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (yookassa_shop_id, yookassa_secret_key) = load_yookassa_secrets();

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            telegram_token: env_opt("TELEGRAM_TOKEN"),
            llm_api_url: env_or("LLM_API_URL", defaults.llm_api_url),
            llm_api_key: env_opt("LLM_API_KEY"),
            llm_model: env_or("LLM_MODEL", defaults.llm_model),
            llm_system_prompt: env_or("LLM_SYSTEM_PROMPT", defaults.llm_system_prompt),
            yookassa_shop_id,
            yookassa_secret_key,
            yookassa_return_url: env_opt("YOOKASSA_RETURN_URL"),
            payment_currency: env_or("PAYMENT_CURRENCY", defaults.payment_currency),
            webhook_secret: env_opt("WEBHOOK_SECRET"),
            admin_ids: env_opt("ADMIN_IDS")
                .map(|raw| parse_admin_ids(&raw))
                .unwrap_or_default(),
            admin_api_key: env_opt("ADMIN_API_KEY"),
            daily_free_cap: env_parse("DAILY_FREE_CAP", defaults.daily_free_cap),
            processor_timeout_seconds: env_parse(
                "PROCESSOR_TIMEOUT_SECONDS",
                defaults.processor_timeout_seconds,
            ),
            cors_origins: env_or("CORS_ORIGINS", "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            long_poll_timeout_seconds: env_parse(
                "LONG_POLL_TIMEOUT_SECONDS",
                defaults.long_poll_timeout_seconds,
            ),
            pending_sweep_interval_seconds: env_parse(
                "PENDING_SWEEP_INTERVAL_SECONDS",
                defaults.pending_sweep_interval_seconds,
            ),
            max_restarts: env_parse("MAX_RESTARTS", defaults.max_restarts),
            restart_backoff_seconds: env_parse(
                "RESTART_BACKOFF_SECONDS",
                defaults.restart_backoff_seconds,
            ),
        }
    }

    /// Whether live payments can be created.
    #[must_use]
    pub fn processor_configured(&self) -> bool {
        self.yookassa_shop_id.is_some() && self.yookassa_secret_key.is_some()
    }

    /// Timeout for payment processor calls.
    #[must_use]
    pub const fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_seconds)
    }

    /// Interval of the open-payment sweep, `None` when disabled.
    #[must_use]
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.pending_sweep_interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.pending_sweep_interval_seconds))
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: String) -> String {
    env_opt(key).unwrap_or(default)
}

/// Parse a numeric variable, keeping the default on malformed input.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env_opt(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(
                key = %key,
                value = %raw,
                default = %default,
                "Malformed value, using default"
            );
            default
        }),
    }
}

/// Parse a comma-separated list of user ids, skipping malformed entries.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> HashSet<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<UserId>() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(entry = %s, error = %e, "Skipping malformed admin id");
                None
            }
        })
        .collect()
}

/// Load payment processor secrets from file or environment.
fn load_yookassa_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/yookassa.json", "../.secrets/yookassa.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<YooKassaSecrets>(path) {
            tracing::info!(path = %path, "Loaded YooKassa secrets from file");
            return (Some(secrets.shop_id), Some(secrets.secret_key));
        }
    }

    tracing::debug!("YooKassa secrets file not found, using environment variables");
    (env_opt("YOOKASSA_SHOP_ID"), env_opt("YOOKASSA_SECRET_KEY"))
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:10000".into(),
            data_dir: "./data/chatgate".into(),
            telegram_token: None,
            llm_api_url: "https://api.deepseek.com".into(),
            llm_api_key: None,
            llm_model: "deepseek-chat".into(),
            llm_system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            yookassa_return_url: None,
            payment_currency: "RUB".into(),
            webhook_secret: None,
            admin_ids: HashSet::new(),
            admin_api_key: None,
            daily_free_cap: DEFAULT_DAILY_CAP,
            processor_timeout_seconds: 10,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            long_poll_timeout_seconds: 25,
            pending_sweep_interval_seconds: 300,
            max_restarts: 5,
            restart_backoff_seconds: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_ids_skip_malformed_entries() {
        let ids = parse_admin_ids("309524694, alice,,42");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&UserId::new(309_524_694)));
        assert!(ids.contains(&UserId::new(42)));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.daily_free_cap, 5);
        assert_eq!(config.payment_currency, "RUB");
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(300)));
        assert!(!config.processor_configured());
    }

    #[test]
    fn zero_interval_disables_sweep() {
        let config = ServiceConfig {
            pending_sweep_interval_seconds: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.sweep_interval(), None);
    }
}
