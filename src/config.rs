//! Configuration for Telegram API credentials and the sending policy
//!
//! Loads configuration from config.yml; environment variables (and `.env`)
//! take precedence over values from the file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::RetryPolicy;
use crate::error::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";
pub const SESSION_NAME: &str = "telegram_session";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_PACING_MS: u64 = 500;
pub const DEFAULT_REMOTE_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_TRANSPORT_BACKOFF_SECS: u64 = 3;
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Load `.env` into the process environment (searched upwards from the
/// working directory). Called once at startup, before CLI parsing.
pub fn load_env_file() -> Option<PathBuf> {
    load_first_env_file(&[Path::new(".env")])
}

fn load_first_env_file(candidates: &[&Path]) -> Option<PathBuf> {
    candidates
        .iter()
        .find_map(|candidate| dotenvy::from_filename(candidate).ok())
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    sending: Option<SendingYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    api_id: Option<String>,
    api_hash: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    phone: Option<String>,
    session_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SendingYaml {
    max_retries: Option<u32>,
    pacing_ms: Option<u64>,
    remote_backoff_secs: Option<u64>,
    transport_backoff_secs: Option<u64>,
    progress_every: Option<usize>,
    max_rate_limit_wait_secs: Option<u64>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Tunables of the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendingConfig {
    pub max_retries: u32,
    pub pacing_ms: u64,
    pub remote_backoff_secs: u64,
    pub transport_backoff_secs: u64,
    pub progress_every: usize,
    /// Cap on the cumulative rate-limit wait for one message; `None` waits forever.
    pub max_rate_limit_wait_secs: Option<u64>,
}

impl Default for SendingConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            pacing_ms: DEFAULT_PACING_MS,
            remote_backoff_secs: DEFAULT_REMOTE_BACKOFF_SECS,
            transport_backoff_secs: DEFAULT_TRANSPORT_BACKOFF_SECS,
            progress_every: DEFAULT_PROGRESS_EVERY,
            max_rate_limit_wait_secs: None,
        }
    }
}

impl SendingConfig {
    fn from_yaml(yaml: SendingYaml) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: yaml.max_retries.unwrap_or(defaults.max_retries).max(1),
            pacing_ms: yaml.pacing_ms.unwrap_or(defaults.pacing_ms),
            remote_backoff_secs: yaml
                .remote_backoff_secs
                .unwrap_or(defaults.remote_backoff_secs),
            transport_backoff_secs: yaml
                .transport_backoff_secs
                .unwrap_or(defaults.transport_backoff_secs),
            progress_every: yaml.progress_every.unwrap_or(defaults.progress_every).max(1),
            max_rate_limit_wait_secs: yaml.max_rate_limit_wait_secs,
        }
    }

    /// Build the retry policy consumed by the dispatch loop.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            remote_backoff: Duration::from_secs(self.remote_backoff_secs),
            transport_backoff: Duration::from_secs(self.transport_backoff_secs),
            pacing: Duration::from_millis(self.pacing_ms),
            progress_every: self.progress_every,
            max_rate_limit_wait: self.max_rate_limit_wait_secs.map(Duration::from_secs),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,
    pub sending: SendingConfig,
}

impl Config {
    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return env_val;
                }
                // Unresolved placeholder is as good as missing
                return std::env::var(env_key).unwrap_or_default();
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return env_val;
        }
        value.unwrap_or_default()
    }

    /// Resolve an integer value from string config or env var
    fn resolve_env_i32(value: Option<String>, env_key: &str) -> i32 {
        Self::resolve_env_string(value, env_key)
            .trim()
            .parse::<i32>()
            .unwrap_or(0)
    }

    /// Load configuration from `path`, falling back to defaults plus
    /// environment when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Self::parse_yaml(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using environment");
            YamlConfig::default()
        };

        Ok(Self::from_yaml(yaml))
    }

    /// Parse configuration from a YAML string (environment still applies).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(Self::from_yaml(Self::parse_yaml(content)?))
    }

    fn parse_yaml(content: &str) -> Result<YamlConfig> {
        if content.trim().is_empty() {
            return Ok(YamlConfig::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let telegram = yaml.telegram.unwrap_or_default();
        let sending = SendingConfig::from_yaml(yaml.sending.unwrap_or_default());

        let api_id = Self::resolve_env_i32(telegram.api_id, "TELEGRAM_API_ID");
        let api_hash = Self::resolve_env_string(telegram.api_hash, "TELEGRAM_API_HASH");
        let phone = Self::resolve_env_string(telegram.phone, "TELEGRAM_PHONE");

        let session_file = match std::env::var("TELEGRAM_SESSION") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => session_path(
                telegram
                    .session_name
                    .as_deref()
                    .unwrap_or(SESSION_NAME),
            ),
        };

        Self {
            phone,
            api_id,
            api_hash,
            session_file,
            sending,
        }
    }

    /// Lock file guarding the session against parallel use.
    pub fn lock_file(&self) -> PathBuf {
        self.session_file.with_extension("lock")
    }

    /// Ensure the credentials needed to build a client are present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.api_id == 0 {
            missing.push("api_id (TELEGRAM_API_ID)");
        }
        if self.api_hash.trim().is_empty() {
            missing.push("api_hash (TELEGRAM_API_HASH)");
        }
        if self.phone.trim().is_empty() {
            missing.push("phone (TELEGRAM_PHONE)");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing {}", missing.join(", "))))
        }
    }
}

/// `name` -> `name.session`, paths that already carry an extension are kept.
fn session_path(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.extension().is_some() {
        path
    } else {
        PathBuf::from(format!("{}.session", name))
    }
}
