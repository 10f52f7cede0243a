use almanac_core::SchedulerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
pub const DEFAULT_MODEL: &str = "doubao-1.5-thinking-pro-250415";
const DB_FILE: &str = "almanac.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Production => "production",
        })
    }
}

/// Top-level `almanac.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmanacConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: String,
    pub environment: Environment,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:9191".into(),
            environment: Environment::Development,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Required by every command that generates content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Longest accepted sweep interval: one year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Unset means "on in production, off in development".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub category_delay_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub interval_hours: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: None,
            category_delay_secs: 3,
            shutdown_timeout_secs: 3,
            interval_hours: 24,
        }
    }
}

impl AlmanacConfig {
    /// Parse a config file. Fails if the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Like [`load`](Self::load), but a missing or unreadable file yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Apply `ALMANAC_*` (and `PORT`) overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.http_addr = format!("0.0.0.0:{}", port.trim());
        }
        if let Some(addr) = get("ALMANAC_HTTP_ADDR") {
            self.server.http_addr = addr;
        }
        if let Some(env) = get("ALMANAC_ENVIRONMENT") {
            match env.parse() {
                Ok(env) => self.server.environment = env,
                Err(e) => warn!("ALMANAC_ENVIRONMENT ignored: {}", e),
            }
        }
        if let Some(dir) = get("ALMANAC_DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = get("ALMANAC_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = get("ALMANAC_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = get("ALMANAC_MODEL") {
            self.provider.model = model;
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join(DB_FILE)
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        self.server
            .http_addr
            .parse()
            .with_context(|| format!("invalid http_addr '{}'", self.server.http_addr))
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }

    pub fn scheduler_enabled(&self) -> bool {
        self.scheduler
            .enabled
            .unwrap_or(self.server.environment == Environment::Production)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            category_delay: Duration::from_secs(self.scheduler.category_delay_secs),
            interval: Duration::from_secs(
                self.scheduler
                    .interval_hours
                    .min(MAX_INTERVAL_HOURS)
                    .saturating_mul(3600),
            ),
            shutdown_timeout: Duration::from_secs(self.scheduler.shutdown_timeout_secs),
        }
    }

    /// The API key, or an error naming how to provide one.
    pub fn require_api_key(&self) -> Result<&str> {
        self.provider
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no provider API key: set ALMANAC_API_KEY or api_key in [provider]"
                )
            })
    }

    /// Returns every problem with the configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "[server] http_addr '{}' is not a socket address",
                self.server.http_addr
            ));
        }
        if !(self.provider.base_url.starts_with("http://")
            || self.provider.base_url.starts_with("https://"))
        {
            errors.push(format!(
                "[provider] base_url '{}' must start with http:// or https://",
                self.provider.base_url
            ));
        }
        if self.provider.model.trim().is_empty() {
            errors.push("[provider] model must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            errors.push(format!(
                "[provider] temperature {} must be within [0, 2]",
                self.provider.temperature
            ));
        }
        if self.provider.max_tokens == 0 {
            errors.push("[provider] max_tokens must be positive".into());
        }
        if self.provider.timeout_secs == 0 {
            errors.push("[provider] timeout_secs must be positive".into());
        }
        if !(1..=MAX_INTERVAL_HOURS).contains(&self.scheduler.interval_hours) {
            errors.push(format!(
                "[scheduler] interval_hours {} must be within [1, {}]",
                self.scheduler.interval_hours, MAX_INTERVAL_HOURS
            ));
        }

        errors
    }
}

/// Log-safe rendering of an API key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "set".into();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AlmanacConfig::default();
        assert_eq!(config.server.http_addr, "0.0.0.0:9191");
        assert_eq!(config.provider.model, DEFAULT_MODEL);
        assert_eq!(config.provider.max_tokens, 1500);
        assert!(config.is_development());
        assert!(!config.scheduler_enabled());
        assert_eq!(config.db_path(), PathBuf::from("./data/almanac.redb"));
        assert!(config.validate().is_empty());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AlmanacConfig = toml::from_str(
            r#"
            [server]
            environment = "production"

            [provider]
            api_key = "sk-test"
            temperature = 1.2
            "#,
        )
        .unwrap();

        assert!(config.scheduler_enabled());
        assert_eq!(config.provider.temperature, 1.2);
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.scheduler.category_delay_secs, 3);
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_explicit_scheduler_flag_wins() {
        let mut config = AlmanacConfig::default();
        config.scheduler.enabled = Some(true);
        assert!(config.scheduler_enabled());
        assert_eq!(config.scheduler_config().interval, Duration::from_secs(86_400));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("ALMANAC_ENVIRONMENT", "Production"),
            ("ALMANAC_API_KEY", "abcdefghijkl"),
            ("ALMANAC_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AlmanacConfig::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.server.environment, Environment::Production);
        assert_eq!(config.provider.api_key.as_deref(), Some("abcdefghijkl"));
        // Blank values are ignored
        assert_eq!(config.provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_http_addr_env_beats_port() {
        let mut config = AlmanacConfig::default();
        config.apply_env_from(|k| match k {
            "PORT" => Some("8080".into()),
            "ALMANAC_HTTP_ADDR" => Some("127.0.0.1:7000".into()),
            _ => None,
        });
        assert_eq!(config.http_addr().unwrap().port(), 7000);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = AlmanacConfig::default();
        config.server.http_addr = "nowhere".into();
        config.provider.temperature = 3.0;
        config.provider.base_url = "ftp://x".into();
        config.provider.max_tokens = 0;
        assert_eq!(config.validate().len(), 4);
    }

    #[test]
    fn test_interval_hours_is_bounded() {
        let mut config = AlmanacConfig::default();
        config.scheduler.interval_hours = 0;
        assert_eq!(config.validate().len(), 1);

        config.scheduler.interval_hours = MAX_INTERVAL_HOURS;
        assert!(config.validate().is_empty());

        config.scheduler.interval_hours = u64::MAX;
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("interval_hours"));
        // Never overflows, even unvalidated
        assert_eq!(
            config.scheduler_config().interval,
            Duration::from_secs(MAX_INTERVAL_HOURS * 3600)
        );
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("abcd1234wxyz"), "abcd****wxyz");
        assert_eq!(mask_api_key("short"), "set");
        assert_eq!(mask_api_key("12345678"), "set");
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlmanacConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.server.http_addr, "0.0.0.0:9191");
        assert!(AlmanacConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
