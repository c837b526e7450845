use crate::constants::{
    CAPTURE_YEAR, DEFAULT_DATABASE_PATH, DEFAULT_DELAY_MS, DEFAULT_DETAIL_RETRIES,
    DEFAULT_DETAIL_TIMEOUT_SECS, DEFAULT_LISTING_URL, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_USER_AGENT,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub listing_url: String,
    pub user_agent: String,
    pub delay_ms: u64,
    pub detail_timeout_seconds: u64,
    pub detail_retries: u32,
    pub retry_backoff_ms: u64,
    pub capture_year: i32,
    pub atomic_school_inserts: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            delay_ms: DEFAULT_DELAY_MS,
            detail_timeout_seconds: DEFAULT_DETAIL_TIMEOUT_SECS,
            detail_retries: DEFAULT_DETAIL_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            capture_year: CAPTURE_YEAR,
            atomic_school_inserts: false,
        }
    }
}

impl ScraperConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listener, e.g. `127.0.0.1:9898`. Unset means no exporter.
    pub listen_addr: Option<String>,
}

impl Config {
    /// Loads configuration from `path`, or from `config.toml` when present.
    ///
    /// An explicitly named file must exist; the default file is optional. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    ScraperError::Config(format!(
                        "Failed to read config file '{}': {}",
                        p.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                let content = fs::read_to_string(DEFAULT_CONFIG_PATH)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Applies `VOCATIONAL_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VOCATIONAL_LISTING_URL") {
            self.scraper.listing_url = url;
        }
        if let Some(path) = lookup("VOCATIONAL_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("VOCATIONAL_METRICS_ADDR") {
            self.metrics.listen_addr = Some(addr);
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.scraper.listing_url).map_err(|e| {
            ScraperError::Config(format!(
                "listing_url '{}' is not a valid URL: {}",
                self.scraper.listing_url, e
            ))
        })?;
        if self.scraper.detail_timeout_seconds == 0 {
            return Err(ScraperError::Config(
                "detail_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
