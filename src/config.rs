//! Runtime configuration, read from the environment (and `.env` files via dotenvy).

use crate::db::SchemaPolicy;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EXTRACT_URL: &str = "https://plankton-app-qajlk.ondigitalocean.app/extraction_api";
pub const DEFAULT_MATCH_URL: &str = "https://endeavor-interview-api-gzwki.ondigitalocean.app/match/batch";
pub const DEFAULT_MATCH_LIMIT: usize = 5;
pub const DATABASE_FILE_NAME: &str = "orders.db";

const ENV_EXTRACT_URL: &str = "ORDER_ENTRY_EXTRACT_URL";
const ENV_MATCH_URL: &str = "ORDER_ENTRY_MATCH_URL";
const ENV_MATCH_LIMIT: &str = "ORDER_ENTRY_MATCH_LIMIT";
const ENV_DB_PATH: &str = "ORDER_ENTRY_DB_PATH";
const ENV_HTTP_TIMEOUT: &str = "ORDER_ENTRY_HTTP_TIMEOUT_SECS";
const ENV_SCHEMA_POLICY: &str = "ORDER_ENTRY_SCHEMA_POLICY";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub extract_url: String,
    pub match_url: String,
    /// Candidates requested per description.
    pub match_limit: usize,
    pub database_path: PathBuf,
    /// None leaves reqwest's default in place.
    #[serde(skip)]
    pub http_timeout: Option<Duration>,
    pub schema_policy: SchemaPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            extract_url: DEFAULT_EXTRACT_URL.to_string(),
            match_url: DEFAULT_MATCH_URL.to_string(),
            match_limit: DEFAULT_MATCH_LIMIT,
            database_path: PathBuf::from(DATABASE_FILE_NAME),
            http_timeout: None,
            schema_policy: SchemaPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Read the process environment. `data_dir` is where the database lives when
    /// `ORDER_ENTRY_DB_PATH` is not set.
    pub fn from_env(data_dir: Option<PathBuf>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(data_dir: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = AppConfig::default();

        if let Some(url) = get(ENV_EXTRACT_URL) {
            config.extract_url = url;
        }
        if let Some(url) = get(ENV_MATCH_URL) {
            config.match_url = url;
        }
        if let Some(raw) = get(ENV_MATCH_LIMIT) {
            config.match_limit = raw.parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("{} must be a positive integer, got '{}'", ENV_MATCH_LIMIT, raw))
            })?;
        }
        config.database_path = match get(ENV_DB_PATH) {
            Some(path) => PathBuf::from(path),
            None => data_dir
                .map(|dir| dir.join(DATABASE_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME)),
        };
        if let Some(raw) = get(ENV_HTTP_TIMEOUT) {
            let secs: u64 = raw.parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("{} must be a whole number of seconds, got '{}'", ENV_HTTP_TIMEOUT, raw))
            })?;
            if secs == 0 {
                return Err(PipelineError::InvalidConfig(format!("{} must be at least 1", ENV_HTTP_TIMEOUT)));
            }
            config.http_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = get(ENV_SCHEMA_POLICY) {
            config.schema_policy = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("extraction", &self.extract_url), ("matching", &self.match_url)] {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| PipelineError::InvalidConfig(format!("{} URL '{}': {}", name, url, e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} URL '{}' must use http or https",
                    name, url
                )));
            }
        }
        if self.match_limit == 0 {
            return Err(PipelineError::InvalidConfig("match limit must be at least 1".to_string()));
        }
        Ok(())
    }
}
