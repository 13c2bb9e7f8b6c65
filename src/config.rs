use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_PREDICTION_ENDPOINT: &str = "http://localhost:5001/invocations";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://prediction_logs.sqlite";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse json config failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse toml config failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[cfg(feature = "config-yaml")]
    #[error("parse yaml config failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format: {path}")]
    UnsupportedFormat { path: String },
    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseTarget {
    Sqlite(PathBuf),
    Postgres(String),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: String,
    pub prediction_endpoint: String,
    pub database_url: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            prediction_endpoint: DEFAULT_PREDICTION_ENDPOINT.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen", &self.listen)
            .field("prediction_endpoint", &self.prediction_endpoint)
            .field("database_url", &redact_database_url(&self.database_url))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ServiceConfig {
    /// Loads a config file; the format follows the extension
    /// (`.json`, `.toml`, and `.yaml`/`.yml` with the `config-yaml` feature).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Ok(serde_json::from_str(&raw)?),
            "toml" => Ok(toml::from_str(&raw)?),
            #[cfg(feature = "config-yaml")]
            "yaml" | "yml" => Ok(serde_yaml::from_str(&raw)?),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// Applies environment overrides. `lookup` is usually `std::env::var(..).ok()`.
    ///
    /// `DATABASE_URL` wins over the `POSTGRES_*` set; the latter only applies
    /// when `POSTGRES_HOST` is present.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(endpoint) = non_empty(lookup("MODEL_PREDICTION_ENDPOINT")) {
            self.prediction_endpoint = endpoint;
        }
        if let Some(raw) = non_empty(lookup("PREDICTION_TIMEOUT_SECS")) {
            self.timeout_secs = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PREDICTION_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
        }

        if let Some(url) = non_empty(lookup("DATABASE_URL")) {
            self.database_url = url;
        } else if let Some(host) = non_empty(lookup("POSTGRES_HOST")) {
            let user = non_empty(lookup("POSTGRES_USERNAME")).unwrap_or_else(|| "admin".into());
            let password =
                non_empty(lookup("POSTGRES_PASSWORD")).unwrap_or_else(|| "password".into());
            let db = non_empty(lookup("POSTGRES_DB")).unwrap_or_else(|| "bridgeai".into());
            let port = non_empty(lookup("POSTGRES_PORT")).unwrap_or_else(|| "5432".into());
            self.database_url = format!("postgresql://{user}:{password}@{host}:{port}/{db}");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn database(&self) -> Result<DatabaseTarget, ConfigError> {
        parse_database_url(&self.database_url)
    }
}

pub fn parse_database_url(url: &str) -> Result<DatabaseTarget, ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConfigError::InvalidDatabaseUrl("empty".to_string()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Ok(DatabaseTarget::Postgres(url.to_string()));
    }
    if let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    {
        if path.is_empty() {
            return Err(ConfigError::InvalidDatabaseUrl(url.to_string()));
        }
        return Ok(DatabaseTarget::Sqlite(PathBuf::from(path)));
    }
    if url.contains("://") {
        return Err(ConfigError::InvalidDatabaseUrl(redact_database_url(url)));
    }
    Ok(DatabaseTarget::Sqlite(PathBuf::from(url)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn redact_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://<redacted>@{host}"),
        None => url.to_string(),
    }
}
