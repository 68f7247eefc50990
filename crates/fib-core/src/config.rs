//! Service configuration.
//!
//! Layers, lowest precedence first: built-in defaults (the local compose
//! topology), an optional TOML file, then environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// TLS negotiation mode for the index store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl FromStr for TlsMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" | "allow" => Ok(Self::Prefer),
            "require" | "verify-ca" | "verify-full" => Ok(Self::Require),
            _ => Err(()),
        }
    }
}

/// Connection settings for the durable index store (PostgreSQL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: TlsMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "fib".to_string(),
            tls: TlsMode::Prefer,
        }
    }
}

/// Connection settings for Redis, which backs both the notification
/// channel and the result cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
        }
    }
}

impl ChannelConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Privileged credentials used to repair the service role when the store
/// rejects its login. Off unless explicitly enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub enabled: bool,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub retry: RetryPolicy,
    pub bootstrap: BootstrapConfig,
}

// ── File layer ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    store: FileStore,
    channel: FileChannel,
    retry: FileRetry,
    bootstrap: FileBootstrap,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileStore {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    tls: Option<TlsMode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileChannel {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileBootstrap {
    enabled: Option<bool>,
    admin_user: Option<String>,
    admin_password: Option<String>,
}

impl ServiceConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_toml(&std::fs::read_to_string(path)?)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a TOML document. Absent keys keep their current value.
    pub fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(content)?;

        let s = file.store;
        set(&mut self.store.host, s.host);
        set(&mut self.store.port, s.port);
        set(&mut self.store.user, s.user);
        set(&mut self.store.password, s.password);
        set(&mut self.store.database, s.database);
        set(&mut self.store.tls, s.tls);

        set(&mut self.channel.host, file.channel.host);
        set(&mut self.channel.port, file.channel.port);

        set(&mut self.retry.max_attempts, file.retry.max_attempts);
        set(
            &mut self.retry.base_delay,
            file.retry.base_delay_ms.map(Duration::from_millis),
        );

        let b = file.bootstrap;
        set(&mut self.bootstrap.enabled, b.enabled);
        if b.admin_user.is_some() {
            self.bootstrap.admin_user = b.admin_user;
        }
        if b.admin_password.is_some() {
            self.bootstrap.admin_password = b.admin_password;
        }
        Ok(())
    }

    /// Overlay values from environment-style variables via `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PGHOST") {
            self.store.host = v;
        }
        if let Some(v) = lookup("PGPORT") {
            self.store.port = parse("PGPORT", v)?;
        }
        if let Some(v) = lookup("PGUSER") {
            self.store.user = v;
        }
        if let Some(v) = lookup("PGPASSWORD") {
            self.store.password = v;
        }
        if let Some(v) = lookup("PGDATABASE") {
            self.store.database = v;
        }
        if let Some(v) = lookup("PGSSLMODE") {
            self.store.tls = parse("PGSSLMODE", v)?;
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.channel.host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.channel.port = parse("REDIS_PORT", v)?;
        }
        if let Some(v) = lookup("FIB_CONNECT_ATTEMPTS") {
            self.retry.max_attempts = parse("FIB_CONNECT_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("FIB_CONNECT_BASE_DELAY_MS") {
            self.retry.base_delay = Duration::from_millis(parse("FIB_CONNECT_BASE_DELAY_MS", v)?);
        }
        if let Some(v) = lookup("FIB_BOOTSTRAP_ENABLED") {
            self.bootstrap.enabled = parse_bool("FIB_BOOTSTRAP_ENABLED", v)?;
        }
        if let Some(v) = lookup("PG_BOOTSTRAP_USER") {
            self.bootstrap.admin_user = Some(v);
        }
        if let Some(v) = lookup("PG_BOOTSTRAP_PASSWORD") {
            self.bootstrap.admin_password = Some(v);
        }
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
