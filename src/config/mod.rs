//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, CreateArgs, DeleteArgs, GlobalOverrides, ListArgs, SetArgs, SettingsArgs,
    SettingsCommand, UsersArgs, UsersCommand,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "roster";
const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_GC_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_RETRY: u32 = 1;
const DEFAULT_RETRY_DELAY_MS: u64 = 250;
const MAX_RETRY: u32 = 10;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 500;
const DEFAULT_READ_LATENCY_MS: u64 = 600;
const DEFAULT_WRITE_LATENCY_MS: u64 = 800;
const DEFAULT_TOAST_TTL_MS: u64 = 4000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub users: UsersSettings,
    pub backend: BackendSettings,
    pub preferences: PreferencesSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    /// `0` keeps unobserved entries for the whole session.
    pub gc_time_ms: u64,
    /// Cadence of the background garbage collection sweep.
    pub gc_interval: Duration,
    pub retry: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersSettings {
    pub search_debounce: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub read_latency: Duration,
    pub write_latency: Duration,
    /// Start from the demo directory instead of an empty one.
    pub seed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencesSettings {
    /// JSON file holding the preferences blob. `None` keeps preferences in memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub toast_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ROSTER").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    users: RawUsersSettings,
    backend: RawBackendSettings,
    preferences: RawPreferencesSettings,
    notifications: RawNotificationSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(latency) = overrides.backend_read_latency_ms {
            self.backend.read_latency_ms = Some(latency);
        }
        if let Some(latency) = overrides.backend_write_latency_ms {
            self.backend.write_latency_ms = Some(latency);
        }
        if let Some(path) = overrides.preferences_path.as_ref() {
            self.preferences.path = Some(path.clone());
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    stale_time_ms: Option<u64>,
    gc_time_ms: Option<u64>,
    gc_interval_ms: Option<u64>,
    retry: Option<u32>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUsersSettings {
    search_debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    read_latency_ms: Option<u64>,
    write_latency_ms: Option<u64>,
    seed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreferencesSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    toast_ttl_ms: Option<u64>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            users,
            backend,
            preferences,
            notifications,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            users: build_users_settings(users)?,
            backend: build_backend_settings(backend),
            preferences: build_preferences_settings(preferences),
            notifications: build_notification_settings(notifications)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let retry = cache.retry.unwrap_or(DEFAULT_RETRY);
    if retry > MAX_RETRY {
        return Err(LoadError::invalid(
            "cache.retry",
            format!("must be at most {MAX_RETRY}"),
        ));
    }

    let gc_interval_ms = cache.gc_interval_ms.unwrap_or(DEFAULT_GC_INTERVAL_MS);
    let gc_interval = positive_millis(gc_interval_ms, "cache.gc_interval_ms")?;

    Ok(CacheSettings {
        stale_time_ms: cache.stale_time_ms.unwrap_or(DEFAULT_STALE_TIME_MS),
        gc_time_ms: cache.gc_time_ms.unwrap_or(DEFAULT_GC_TIME_MS),
        gc_interval,
        retry,
        retry_delay_ms: cache.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
    })
}

fn build_users_settings(users: RawUsersSettings) -> Result<UsersSettings, LoadError> {
    let debounce_ms = users
        .search_debounce_ms
        .unwrap_or(DEFAULT_SEARCH_DEBOUNCE_MS);
    Ok(UsersSettings {
        search_debounce: positive_millis(debounce_ms, "users.search_debounce_ms")?,
    })
}

fn build_backend_settings(backend: RawBackendSettings) -> BackendSettings {
    BackendSettings {
        read_latency: Duration::from_millis(
            backend.read_latency_ms.unwrap_or(DEFAULT_READ_LATENCY_MS),
        ),
        write_latency: Duration::from_millis(
            backend.write_latency_ms.unwrap_or(DEFAULT_WRITE_LATENCY_MS),
        ),
        seed: backend.seed.unwrap_or(true),
    }
}

fn build_preferences_settings(preferences: RawPreferencesSettings) -> PreferencesSettings {
    let path = preferences
        .path
        .filter(|path| !path.as_os_str().is_empty());
    PreferencesSettings { path }
}

fn build_notification_settings(
    notifications: RawNotificationSettings,
) -> Result<NotificationSettings, LoadError> {
    let ttl_ms = notifications.toast_ttl_ms.unwrap_or(DEFAULT_TOAST_TTL_MS);
    Ok(NotificationSettings {
        toast_ttl: positive_millis(ttl_ms, "notifications.toast_ttl_ms")?,
    })
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

#[cfg(test)]
mod tests;
