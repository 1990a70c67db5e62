//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::query::QueryConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "callboard";
const ENV_PREFIX: &str = "CALLBOARD";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub query: QueryConfig,
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

/// Load settings using the configured precedence (files → `CALLBOARD__*` environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    query: RawQuerySettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuerySettings {
    stale_time_ms: Option<u64>,
    gc_time_ms: Option<u64>,
    retry: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    mutation_retry: Option<u32>,
    request_timeout_ms: Option<u64>,
    refetch_on_window_focus: Option<bool>,
    refetch_on_reconnect: Option<bool>,
    gc_interval_ms: Option<u64>,
    max_entries: Option<usize>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, query } = raw;

        let logging = build_logging_settings(logging)?;
        let query = build_query_settings(query)?;

        Ok(Self { logging, query })
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

fn build_query_settings(query: RawQuerySettings) -> Result<QueryConfig, LoadError> {
    let defaults = QueryConfig::default();
    let config = QueryConfig {
        stale_time_ms: query.stale_time_ms.unwrap_or(defaults.stale_time_ms),
        gc_time_ms: query.gc_time_ms.unwrap_or(defaults.gc_time_ms),
        retry: query.retry.unwrap_or(defaults.retry),
        retry_base_delay_ms: query
            .retry_base_delay_ms
            .unwrap_or(defaults.retry_base_delay_ms),
        retry_max_delay_ms: query
            .retry_max_delay_ms
            .unwrap_or(defaults.retry_max_delay_ms),
        mutation_retry: query.mutation_retry.unwrap_or(defaults.mutation_retry),
        request_timeout_ms: query
            .request_timeout_ms
            .unwrap_or(defaults.request_timeout_ms),
        refetch_on_window_focus: query
            .refetch_on_window_focus
            .unwrap_or(defaults.refetch_on_window_focus),
        refetch_on_reconnect: query
            .refetch_on_reconnect
            .unwrap_or(defaults.refetch_on_reconnect),
        gc_interval_ms: query.gc_interval_ms.unwrap_or(defaults.gc_interval_ms),
        max_entries: query.max_entries.unwrap_or(defaults.max_entries),
    };

    if config.request_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "query.request_timeout_ms",
            "must be greater than zero",
        ));
    }
    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(LoadError::invalid(
            "query.retry_base_delay_ms",
            format!(
                "must not exceed query.retry_max_delay_ms ({})",
                config.retry_max_delay_ms
            ),
        ));
    }

    Ok(config)
}
