//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::types::{DisplayOptions, PageMargins, ViewMode};

const ENV_PREFIX: &str = "SPARTITO";
const ENV_SEPARATOR: &str = "__";

const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_SCALE: u32 = 40;
const MIN_SCALE: u32 = 1;
const MAX_SCALE: u32 = 1000;

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Compact,
}

/// Logging settings consumed by [`crate::infra::telemetry::init`].
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

/// Validated runtime settings for a viewer session.
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    /// Coalescing window restarted on every qualifying input change.
    pub debounce: Duration,
    /// Upper bound for one score URL fetch.
    pub fetch_timeout: Duration,
    /// Bound on each direction of the engine channel.
    pub channel_capacity: usize,
    /// Initial display inputs; mutable per-session afterwards.
    pub display: DisplayOptions,
    pub logging: LoggingSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            display: DisplayOptions::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ViewerSettings {
    /// Load settings from an optional TOML file overlaid with
    /// `SPARTITO__`-prefixed environment variables, then validate.
    pub fn load(config_file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let raw: RawSettings = builder
            .build()
            .map_err(|err| SettingsError::Load(err.to_string()))?
            .try_deserialize()
            .map_err(|err| SettingsError::Load(err.to_string()))?;

        raw.validate()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    debounce_ms: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
    display: RawDisplay,
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDisplay {
    scale: Option<u32>,
    page_margin: Option<f64>,
    margins: Option<PageMargins>,
    show_header: Option<bool>,
    show_footer: Option<bool>,
    view_mode: Option<ViewMode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl RawSettings {
    fn validate(self) -> Result<ViewerSettings, SettingsError> {
        let defaults = ViewerSettings::default();

        let debounce_ms = self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS);
        if debounce_ms == 0 {
            return Err(SettingsError::invalid(
                "debounce_ms",
                "must be at least 1 millisecond",
            ));
        }

        let channel_capacity = self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(SettingsError::invalid(
                "channel_capacity",
                "must be at least 1",
            ));
        }

        let scale = self.display.scale.unwrap_or(DEFAULT_SCALE);
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(SettingsError::invalid(
                "display.scale",
                "must be between 1 and 1000",
            ));
        }

        let level = match self.logging.level {
            Some(raw) => LevelFilter::from_str(&raw)
                .map_err(|_| SettingsError::invalid("logging.level", "unknown level filter"))?,
            None => defaults.logging.level,
        };

        Ok(ViewerSettings {
            debounce: Duration::from_millis(debounce_ms),
            fetch_timeout: Duration::from_secs(
                self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            channel_capacity,
            display: DisplayOptions {
                scale,
                page_margin: self.display.page_margin.unwrap_or(0.0),
                margins: self.display.margins.unwrap_or_default(),
                show_header: self.display.show_header.unwrap_or(false),
                show_footer: self.display.show_footer.unwrap_or(false),
                view_mode: self.display.view_mode.unwrap_or_default(),
                extra: serde_json::Map::new(),
            },
            logging: LoggingSettings {
                level,
                format: self.logging.format.unwrap_or(LogFormat::Compact),
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl SettingsError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

#[cfg(test)]
mod tests;
