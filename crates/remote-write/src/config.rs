// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Importer configuration.
//!
//! Loaded in priority order:
//! 1. Defaults
//! 2. YAML file (`config.yaml`)
//! 3. Environment variables prefixed with `REMOTE_WRITE_`, nested keys
//!    separated by `__` (highest priority)
//!
//! ```yaml
//! log_level: info
//! importer:
//!   file:
//!     path: data.lp
//!     precision: ms
//! exporter:
//!   prometheus:
//!     endpoint: http://localhost:9090/api/v1/write
//!     compression: snappy
//!     timestamp: send_time
//!     label_schema: heterogeneous
//! ```

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::Deserialize;

use crate::aggregator::LabelSchema;
use crate::compression::{Codec, Compression};
use crate::constants::CONFIG_ENV_PREFIX;
use crate::errors::ConfigError;
use crate::wire::{Precision, TimestampPolicy, TimestampSource};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub importer: ImporterConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImporterConfig {
    pub file: FileImporterConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileImporterConfig {
    pub path: PathBuf,
    /// Unit of the timestamps in the file, used with `timestamp: sample`.
    #[serde(default)]
    pub precision: Precision,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub endpoint: Option<String>,
    pub compression: Codec,
    pub compression_level: Option<i32>,
    pub timestamp: TimestampSource,
    pub label_schema: LabelSchema,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads `path` and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"))
            .extract()?;
        config.log_level = config.log_level.to_lowercase();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.importer.file.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "importer.file.path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Remote-write endpoint, `None` when unset or blank.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.exporter
            .prometheus
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    #[must_use]
    pub fn compression(&self) -> Compression {
        let prometheus = &self.exporter.prometheus;
        Compression::new(prometheus.compression, prometheus.compression_level)
    }

    #[must_use]
    pub fn timestamp_policy(&self) -> TimestampPolicy {
        TimestampPolicy {
            source: self.exporter.prometheus.timestamp,
            precision: self.importer.file.precision,
        }
    }

    #[must_use]
    pub fn label_schema(&self) -> LabelSchema {
        self.exporter.prometheus.label_schema
    }
}
