// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Label carrying the metric name on every emitted series.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Separator between measurement and field name in a metric name.
pub const METRIC_NAME_SEPARATOR: char = '_';

/// Lines starting with this literal are database statements, not samples.
pub const CREATE_DATABASE_PREFIX: &str = "CREATE DATABASE";

pub const COMMENT_PREFIX: char = '#';

pub const CONTENT_TYPE: &str = "application/x-protobuf";

pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const CONFIG_PATH_ENV: &str = "REMOTE_WRITE_CONFIG";
pub const CONFIG_ENV_PREFIX: &str = "REMOTE_WRITE_";

pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Number of compressed bytes echoed at debug level before shipping.
pub const PAYLOAD_PREVIEW_BYTES: usize = 100;
