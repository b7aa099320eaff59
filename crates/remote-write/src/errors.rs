// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use reqwest::StatusCode;

/// Reasons a single line-protocol record is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no space between measurement and fields")]
    MissingFieldSet,
    #[error("measurement name is empty")]
    EmptyMeasurement,
    #[error("malformed tag '{0}', expected exactly one '=' and a non-empty key")]
    MalformedTag(String),
    #[error("no space between fields and timestamp")]
    MissingTimestamp,
    #[error("malformed field '{0}', expected key=value")]
    MalformedField(String),
    #[error("invalid value '{value}' for field '{key}'")]
    InvalidFieldValue { key: String, value: String },
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("metric {metric} declared with labels {expected:?}, got {found:?}")]
    InconsistentLabels {
        metric: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("snappy compression failed: {0}")]
    Snappy(#[from] snap::Error),
    #[error("zstd compression failed: {0}")]
    Zstd(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of buffer")]
    Truncated,
    #[error("varint longer than 10 bytes")]
    VarintOverflow,
    #[error("unexpected wire type {wire_type} for field {field}")]
    UnexpectedWireType { field: u64, wire_type: u64 },
    #[error("label is not valid UTF-8")]
    InvalidUtf8,
}

/// Failure to deliver a payload to the remote endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("failed to prepare payload: {0}")]
    Payload(String),
    #[error("destination error {0:?}: {1}")]
    Destination(Option<StatusCode>, String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Load(Box::new(e))
    }
}
