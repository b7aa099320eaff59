// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use crate::constants::DEFAULT_ZSTD_LEVEL;
use crate::errors::CompressionError;

/// Codec names as accepted in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
}

/// Block compression applied to the encoded request before shipping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Snappy raw block format, no framing.
    #[default]
    Snappy,
    Zstd { level: i32 },
}

impl Compression {
    #[must_use]
    pub fn new(codec: Codec, level: Option<i32>) -> Self {
        match codec {
            Codec::Snappy => Compression::Snappy,
            Codec::Zstd => Compression::Zstd {
                level: level.unwrap_or(DEFAULT_ZSTD_LEVEL),
            },
        }
    }

    /// Value of the `Content-Encoding` header for this codec.
    #[must_use]
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Compression::Snappy => "snappy",
            Compression::Zstd { .. } => "zstd",
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::Snappy => Ok(snap::raw::Encoder::new().compress_vec(data)?),
            Compression::Zstd { level } => Ok(zstd::encode_all(data, *level)?),
        }
    }
}
