// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Binary encoding of a [`WriteRequest`] for the remote-write endpoint.
//!
//! The message uses protobuf wire primitives only:
//!
//! - a varint is little-endian base-128 with the high bit set on every byte
//!   but the last,
//! - a field starts with the varint `(field_number << 3) | wire_type`,
//! - wire type 2 is a varint length followed by that many bytes,
//! - wire type 1 is eight little-endian bytes.
//!
//! A series record is its label pairs (field 1 = name, field 2 = value),
//! then the value as an `f64` in field 3 and the timestamp in milliseconds as
//! an `i64` in field 4. The request wraps each record in field 1.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::aggregator::{Series, WriteRequest};
use crate::errors::DecodeError;

pub const WIRE_TYPE_FIXED64: u8 = 1;
pub const WIRE_TYPE_LEN: u8 = 2;

const REQUEST_SERIES_FIELD: u32 = 1;
const LABEL_NAME_FIELD: u32 = 1;
const LABEL_VALUE_FIELD: u32 = 2;
const VALUE_FIELD: u32 = 3;
const TIMESTAMP_FIELD: u32 = 4;

const MAX_VARINT_LEN: usize = 10;

/// Which timestamp each encoded series carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Wall clock at encode time, identical for the whole batch.
    #[default]
    SendTime,
    /// The timestamp parsed from the sample's line.
    Sample,
}

/// Unit of the timestamps written in the source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum Precision {
    #[serde(rename = "ns")]
    Nanoseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl Precision {
    #[must_use]
    pub fn to_millis(self, timestamp: i64) -> i64 {
        match self {
            Precision::Nanoseconds => timestamp.div_euclid(1_000_000),
            Precision::Microseconds => timestamp.div_euclid(1_000),
            Precision::Milliseconds => timestamp,
            Precision::Seconds => timestamp.saturating_mul(1_000),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimestampPolicy {
    pub source: TimestampSource,
    pub precision: Precision,
}

impl TimestampPolicy {
    fn resolve(self, series: &Series, send_time_ms: i64) -> i64 {
        match self.source {
            TimestampSource::SendTime => send_time_ms,
            TimestampSource::Sample => self.precision.to_millis(series.timestamp),
        }
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value > 0x7f {
        #[allow(clippy::cast_possible_truncation)]
        buf.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.push(value as u8);
}

pub fn encode_key(field: u32, wire_type: u8, buf: &mut Vec<u8>) {
    encode_varint(u64::from(field) << 3 | u64::from(wire_type), buf);
}

pub fn encode_bytes(field: u32, payload: &[u8], buf: &mut Vec<u8>) {
    encode_key(field, WIRE_TYPE_LEN, buf);
    encode_varint(payload.len() as u64, buf);
    buf.extend_from_slice(payload);
}

pub fn encode_string(field: u32, value: &str, buf: &mut Vec<u8>) {
    encode_bytes(field, value.as_bytes(), buf);
}

pub fn encode_fixed64(field: u32, bytes: [u8; 8], buf: &mut Vec<u8>) {
    encode_key(field, WIRE_TYPE_FIXED64, buf);
    buf.extend_from_slice(&bytes);
}

/// Appends one series record, without the enclosing request field.
pub fn encode_series(series: &Series, timestamp_ms: i64, buf: &mut Vec<u8>) {
    for (name, value) in series.labels() {
        encode_string(LABEL_NAME_FIELD, name, buf);
        encode_string(LABEL_VALUE_FIELD, value, buf);
    }
    encode_fixed64(VALUE_FIELD, series.value.to_le_bytes(), buf);
    encode_fixed64(TIMESTAMP_FIELD, timestamp_ms.to_le_bytes(), buf);
}

/// Encodes `request`, capturing the send time once for the whole batch.
#[must_use]
pub fn encode_write_request(request: &WriteRequest, policy: TimestampPolicy) -> Vec<u8> {
    encode_write_request_at(request, policy, now_millis())
}

#[must_use]
pub fn encode_write_request_at(
    request: &WriteRequest,
    policy: TimestampPolicy,
    send_time_ms: i64,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut record = Vec::new();
    for series in &request.series {
        record.clear();
        encode_series(series, policy.resolve(series, send_time_ms), &mut record);
        encode_bytes(REQUEST_SERIES_FIELD, &record, &mut buf);
    }
    buf
}

/// A series record read back from the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSeries {
    pub labels: Vec<(String, String)>,
    pub value: f64,
    pub timestamp: i64,
}

impl DecodedSeries {
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Decodes a varint from the front of `buf`, returning it and its length.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value: u64 = 0;
    for (i, byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(DecodeError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(DecodeError::VarintOverflow)
    } else {
        Err(DecodeError::Truncated)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let (value, len) = decode_varint(&self.buf[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    fn key(&mut self) -> Result<(u64, u64), DecodeError> {
        let key = self.varint()?;
        Ok((key >> 3, key & 0x7))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = usize::try_from(self.varint()?).map_err(|_| DecodeError::Truncated)?;
        self.take(len)
    }

    fn fixed64(&mut self) -> Result<[u8; 8], DecodeError> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(bytes)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.len_delimited()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

fn decode_series(buf: &[u8]) -> Result<DecodedSeries, DecodeError> {
    let mut reader = Reader::new(buf);
    let mut labels: Vec<(String, String)> = Vec::new();
    let mut value = 0.0;
    let mut timestamp = 0;
    while !reader.is_empty() {
        match reader.key()? {
            (1, 2) => labels.push((reader.string()?, String::new())),
            (2, 2) => {
                let v = reader.string()?;
                match labels.last_mut() {
                    Some(last) => last.1 = v,
                    None => labels.push((String::new(), v)),
                }
            }
            (3, 1) => value = f64::from_le_bytes(reader.fixed64()?),
            (4, 1) => timestamp = i64::from_le_bytes(reader.fixed64()?),
            (field, wire_type) => {
                return Err(DecodeError::UnexpectedWireType { field, wire_type })
            }
        }
    }
    Ok(DecodedSeries {
        labels,
        value,
        timestamp,
    })
}

/// Decodes a message produced by [`encode_write_request`].
pub fn decode_write_request(buf: &[u8]) -> Result<Vec<DecodedSeries>, DecodeError> {
    let mut reader = Reader::new(buf);
    let mut series = Vec::new();
    while !reader.is_empty() {
        match reader.key()? {
            (1, 2) => series.push(decode_series(reader.len_delimited()?)?),
            (field, wire_type) => {
                return Err(DecodeError::UnexpectedWireType { field, wire_type })
            }
        }
    }
    Ok(series)
}
