// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line protocol parsing.
//!
//! A record looks like
//!
//! ```text
//! measurement[,tagKey=tagVal]* fieldKey=fieldVal[,fieldKey=fieldVal]* timestamp
//! ```
//!
//! Parsing is structural only: tags split on `=`, fields split on the first
//! `=`, and each field value is typed as a quoted string, a float (when it
//! contains a decimal point) or a signed integer.

use std::fmt;

use ustr::Ustr;

use crate::constants::{COMMENT_PREFIX, CREATE_DATABASE_PREFIX};
use crate::errors::ParseError;

/// Tag set of a sample, kept sorted by key with unique keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SortedTags {
    values: Vec<(Ustr, Ustr)>,
}

impl SortedTags {
    #[must_use]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Inserts a tag, replacing the value of an existing key.
    pub fn insert(&mut self, key: Ustr, value: Ustr) {
        match self
            .values
            .binary_search_by(|(k, _)| k.as_str().cmp(key.as_str()))
        {
            Ok(i) => self.values[i].1 = value,
            Err(i) => self.values.insert(i, (key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| self.values[i].1.as_str())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Ustr> {
        self.values
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| self.values.remove(i).1)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[(Ustr, Ustr)] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ustr, Ustr)> + '_ {
        self.values.iter().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = Ustr> + '_ {
        self.values.iter().map(|(k, _)| *k)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for SortedTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = SortedTags::new();
        for (k, v) in iter {
            tags.insert(Ustr::from(k.as_ref()), Ustr::from(v.as_ref()));
        }
        tags
    }
}

impl fmt::Display for SortedTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    /// Numeric view of the value, `None` for strings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::String(_) => None,
        }
    }
}

/// One parsed line-protocol record.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub measurement: Ustr,
    pub tags: SortedTags,
    /// Fields in line order. Keys are unique.
    pub fields: Vec<(Ustr, FieldValue)>,
    /// Timestamp exactly as written on the line.
    pub timestamp: i64,
}

impl Sample {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }
}

/// Parses one line.
///
/// Returns `Ok(None)` for lines that carry no sample: blank lines, comments
/// and `CREATE DATABASE` statements.
pub fn parse(line: &str) -> Result<Option<Sample>, ParseError> {
    let line = line.trim();
    if line.is_empty()
        || line.starts_with(COMMENT_PREFIX)
        || line.starts_with(CREATE_DATABASE_PREFIX)
    {
        return Ok(None);
    }

    let (series_section, fields_section) =
        line.split_once(' ').ok_or(ParseError::MissingFieldSet)?;

    let mut series_parts = series_section.split(',');
    let measurement = series_parts.next().unwrap_or_default();
    if measurement.is_empty() {
        return Err(ParseError::EmptyMeasurement);
    }

    let mut tags = SortedTags::new();
    for part in series_parts {
        let (key, value) = parse_tag(part)?;
        tags.insert(Ustr::from(key), Ustr::from(value));
    }

    let (fields_part, timestamp_part) = fields_section
        .rsplit_once(' ')
        .ok_or(ParseError::MissingTimestamp)?;

    let mut fields: Vec<(Ustr, FieldValue)> = Vec::new();
    for part in fields_part.split(',') {
        let (key, raw) = part
            .split_once('=')
            .ok_or_else(|| ParseError::MalformedField(part.to_string()))?;
        let key = Ustr::from(key);
        let value = parse_field_value(key.as_str(), raw)?;
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => fields.push((key, value)),
        }
    }

    let timestamp = timestamp_part
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidTimestamp(timestamp_part.to_string()))?;

    Ok(Some(Sample {
        measurement: Ustr::from(measurement),
        tags,
        fields,
        timestamp,
    }))
}

fn parse_tag(part: &str) -> Result<(&str, &str), ParseError> {
    let mut kv = part.split('=');
    match (kv.next(), kv.next(), kv.next()) {
        (Some(key), Some(value), None) if !key.is_empty() => Ok((key, value)),
        _ => Err(ParseError::MalformedTag(part.to_string())),
    }
}

fn parse_field_value(key: &str, raw: &str) -> Result<FieldValue, ParseError> {
    if raw.starts_with('"') && raw.ends_with('"') {
        return Ok(FieldValue::String(raw.trim_matches('"').to_string()));
    }
    let invalid = || ParseError::InvalidFieldValue {
        key: key.to_string(),
        value: raw.to_string(),
    };
    if raw.contains('.') {
        raw.parse::<f64>().map(FieldValue::Float).map_err(|_| invalid())
    } else {
        raw.parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| invalid())
    }
}
