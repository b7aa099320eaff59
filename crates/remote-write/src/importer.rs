// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reads a line-protocol file into samples.
//!
//! Every line is parsed on its own. A malformed line is logged, recorded in
//! the [`ImportReport`] and skipped; it never stops the import.

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{ImportError, ParseError};
use crate::sample::{parse, Sample};

#[derive(Clone, Debug, PartialEq)]
pub struct ParseFailure {
    /// 1-based line number in the source.
    pub line_number: usize,
    pub line: String,
    pub error: ParseError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    pub samples: Vec<Sample>,
    pub failures: Vec<ParseFailure>,
    /// Blank, comment and `CREATE DATABASE` lines.
    pub ignored: usize,
}

/// Parses every line of `text`.
#[must_use]
pub fn import_lines(text: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for (idx, line) in text.lines().enumerate() {
        match parse(line) {
            Ok(Some(sample)) => report.samples.push(sample),
            Ok(None) => report.ignored += 1,
            Err(error) => {
                let line = line.trim();
                warn!("Failed to parse line: {}. Error: {}", line, error);
                report.failures.push(ParseFailure {
                    line_number: idx + 1,
                    line: line.to_string(),
                    error,
                });
            }
        }
    }
    debug!(
        "Parsed {} samples, {} failures, {} ignored lines",
        report.samples.len(),
        report.failures.len(),
        report.ignored
    );
    report
}

/// Reads the whole file at `path` and parses it.
pub fn import_file(path: &Path) -> Result<ImportReport, ImportError> {
    let text = std::fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(import_lines(&text))
}
