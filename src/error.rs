// trl: Legacy DNA sequencer trace ingestion, validation, and normalization.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Error types shared across the crate.
//!
//! The variants follow the fatality classes the row-processing loop cares
//! about: [Format](TrlError::Format) errors are per-record and counted
//! against the failure threshold, [Parse](TrlError::Parse) errors abort the
//! run, [Validation](TrlError::Validation) failures are per-row and counted.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrlError>;

#[derive(Error, Debug)]
pub enum TrlError {
    /// Malformed binary trace file. Fatal for the one record being decoded.
    #[error("trace format error: {0}")]
    Format(String),

    /// Manifest or rule file syntax error. Fatal for the entire run.
    #[error("parse error: {0}")]
    Parse(String),

    /// Per-row content validation failure, counted against the threshold.
    #[error("validation failure: {0}")]
    Validation(String),

    /// The cumulative failure count crossed the configured threshold.
    #[error("too many invalid rows: {failures} failures in {total} rows (limit {limit}), last: {last}")]
    TooManyErrors {
        failures: usize,
        total: usize,
        limit: usize,
        last: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrlError {
    /// Truncated-input helper used by the binary decoders.
    pub fn truncated(what: &str, offset: usize) -> Self {
        TrlError::Format(format!("unexpected end of data reading {what} at offset {offset}"))
    }
}
