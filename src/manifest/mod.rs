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

//! Manifest (TraceInfo) loader.
//!
//! A manifest opens with a block of `key = value` lines shared by every
//! row, terminated by the first tab-delimited header line; every following
//! line is a tab-delimited value row matching that header. The loader
//! produces ordered rows pre-seeded with the common fields. Syntax problems
//! are fatal; duplicate keys, duplicate columns, and duplicate rows are
//! warnings that drop the duplicate.

pub mod owp;

use std::collections::HashSet;

use bstr::ByteSlice;
use indexmap::IndexMap;
use log::warn;

use crate::error::{Result, TrlError};

/// One sample submission record: ordered field name → value pairs plus the
/// validator's invalidation marker. Field names are stored uppercased.
#[derive(Clone, Debug, Default)]
pub struct ManifestRow {
    pub fields: IndexMap<String, String>,
    pub invalid: Option<String>,
}

impl ManifestRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_ascii_uppercase()).map(|value| value.as_str())
    }

    /// Value of `name` if present and non-empty.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_ascii_uppercase(), value.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }

    pub fn mark_invalid(&mut self, reason: String) {
        if self.invalid.is_none() {
            self.invalid = Some(reason);
        }
    }

    /// Case-normalized concatenation of all values, the row identity used
    /// for deduplication.
    fn dedup_key(&self) -> String {
        let mut key = String::new();
        for value in self.fields.values() {
            key.push_str(&value.to_ascii_lowercase());
            key.push('\t');
        }
        key
    }
}

/// Printable here means anything that is not an ASCII control byte other
/// than tab and the line terminators.
fn check_printable(bytes: &[u8]) -> Result<()> {
    if let Some(position) = bytes
        .iter()
        .position(|byte| (*byte < 0x20 && !matches!(byte, b'\t' | b'\n' | b'\r')) || *byte == 0x7f)
    {
        return Err(TrlError::Parse(format!(
            "non-printable byte 0x{:02x} at offset {position}",
            bytes[position]
        )));
    }
    Ok(())
}

/// Loads a manifest from raw file bytes.
pub fn load_manifest(bytes: &[u8]) -> Result<Vec<ManifestRow>> {
    check_printable(bytes)?;

    let mut common: IndexMap<String, String> = IndexMap::new();
    let mut header: Option<Vec<Option<String>>> = None;
    let mut rows: Vec<ManifestRow> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (lineno, raw) in bytes.lines().enumerate() {
        let lineno = lineno + 1;
        match &header {
            None => {
                if raw.trim().is_empty() {
                    continue;
                }
                if raw.contains(&b'\t') {
                    header = Some(read_header(raw, &common));
                    continue;
                }
                let line = raw.trim().to_str_lossy();
                let (key, value) = line.split_once('=').ok_or_else(|| {
                    TrlError::Parse(format!("line {lineno}: expected key = value, got {line:?}"))
                })?;
                let key = key.trim().to_ascii_uppercase();
                let value = value.trim().to_string();
                if let Some(previous) = common.insert(key.clone(), value) {
                    warn!("line {lineno}: common field {key} redeclared, dropping value {previous:?}");
                }
            },
            Some(columns) => {
                if raw.trim().is_empty() {
                    continue;
                }
                let row = read_row(raw, columns, &common, lineno)?;
                let key = row.dedup_key();
                if !seen.insert(key) {
                    warn!("line {lineno}: duplicate row dropped");
                    continue;
                }
                rows.push(row);
            },
        }
    }

    if header.is_none() {
        return Err(TrlError::Parse("manifest has no tab-delimited header line".to_string()));
    }
    if rows.is_empty() {
        return Err(TrlError::Parse("manifest has no data rows".to_string()));
    }
    Ok(rows)
}

/// Columns that collide with a common field are dropped (kept as `None` so
/// value positions still line up).
fn read_header(raw: &[u8], common: &IndexMap<String, String>) -> Vec<Option<String>> {
    raw.split(|byte| *byte == b'\t')
        .map(|column| {
            let name = column.trim().to_str_lossy().to_ascii_uppercase();
            if common.contains_key(&name) {
                warn!("column {name} already declared in the common block, dropping the column");
                None
            } else {
                Some(name)
            }
        })
        .collect()
}

fn read_row(
    raw: &[u8],
    columns: &[Option<String>],
    common: &IndexMap<String, String>,
    lineno: usize,
) -> Result<ManifestRow> {
    let mut values: Vec<String> = raw
        .split(|byte| *byte == b'\t')
        .map(|value| value.trim().to_str_lossy().to_string())
        .collect();

    // One trailing empty column, either present or absent, is tolerated.
    if values.len() == columns.len() + 1 && values.last().is_some_and(|value| value.is_empty()) {
        values.pop();
    } else if values.len() + 1 == columns.len() {
        values.push(String::new());
    }
    if values.len() != columns.len() {
        return Err(TrlError::Parse(format!(
            "line {lineno}: {} values for {} header columns",
            values.len(),
            columns.len()
        )));
    }

    let mut row = ManifestRow::default();
    for (key, value) in common.iter() {
        row.fields.insert(key.clone(), value.clone());
    }
    for (column, value) in columns.iter().zip(values) {
        if let Some(name) = column {
            row.fields.insert(name.clone(), value);
        }
    }
    Ok(row)
}
