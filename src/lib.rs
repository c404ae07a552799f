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

//! trl is a library and a command-line client for:
//!
//!   - Decoding legacy DNA sequencer trace containers (ABI, SCF, ZTR, SFF,
//!     plus gzip-compressed variants of each) into one normalized record shape.
//!   - Loading and validating TraceInfo submission manifests against a static
//!     field catalog and a user-supplied rule file.
//!   - Exporting validated rows and their decoded traces through a column sink.
//!
//! ## Usage
//!
//! The high-level entry point is [run_pipeline]: given a manifest file and a
//! rule file it runs the whole load → validate → decode → export sequence
//! and writes the normalized columns to the given output. [decode_file]
//! decodes a single trace container without a manifest.
//!
//! Per-row problems (malformed trace files, rule rejections, missing helper
//! files) are counted against a configurable failure threshold; the failure
//! that reaches the threshold aborts the run. Manifest and rule file syntax
//! errors abort immediately.

use std::io::Write;
use std::path::Path;

use log::info;
use log::warn;

use crate::error::Result;
use crate::error::TrlError;
use crate::manifest::ManifestRow;
use crate::record::TraceOverrides;
use crate::record::TraceRecord;
use crate::validate::ValidatorOptions;
use crate::writer::ColumnSink;
use crate::writer::FieldAdapter;
use crate::writer::TsvSink;

pub mod bytes;
pub mod compression;
pub mod decoder;
pub mod error;
pub mod fields;
pub mod manifest;
pub mod record;
pub mod rules;
pub mod validate;
pub mod writer;

/// Supported trace container formats.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TraceFormat {
    Abi,
    Scf,
    Sff,
    Ztr,
    #[default]
    Unk,
}

impl std::str::FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abi" => Ok(TraceFormat::Abi),
            "scf" => Ok(TraceFormat::Scf),
            "sff" => Ok(TraceFormat::Sff),
            "ztr" => Ok(TraceFormat::Ztr),
            _ => Err(format!("unrecognized trace format: {s}")),
        }
    }
}

impl std::fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TraceFormat::Abi => "ABI",
            TraceFormat::Scf => "SCF",
            TraceFormat::Sff => "SFF",
            TraceFormat::Ztr => "ZTR",
            TraceFormat::Unk => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// Decodes one trace file from disk.
///
/// The file is memory-mapped, inflated first if it carries a gzip
/// signature, sniffed for its container format, and decoded. `read_name`
/// selects the read inside a shared multi-read SFF container.
pub fn decode_file(
    path: &Path,
    read_name: Option<&str>,
    overrides: &TraceOverrides,
) -> Result<(TraceFormat, TraceRecord)> {
    let file = std::fs::File::open(path)?;
    // Read-only map; trace files are immutable once submitted.
    let mapped = unsafe { memmap2::Mmap::map(&file)? };

    let inflated;
    let bytes: &[u8] = if compression::gzwrapper::is_gzip(&mapped) {
        inflated = compression::gzwrapper::inflate_gz(&mapped)?;
        &inflated
    } else {
        &mapped
    };

    let format = decoder::guess_format(bytes);
    let record = decoder::decode(&format, bytes, read_name, overrides)?;
    Ok((format, record))
}

/// Loads the external base, quality, and peak files a manifest row points
/// at, resolved relative to `base_dir`.
///
/// The files are plain text: the base file holds the sequence (FASTA
/// header lines are tolerated and skipped), the quality and peak files
/// hold whitespace-separated integers.
pub fn load_overrides(row: &ManifestRow, base_dir: &Path) -> Result<TraceOverrides> {
    let mut overrides = TraceOverrides::default();

    if let Some(name) = row.get_non_empty("BASE_FILE") {
        let text = std::fs::read_to_string(base_dir.join(name))?;
        let bases: Vec<u8> = text
            .lines()
            .filter(|line| !line.starts_with('>'))
            .flat_map(|line| line.bytes())
            .filter(|symbol| !symbol.is_ascii_whitespace())
            .map(record::normalize_base)
            .collect();
        overrides.bases = Some(bases);
    }
    if let Some(name) = row.get_non_empty("QUAL_FILE") {
        let text = std::fs::read_to_string(base_dir.join(name))?;
        overrides.confidence = Some(parse_numbers(&text, name)?);
    }
    if let Some(name) = row.get_non_empty("PEAK_FILE") {
        let text = std::fs::read_to_string(base_dir.join(name))?;
        overrides.peak_index = Some(parse_numbers(&text, name)?);
    }
    Ok(overrides)
}

fn parse_numbers<T: std::str::FromStr>(text: &str, what: &str) -> Result<Vec<T>> {
    text.lines()
        .filter(|line| !line.starts_with('>'))
        .flat_map(str::split_whitespace)
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| TrlError::Format(format!("bad number {token:?} in {what}")))
        })
        .collect()
}

/// Counters reported by a completed [run_pipeline] call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PipelineSummary {
    pub total: usize,
    pub exported: usize,
    pub failed: usize,
}

/// Runs the full load → validate → decode → export sequence.
///
/// Manifest and rule syntax errors abort immediately. Per-row problems
/// found after validation (trace decode failures, unreadable helper
/// files) keep counting against the same failure threshold the validator
/// used; the failure that reaches the threshold aborts the run with
/// [TrlError::TooManyErrors]. This loop is the only place that decides
/// fatal-vs-counted; everything below it just raises.
pub fn run_pipeline<W: Write>(
    manifest_path: &Path,
    rules_path: &Path,
    out: W,
    options: ValidatorOptions,
) -> Result<PipelineSummary> {
    let catalog = fields::FieldCatalog::standard();
    let rules = rules::load_rules(rules_path, &catalog)?;
    let bytes = std::fs::read(manifest_path)?;

    let base_dir = options.base_dir.clone();
    let mut validator = validate::Validator::new(&catalog, &rules, options);
    let mut rows = validator.load(&bytes)?;
    let mut failures = validator.validate(&mut rows)?;
    let limit = validator.allowed_failures(rows.len());

    let field_order: Vec<String> = rows
        .first()
        .map(|row| row.fields.keys().cloned().collect())
        .unwrap_or_default();
    let sink = TsvSink::new(out);
    let mut adapter = FieldAdapter::new(sink, "TRACE", &field_order, &catalog)?;

    let total = rows.len();
    let mut exported = 0_usize;
    for (index, row) in rows.iter_mut().enumerate() {
        if !row.is_valid() {
            continue;
        }
        match export_row(row, &base_dir, &mut adapter) {
            Ok(()) => exported += 1,
            Err(err @ TrlError::Parse(_)) => return Err(err),
            Err(err) => {
                failures += 1;
                let reason = err.to_string();
                if failures >= limit {
                    return Err(TrlError::TooManyErrors { failures, total, limit, last: reason });
                }
                warn!("row {}: {reason}", index + 1);
                row.mark_invalid(reason);
            },
        }
    }
    info!("exported {exported} of {total} rows, {failures} failures");
    Ok(PipelineSummary { total, exported, failed: failures })
}

fn export_row<S: ColumnSink>(
    row: &ManifestRow,
    base_dir: &Path,
    adapter: &mut FieldAdapter<S>,
) -> Result<()> {
    let trace_file = row
        .get_non_empty("TRACE_FILE")
        .ok_or_else(|| TrlError::Validation("trace file is not set".to_string()))?;

    let overrides = load_overrides(row, base_dir)?;
    let (_, record) = decode_file(&base_dir.join(trace_file), row.get("TRACE_NAME"), &overrides)?;

    let mut bundle = record::TraceBundle::new(record);
    bundle.overrides = overrides;
    adapter.write_row(row, &bundle)
}
