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

//! The column-sink boundary and the field adapter feeding it.
//!
//! [ColumnSink] is the opaque downstream storage interface: tables, typed
//! columns, per-row writes. [TsvSink] is the built-in implementation that
//! renders to text so the pipeline is usable end to end. [FieldAdapter]
//! owns the column layout: the fixed trace columns first, then one dynamic
//! column per manifest field.

use std::io::Write;

use crate::error::Result;
use crate::fields::FieldCatalog;
use crate::manifest::ManifestRow;
use crate::record::TraceBundle;

pub type ColumnId = usize;

/// One column's worth of data for one row.
#[derive(Clone, Copy, Debug)]
pub enum ColumnData<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    U8(&'a [u8]),
    U32(&'a [u32]),
    U64(&'a [u64]),
}

/// The downstream storage boundary.
pub trait ColumnSink {
    fn open_table(&mut self, name: &str) -> Result<()>;
    /// Text or blob column.
    fn add_column(&mut self, name: &str, bit_width: u32) -> Result<ColumnId>;
    fn add_integer_column(&mut self, name: &str, bit_width: u32) -> Result<ColumnId>;
    /// Value used when a row writes nothing to the column.
    fn set_column_default(&mut self, column: ColumnId, data: ColumnData) -> Result<()>;
    fn write(&mut self, column: ColumnId, data: ColumnData) -> Result<()>;
    fn next_row(&mut self) -> Result<()>;
}

fn render(data: ColumnData) -> String {
    fn join<T: std::fmt::Display>(values: &[T]) -> String {
        values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<String>>()
            .join(",")
    }
    match data {
        ColumnData::Text(text) => text.to_string(),
        ColumnData::Bytes(bytes) => String::from_utf8_lossy(bytes).to_string(),
        ColumnData::U8(values) => join(values),
        ColumnData::U32(values) => join(values),
        ColumnData::U64(values) => join(values),
    }
}

/// Renders rows as tab-separated text, one header line per table.
pub struct TsvSink<W: Write> {
    out: W,
    columns: Vec<String>,
    defaults: Vec<String>,
    pending: Vec<Option<String>>,
    header_written: bool,
}

impl<W: Write> TsvSink<W> {
    pub fn new(out: W) -> Self {
        TsvSink {
            out,
            columns: Vec::new(),
            defaults: Vec::new(),
            pending: Vec::new(),
            header_written: false,
        }
    }

    fn push_column(&mut self, name: &str) -> ColumnId {
        self.columns.push(name.to_string());
        self.defaults.push(String::new());
        self.pending.push(None);
        self.columns.len() - 1
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ColumnSink for TsvSink<W> {
    fn open_table(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, "# table: {name}")?;
        Ok(())
    }

    fn add_column(&mut self, name: &str, _bit_width: u32) -> Result<ColumnId> {
        Ok(self.push_column(name))
    }

    fn add_integer_column(&mut self, name: &str, _bit_width: u32) -> Result<ColumnId> {
        Ok(self.push_column(name))
    }

    fn set_column_default(&mut self, column: ColumnId, data: ColumnData) -> Result<()> {
        self.defaults[column] = render(data);
        Ok(())
    }

    fn write(&mut self, column: ColumnId, data: ColumnData) -> Result<()> {
        self.pending[column] = Some(render(data));
        Ok(())
    }

    fn next_row(&mut self) -> Result<()> {
        if !self.header_written {
            writeln!(self.out, "{}", self.columns.join("\t"))?;
            self.header_written = true;
        }
        let row: Vec<String> = self
            .pending
            .iter_mut()
            .zip(self.defaults.iter())
            .map(|(value, default)| value.take().unwrap_or_else(|| default.clone()))
            .collect();
        writeln!(self.out, "{}", row.join("\t"))?;
        Ok(())
    }
}

/// Fixed trace columns, registered before any dynamic manifest column.
struct TraceColumns {
    name: ColumnId,
    bases: ColumnId,
    peak_index: ColumnId,
    confidence: ColumnId,
    samples: ColumnId,
    clip_quality_left: ColumnId,
    clip_quality_right: ColumnId,
    clip_adapter_left: ColumnId,
    clip_adapter_right: ColumnId,
}

/// Maps validated rows and decoded bundles onto sink columns.
pub struct FieldAdapter<S: ColumnSink> {
    sink: S,
    trace: TraceColumns,
    /// Manifest field name → column, in catalog-then-manifest order.
    dynamic: Vec<(String, ColumnId)>,
}

impl<S: ColumnSink> FieldAdapter<S> {
    /// Opens the table and registers the column layout. `fields` is the set
    /// of manifest field names present in this run, in manifest order.
    pub fn new(mut sink: S, table: &str, fields: &[String], catalog: &FieldCatalog) -> Result<Self> {
        sink.open_table(table)?;
        let trace = TraceColumns {
            name: sink.add_column("TRACE_NAME", 8)?,
            bases: sink.add_column("BASES", 8)?,
            peak_index: sink.add_integer_column("PEAK_INDEX", 32)?,
            confidence: sink.add_integer_column("CONFIDENCE", 8)?,
            samples: sink.add_integer_column("SAMPLES", 64)?,
            clip_quality_left: sink.add_integer_column("CLIP_QUALITY_LEFT", 32)?,
            clip_quality_right: sink.add_integer_column("CLIP_QUALITY_RIGHT", 32)?,
            clip_adapter_left: sink.add_integer_column("CLIP_ADAPTER_LEFT", 32)?,
            clip_adapter_right: sink.add_integer_column("CLIP_ADAPTER_RIGHT", 32)?,
        };

        let mut dynamic: Vec<(String, ColumnId)> = Vec::new();
        for field in fields {
            // TRACE_NAME is already a fixed column; unrecognized names were
            // rejected by the validator before export.
            if field.eq_ignore_ascii_case("TRACE_NAME") || !catalog.contains(field) {
                continue;
            }
            let descriptor = catalog.get(field).map(|entry| entry.column_bits).unwrap_or(8);
            let column = sink.add_column(field, descriptor)?;
            sink.set_column_default(column, ColumnData::Text(""))?;
            dynamic.push((field.to_ascii_uppercase(), column));
        }

        Ok(FieldAdapter { sink, trace, dynamic })
    }

    /// Writes one validated row and its decoded trace.
    pub fn write_row(&mut self, row: &ManifestRow, bundle: &TraceBundle) -> Result<()> {
        bundle.check()?;
        let record = &bundle.record;

        self.sink
            .write(self.trace.name, ColumnData::Text(row.get("TRACE_NAME").unwrap_or("")))?;
        self.sink.write(self.trace.bases, ColumnData::Bytes(bundle.effective_bases()))?;
        self.sink
            .write(self.trace.peak_index, ColumnData::U32(bundle.effective_peak_index()))?;
        self.sink
            .write(self.trace.confidence, ColumnData::U8(bundle.effective_confidence()))?;

        let samples = record.sample_combined()?;
        self.sink.write(self.trace.samples, ColumnData::U64(&samples))?;

        self.sink
            .write(self.trace.clip_quality_left, ColumnData::U32(&[record.clip_quality_left]))?;
        self.sink
            .write(self.trace.clip_quality_right, ColumnData::U32(&[record.clip_quality_right]))?;
        self.sink
            .write(self.trace.clip_adapter_left, ColumnData::U32(&[record.clip_adapter_left]))?;
        self.sink
            .write(self.trace.clip_adapter_right, ColumnData::U32(&[record.clip_adapter_right]))?;

        for (field, column) in self.dynamic.iter() {
            if let Some(value) = row.get(field) {
                self.sink.write(*column, ColumnData::Text(value))?;
            }
        }
        self.sink.next_row()?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}
