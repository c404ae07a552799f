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

//! ABI (ABIF container) trace decoder.
//!
//! An ABIF file is a tagged directory of entries. The four sample channels
//! live in `DATA` entries 9-12 whose channel assignment is permuted by the
//! `FWO_` filter-wheel-order tag; basecalls, peak positions, and confidence
//! come from `PBAS`/`PLOC`/`PCON`. Legacy files prepend 128 padding bytes
//! before the magic, which shifts every absolute offset.

use crate::bytes::{u32_be, ByteReader};
use crate::error::{Result, TrlError};
use crate::record::{distribute_confidence, normalize_base, TraceRecord};

/// Offset shift for files that prepend the legacy padding block.
pub const LEGACY_EDGE: usize = 128;

const ENTRY_SIZE: usize = 28;
const DIR_COUNT_OFFSET: usize = 18;
const DIR_OFFSET_OFFSET: usize = 26;

/// pString element type: first data byte is the length.
const ELEM_PSTRING: u16 = 18;
/// cString element type: NUL terminated.
const ELEM_CSTRING: u16 = 19;

/// One 28-byte directory entry.
#[derive(Clone, Debug)]
struct DirEntry {
    tag: [u8; 4],
    number: i32,
    elem_type: u16,
    data_size: u32,
    data_offset: u32,
    /// Absolute position of the offset field, which holds the value itself
    /// for entries of four bytes or less.
    inline_pos: usize,
}

struct Directory<'a> {
    bytes: &'a [u8],
    edge: usize,
    entries: Vec<DirEntry>,
}

impl<'a> Directory<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        let edge = if bytes.len() >= 4 && &bytes[0..4] == b"ABIF" { 0 } else { LEGACY_EDGE };
        if bytes.len() < edge + 4 || &bytes[edge..edge + 4] != b"ABIF" {
            return Err(TrlError::Format("missing ABIF magic".to_string()));
        }

        let count = u32_be(bytes, edge + DIR_COUNT_OFFSET)? as usize;
        let dir_offset = u32_be(bytes, edge + DIR_OFFSET_OFFSET)? as usize;

        let mut reader = ByteReader::at(bytes, dir_offset + edge);
        let mut entries: Vec<DirEntry> = Vec::with_capacity(count);
        for idx in 0..count {
            let raw = reader.take(ENTRY_SIZE)?;
            let mut entry = ByteReader::new(raw);
            let tag_bytes = entry.take(4)?;
            let mut tag = [0_u8; 4];
            tag.copy_from_slice(tag_bytes);
            let number = entry.read_i32_be()?;
            let elem_type = entry.read_u16_be()?;
            let _elem_size = entry.read_u16_be()?;
            let _n_elems = entry.read_u32_be()?;
            let data_size = entry.read_u32_be()?;
            let data_offset = entry.read_u32_be()?;
            let inline_pos = dir_offset + edge + idx * ENTRY_SIZE + 20;
            entries.push(DirEntry { tag, number, elem_type, data_size, data_offset, inline_pos });
        }

        Ok(Directory { bytes, edge, entries })
    }

    fn find(&self, tag: &[u8; 4], number: i32) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.tag == tag && entry.number == number)
    }

    /// The entry's payload bytes. Values of four bytes or less are stored
    /// inside the offset field itself; larger values are indirect.
    fn payload(&self, entry: &DirEntry) -> Result<&[u8]> {
        let size = entry.data_size as usize;
        let start = if size <= 4 { entry.inline_pos } else { entry.data_offset as usize + self.edge };
        if start + size > self.bytes.len() {
            return Err(TrlError::truncated("directory entry payload", start));
        }
        Ok(&self.bytes[start..start + size])
    }

    fn string(&self, tag: &[u8; 4], number: i32) -> Option<String> {
        let entry = self.find(tag, number)?;
        let raw = self.payload(entry).ok()?;
        let text = match entry.elem_type {
            ELEM_PSTRING if !raw.is_empty() => &raw[1..],
            ELEM_CSTRING if raw.last() == Some(&0) => &raw[..raw.len() - 1],
            _ => raw,
        };
        Some(String::from_utf8_lossy(text).trim_end_matches('\0').to_string())
    }

    fn u32_value(&self, tag: &[u8; 4], number: i32) -> Option<u32> {
        let entry = self.find(tag, number)?;
        let raw = self.payload(entry).ok()?;
        match raw.len() {
            4 => Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])),
            2 => Some(u16::from_be_bytes([raw[0], raw[1]]) as u32),
            1 => Some(raw[0] as u32),
            _ => None,
        }
    }

    fn i16_value(&self, tag: &[u8; 4], number: i32) -> Option<i16> {
        self.u32_value(tag, number).map(|value| value as u16 as i16)
    }
}

/// The channel permutation named by the `FWO_` tag.
///
/// Byte `i` of the tag names the nucleotide whose samples live in
/// `DATA` entry `9 + i`.
fn fwo_order(dir: &Directory) -> [u8; 4] {
    match dir.find(b"FWO_", 1).and_then(|entry| dir.payload(entry).ok()) {
        Some(raw) if raw.len() == 4 => {
            let mut order = [0_u8; 4];
            order
                .iter_mut()
                .zip(raw.iter())
                .for_each(|(slot, byte)| *slot = normalize_base(*byte));
            order
        },
        // Missing or malformed filter wheel order degrades to the common
        // GATC instrument default.
        _ => *b"gatc",
    }
}

fn mandatory<'a>(dir: &'a Directory, tag: &[u8; 4]) -> Result<&'a DirEntry> {
    dir.find(tag, 1)
        .ok_or_else(|| TrlError::Format(format!("mandatory ABIF tag {} missing", String::from_utf8_lossy(tag))))
}

/// Packed ABI date: year in the high 16 bits, then month and day bytes.
fn format_date(packed: u32) -> String {
    let year = (packed >> 16) & 0xffff;
    let month = (packed >> 8) & 0xff;
    let day = packed & 0xff;
    format!("{year:04}-{month:02}-{day:02}")
}

/// Packed ABI time: hour, minute, second, hundredths bytes.
fn format_time(packed: u32) -> String {
    let hour = (packed >> 24) & 0xff;
    let minute = (packed >> 16) & 0xff;
    let second = (packed >> 8) & 0xff;
    format!("{hour:02}:{minute:02}:{second:02}")
}

pub fn decode_abi(bytes: &[u8]) -> Result<TraceRecord> {
    let dir = Directory::parse(bytes)?;
    let mut record = TraceRecord::default();

    // Samples: DATA 9-12 routed through the filter wheel order.
    let order = fwo_order(&dir);
    for (slot, channel) in order.iter().enumerate() {
        let entry = dir
            .find(b"DATA", 9 + slot as i32)
            .ok_or_else(|| TrlError::Format(format!("mandatory ABIF tag DATA{} missing", 9 + slot)))?;
        let raw = dir.payload(entry)?;
        let mut reader = ByteReader::new(raw);
        let samples = reader.read_u16_be_array(raw.len() / 2)?;
        match channel {
            b'a' => record.samples_a = samples,
            b'c' => record.samples_c = samples,
            b'g' => record.samples_g = samples,
            b't' => record.samples_t = samples,
            _ => {
                return Err(TrlError::Format("FWO_ tag names an unknown channel".to_string()));
            },
        }
    }

    // Basecalls.
    let pbas = mandatory(&dir, b"PBAS")?;
    record.bases = dir.payload(pbas)?.iter().map(|raw| normalize_base(*raw)).collect();

    // Peak positions, two bytes per base.
    let ploc = mandatory(&dir, b"PLOC")?;
    let raw = dir.payload(ploc)?;
    let mut reader = ByteReader::new(raw);
    record.peak_index = reader
        .read_u16_be_array(record.bases.len())?
        .iter()
        .map(|peak| *peak as u32)
        .collect();

    // Confidence is optional; present scores are redistributed through the
    // per-channel scheme.
    if let Some(pcon) = dir.find(b"PCON", 1) {
        let scratch = dir.payload(pcon)?;
        if scratch.len() < record.bases.len() {
            return Err(TrlError::Format(format!(
                "{} confidence bytes for {} bases",
                scratch.len(),
                record.bases.len()
            )));
        }
        record.confidence = distribute_confidence(&record.bases, &scratch[..record.bases.len()]);
        record.valid_scores = true;
    }

    build_comments(&dir, &order, &mut record);

    Ok(record)
}

/// Assembles the free-text comment block from the optional tagged entries.
fn build_comments(dir: &Directory, order: &[u8; 4], record: &mut TraceRecord) {
    if let Some(text) = dir.string(b"CMNT", 1) {
        record.push_comment("COMMENT", &text);
    }
    if let Some(text) = dir.string(b"SMPL", 1) {
        record.push_comment("SAMPLE_NAME", &text);
    }
    if let Some(lane) = dir.i16_value(b"LANE", 1) {
        record.push_comment("LANE", &lane.to_string());
    }

    // Per-channel signal strength, stored in filter wheel order like the
    // DATA entries.
    if let Some(entry) = dir.find(b"S/N%", 1) {
        if let Ok(raw) = dir.payload(entry) {
            if raw.len() >= 8 {
                let mut parts: Vec<String> = Vec::with_capacity(4);
                for channel in [b'a', b'c', b'g', b't'] {
                    if let Some(slot) = order.iter().position(|name| *name == channel) {
                        let value = i16::from_be_bytes([raw[slot * 2], raw[slot * 2 + 1]]);
                        parts.push(format!("{}:{}", (channel as char).to_ascii_uppercase(), value));
                    }
                }
                record.push_comment("SIGNAL", &parts.join(","));
            }
        }
    }

    if let Some(bits) = dir.u32_value(b"SPAC", 1) {
        record.push_comment("SPACING", &format!("{:.2}", f32::from_bits(bits)));
    }
    if let Some(pos) = dir.i16_value(b"PPOS", 1) {
        record.push_comment("PRIMER_POSITION", &pos.to_string());
    }

    // Run start/stop reconstructed from the packed date and time pairs.
    if let (Some(date), Some(time)) = (dir.u32_value(b"RUND", 1), dir.u32_value(b"RUNT", 1)) {
        record.push_comment("RUN_START", &format!("{} {}", format_date(date), format_time(time)));
    }
    if let (Some(date), Some(time)) = (dir.u32_value(b"RUND", 2), dir.u32_value(b"RUNT", 2)) {
        record.push_comment("RUN_STOP", &format!("{} {}", format_date(date), format_time(time)));
    }

    if let Some(text) = dir.string(b"PDMF", 1) {
        record.push_comment("DYE_PRIMER", &text);
    }
    if let Some(text) = dir.string(b"MCHN", 1) {
        record.push_comment("MACHINE_NAME", &text);
    }
    if let Some(text) = dir.string(b"MODL", 1) {
        record.push_comment("MODEL", &text);
    }
    if let Some(text) = dir.string(b"MTXF", 1) {
        record.push_comment("MATRIX_FILE", &text);
    }
    if let Some(text) = dir.string(b"SVER", 1) {
        record.push_comment("BASECALLER_VERSION_1", &text);
    }
    if let Some(text) = dir.string(b"SVER", 2) {
        record.push_comment("BASECALLER_VERSION_2", &text);
    }
    if let Some(text) = dir.string(b"GELN", 1) {
        record.push_comment("GEL_NAME", &text);
    }
}
