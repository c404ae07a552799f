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

//! SCF trace decoder.
//!
//! SCF is the one format family whose layout changed across versions:
//! files before 2.9 interleave the four channels per sample point and pack
//! each base into a 12-byte record, while 2.9 and later store each channel
//! sequentially with double-integration delta coding and split the base
//! section into parallel arrays.

use bincode::decode_from_slice;
use bincode::Decode;

use crate::bytes::ByteReader;
use crate::error::{Result, TrlError};
use crate::record::{normalize_base, TraceRecord};

pub const HEADER_SIZE: usize = 160;

/// The 160-byte fixed file header, all fields big endian.
#[derive(Decode)]
struct ScfHeader {
    magic: [u8; 4],
    samples: u32,
    samples_offset: u32,
    bases: u32,
    bases_left_clip: u32,
    bases_right_clip: u32,
    bases_offset: u32,
    comments_size: u32,
    comments_offset: u32,
    version: [u8; 4],
    sample_size: u32,
    code_set: u32,
    private_size: u32,
    private_offset: u32,
    spare: [u32; 26],
}

fn decode_header(bytes: &[u8]) -> Result<ScfHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(TrlError::truncated("scf header", bytes.len()));
    }
    let header: ScfHeader = decode_from_slice(
        &bytes[0..HEADER_SIZE],
        bincode::config::standard().with_big_endian().with_fixed_int_encoding(),
    )
    .map_err(|err| TrlError::Format(format!("scf header: {err}")))?
    .0;
    if &header.magic != b".scf" {
        return Err(TrlError::Format("missing .scf magic".to_string()));
    }
    Ok(header)
}

/// Version field is ASCII, e.g. `3.00`.
fn parse_version(raw: &[u8; 4]) -> Result<f32> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.trim().parse::<f32>().ok())
        .ok_or_else(|| {
            TrlError::Format(format!("unparseable scf version {:?}", String::from_utf8_lossy(raw)))
        })
}

/// Reads one sample value at the header's declared width.
fn read_sample(reader: &mut ByteReader, sample_size: u32) -> Result<u16> {
    match sample_size {
        1 => Ok(reader.read_u8()? as u16),
        2 => reader.read_u16_be(),
        _ => Err(TrlError::Format(format!("unsupported scf sample size {sample_size}"))),
    }
}

/// Undoes the double-integration delta coding of one sequential channel.
///
/// The encoder applied first differences twice, so decoding integrates
/// twice, wrapping at the element width.
fn undelta_channel(reader: &mut ByteReader, n: usize, sample_size: u32) -> Result<Vec<u16>> {
    let mask: u16 = if sample_size == 1 { 0xff } else { 0xffff };
    let mut p_sample1: u16 = 0;
    let mut p_sample2: u16 = 0;
    let mut out: Vec<u16> = Vec::with_capacity(n);
    for _ in 0..n {
        let value = read_sample(reader, sample_size)?;
        p_sample1 = p_sample1.wrapping_add(value) & mask;
        p_sample2 = p_sample2.wrapping_add(p_sample1) & mask;
        out.push(p_sample2);
    }
    Ok(out)
}

fn decode_samples(bytes: &[u8], header: &ScfHeader, version: f32, record: &mut TraceRecord) -> Result<()> {
    let n = header.samples as usize;
    let mut reader = ByteReader::at(bytes, header.samples_offset as usize);

    if version < 2.9 {
        record.samples_a = Vec::with_capacity(n);
        record.samples_c = Vec::with_capacity(n);
        record.samples_g = Vec::with_capacity(n);
        record.samples_t = Vec::with_capacity(n);
        for _ in 0..n {
            record.samples_a.push(read_sample(&mut reader, header.sample_size)?);
            record.samples_c.push(read_sample(&mut reader, header.sample_size)?);
            record.samples_g.push(read_sample(&mut reader, header.sample_size)?);
            record.samples_t.push(read_sample(&mut reader, header.sample_size)?);
        }
    } else {
        record.samples_a = undelta_channel(&mut reader, n, header.sample_size)?;
        record.samples_c = undelta_channel(&mut reader, n, header.sample_size)?;
        record.samples_g = undelta_channel(&mut reader, n, header.sample_size)?;
        record.samples_t = undelta_channel(&mut reader, n, header.sample_size)?;
    }
    Ok(())
}

/// Confidence of one base is the probability of its called channel.
fn called_confidence(base: u8, probs: [u8; 4]) -> u8 {
    match base {
        b'a' => probs[0],
        b'c' => probs[1],
        b'g' => probs[2],
        b't' => probs[3],
        _ => 0,
    }
}

fn decode_bases(bytes: &[u8], header: &ScfHeader, version: f32, record: &mut TraceRecord) -> Result<()> {
    let n = header.bases as usize;
    let mut reader = ByteReader::at(bytes, header.bases_offset as usize);

    record.bases = Vec::with_capacity(n);
    record.peak_index = Vec::with_capacity(n);
    record.confidence = Vec::with_capacity(n);

    if version < 2.9 {
        // 12 bytes per base: peak, four probabilities, base, three spare.
        for _ in 0..n {
            let peak = reader.read_u32_be()?;
            let prob_a = reader.read_u8()?;
            let prob_c = reader.read_u8()?;
            let prob_g = reader.read_u8()?;
            let prob_t = reader.read_u8()?;
            let base = normalize_base(reader.read_u8()?);
            reader.skip(3)?;
            record.peak_index.push(peak);
            record.bases.push(base);
            record.confidence.push(called_confidence(base, [prob_a, prob_c, prob_g, prob_t]));
        }
    } else {
        // Parallel arrays: peaks, four probability rows, then the calls.
        // The trailing substitution/insertion/deletion rows of v3 files are
        // not carried into the record.
        let peaks = reader.read_u32_be_array(n)?;
        let prob_a = reader.take(n)?.to_vec();
        let prob_c = reader.take(n)?.to_vec();
        let prob_g = reader.take(n)?.to_vec();
        let prob_t = reader.take(n)?.to_vec();
        let calls = reader.take(n)?.to_vec();
        for idx in 0..n {
            let base = normalize_base(calls[idx]);
            record.peak_index.push(peaks[idx]);
            record.bases.push(base);
            record
                .confidence
                .push(called_confidence(base, [prob_a[idx], prob_c[idx], prob_g[idx], prob_t[idx]]));
        }
    }
    record.valid_scores = true;
    Ok(())
}

pub fn decode_scf(bytes: &[u8]) -> Result<TraceRecord> {
    let header = decode_header(bytes)?;
    let version = parse_version(&header.version)?;
    let _ = (header.code_set, header.spare);

    let mut record = TraceRecord::default();
    decode_samples(bytes, &header, version, &mut record)?;
    decode_bases(bytes, &header, version, &mut record)?;

    record.clip_quality_left = header.bases_left_clip;
    record.clip_quality_right = header.bases_right_clip;

    if header.comments_size > 0 {
        let mut reader = ByteReader::at(bytes, header.comments_offset as usize);
        let raw = reader.take(header.comments_size as usize)?;
        record.comments = String::from_utf8_lossy(raw).trim_end_matches('\0').to_string();
    }
    if header.private_size > 0 {
        let mut reader = ByteReader::at(bytes, header.private_offset as usize);
        record.private_data = reader.take(header.private_size as usize)?.to_vec();
    }

    Ok(record)
}
