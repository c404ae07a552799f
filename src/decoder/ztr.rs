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

//! ZTR trace decoder.
//!
//! A ZTR file is a magic block followed by typed chunks. Every chunk data
//! blob passes through [crate::compression::uncompress] before its type
//! handler runs, so any transform chain the writer chose is transparent
//! here. Chunks are handled in file order; BPOS and CNF4 depend on BASE
//! having been seen first.

use crate::bytes::{u32_be, ByteReader};
use crate::compression::uncompress;
use crate::error::{Result, TrlError};
use crate::record::{distribute_confidence, normalize_base, TraceOverrides, TraceRecord};

/// File signature, followed by one-byte major and minor version numbers.
pub const MAGIC: &[u8] = b"\xaeZTR\r\n\x1a\n";

const SUPPORTED_MAJOR: u8 = 1;

/// One chunk, data still in its on-disk transformed form.
struct Chunk {
    kind: [u8; 4],
    meta: Vec<u8>,
    data: Vec<u8>,
}

fn read_chunks(bytes: &[u8]) -> Result<Vec<Chunk>> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[0..MAGIC.len()] != MAGIC {
        return Err(TrlError::Format("missing ztr magic".to_string()));
    }
    let major = bytes[MAGIC.len()];
    if major != SUPPORTED_MAJOR {
        return Err(TrlError::Format(format!("unsupported ztr major version {major}")));
    }

    let mut reader = ByteReader::at(bytes, MAGIC.len() + 2);
    let mut chunks: Vec<Chunk> = Vec::new();
    while reader.remaining() > 0 {
        let kind_raw = reader.take(4)?;
        let mut kind = [0_u8; 4];
        kind.copy_from_slice(kind_raw);
        let meta_len = reader.read_u32_be()? as usize;
        let meta = reader.take(meta_len)?.to_vec();
        let data_len = reader.read_u32_be()? as usize;
        let data = reader.take(data_len)?.to_vec();
        chunks.push(Chunk { kind, meta, data });
    }
    Ok(chunks)
}

/// Splits a raw sample blob into big-endian u16 values.
///
/// Layout after decompression: format byte, one padding byte, then the
/// values.
fn sample_values(blob: &[u8]) -> Result<Vec<u16>> {
    if blob.len() < 2 || (blob.len() - 2) % 2 != 0 {
        return Err(TrlError::Format(format!("malformed sample chunk of {} bytes", blob.len())));
    }
    Ok(blob[2..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// SMP4: all four channels in one blob, A C G T order.
fn decode_smp4(blob: &[u8], record: &mut TraceRecord) -> Result<()> {
    let values = sample_values(blob)?;
    if values.len() % 4 != 0 {
        return Err(TrlError::Format(format!(
            "smp4 holds {} values, not a multiple of four",
            values.len()
        )));
    }
    let n = values.len() / 4;
    record.samples_a = values[0..n].to_vec();
    record.samples_c = values[n..2 * n].to_vec();
    record.samples_g = values[2 * n..3 * n].to_vec();
    record.samples_t = values[3 * n..].to_vec();
    Ok(())
}

/// SAMP: one channel, named by the chunk metadata.
fn decode_samp(meta: &[u8], blob: &[u8], record: &mut TraceRecord) -> Result<()> {
    let name = meta.iter().find(|byte| !byte.is_ascii_whitespace() && **byte != 0).copied();
    let values = sample_values(blob)?;
    match name.map(|byte| byte.to_ascii_lowercase()) {
        Some(b'a') => record.samples_a = values,
        Some(b'c') => record.samples_c = values,
        Some(b'g') => record.samples_g = values,
        Some(b't') => record.samples_t = values,
        _ => {
            return Err(TrlError::Format(format!(
                "samp chunk names no channel in metadata {:?}",
                String::from_utf8_lossy(meta)
            )));
        },
    }
    Ok(())
}

/// TEXT: NUL-delimited identifier/value pairs after the format byte.
fn decode_text(blob: &[u8], record: &mut TraceRecord) {
    let mut fields = blob[1..].split(|byte| *byte == 0);
    while let (Some(ident), Some(value)) = (fields.next(), fields.next()) {
        if ident.is_empty() {
            break;
        }
        record.push_comment(&String::from_utf8_lossy(ident), &String::from_utf8_lossy(value));
    }
}

/// CLIP: one byte of padding, then the left and right clip points.
fn decode_clip(blob: &[u8], record: &mut TraceRecord) -> Result<()> {
    record.clip_quality_left = u32_be(blob, 1)?;
    record.clip_quality_right = u32_be(blob, 5)?;
    Ok(())
}

pub fn decode_ztr(bytes: &[u8], overrides: &TraceOverrides) -> Result<TraceRecord> {
    let chunks = read_chunks(bytes)?;
    let mut record = TraceRecord::default();

    for chunk in chunks.iter() {
        let blob = uncompress(&chunk.data)?;
        match &chunk.kind {
            b"SMP4" => decode_smp4(&blob, &mut record)?,
            b"SAMP" => decode_samp(&chunk.meta, &blob, &mut record)?,
            b"BASE" => {
                record.bases = blob[1..].iter().map(|raw| normalize_base(*raw)).collect();
            },
            b"BPOS" => {
                // Format byte plus three padding bytes, then one u32 per base.
                if blob.len() < 4 || (blob.len() - 4) % 4 != 0 {
                    return Err(TrlError::Format(format!(
                        "malformed bpos chunk of {} bytes",
                        blob.len()
                    )));
                }
                let mut reader = ByteReader::at(&blob, 4);
                let peaks = reader.read_u32_be_array((blob.len() - 4) / 4)?;
                if peaks.len() != record.bases.len() {
                    return Err(TrlError::Format(format!(
                        "{} peak positions for {} bases",
                        peaks.len(),
                        record.bases.len()
                    )));
                }
                record.peak_index = peaks;
            },
            b"CNF4" => {
                // Called-base confidences first, the three unused channels
                // after them.
                let n = record.bases.len();
                if n == 0 {
                    return Err(TrlError::Format("cnf4 chunk before base chunk".to_string()));
                }
                if blob.len() < 1 + 4 * n {
                    return Err(TrlError::Format(format!(
                        "cnf4 holds {} bytes for {} bases",
                        blob.len() - 1,
                        n
                    )));
                }
                record.confidence = distribute_confidence(&record.bases, &blob[1..1 + n]);
                record.valid_scores = true;
            },
            b"CNF1" => {
                let n = record.bases.len();
                if n == 0 {
                    return Err(TrlError::Format("cnf1 chunk before base chunk".to_string()));
                }
                if blob.len() < 1 + n {
                    return Err(TrlError::Format(format!(
                        "cnf1 holds {} bytes for {} bases",
                        blob.len() - 1,
                        n
                    )));
                }
                record.confidence = blob[1..1 + n].to_vec();
                record.valid_scores = true;
            },
            b"TEXT" => decode_text(&blob, &mut record),
            b"CLIP" => decode_clip(&blob, &mut record)?,
            // Unknown chunk types pass through untouched.
            _ => {},
        }
    }

    check_complete(&record, overrides)?;
    Ok(record)
}

/// A usable trace needs samples, basecalls, peak positions, and confidence;
/// manifest overrides stand in for everything except the samples.
fn check_complete(record: &TraceRecord, overrides: &TraceOverrides) -> Result<()> {
    let mut missing: Vec<&str> = Vec::new();
    if record.samples_a.is_empty()
        && record.samples_c.is_empty()
        && record.samples_g.is_empty()
        && record.samples_t.is_empty()
    {
        missing.push("samples");
    }
    if record.bases.is_empty() && overrides.bases.is_none() {
        missing.push("bases");
    }
    if record.peak_index.is_empty() && overrides.peak_index.is_none() {
        missing.push("peak positions");
    }
    if !record.valid_scores && overrides.confidence.is_none() {
        missing.push("confidence");
    }
    if !missing.is_empty() {
        return Err(TrlError::Format(format!("ztr file is missing {}", missing.join(", "))));
    }
    Ok(())
}

// Tests
#[cfg(test)]
mod tests {

    fn chunk(kind: &[u8; 4], meta: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        out.extend(kind);
        out.extend((meta.len() as u32).to_be_bytes());
        out.extend(meta);
        out.extend((data.len() as u32).to_be_bytes());
        out.extend(data);
        out
    }

    fn file(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out: Vec<u8> = super::MAGIC.to_vec();
        out.push(1);
        out.push(2);
        for chunk in chunks {
            out.extend(chunk);
        }
        out
    }

    fn smp4_data(channels: &[&[u16]; 4]) -> Vec<u8> {
        let mut data: Vec<u8> = vec![0, 0];
        for channel in channels {
            data.extend(channel.iter().flat_map(|value| value.to_be_bytes()));
        }
        data
    }

    fn bpos_data(peaks: &[u32]) -> Vec<u8> {
        let mut data: Vec<u8> = vec![0, 0, 0, 0];
        data.extend(peaks.iter().flat_map(|peak| peak.to_be_bytes()));
        data
    }

    fn full_fixture() -> Vec<u8> {
        let mut cnf4: Vec<u8> = vec![0];
        cnf4.extend([40, 41, 42]);
        cnf4.extend(vec![7_u8; 9]);

        file(&[
            chunk(b"SMP4", b"", &smp4_data(&[&[1, 2], &[3, 4], &[5, 6], &[7, 8]])),
            chunk(b"BASE", b"", b"\x00AcX"),
            chunk(b"BPOS", b"", &bpos_data(&[0, 1, 1])),
            chunk(b"CNF4", b"", &cnf4),
            chunk(b"TEXT", b"", b"\x00MACH\x00ABI3730\x00DATE\x002004-01-02\x00\x00"),
            chunk(b"CLIP", b"", &{
                let mut data: Vec<u8> = vec![0];
                data.extend(2_u32.to_be_bytes());
                data.extend(3_u32.to_be_bytes());
                data
            }),
        ])
    }

    #[test]
    fn full_file_decodes() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        let record = decode_ztr(&full_fixture(), &TraceOverrides::default()).unwrap();
        record.check().unwrap();

        assert_eq!(record.samples_a, vec![1, 2]);
        assert_eq!(record.samples_t, vec![7, 8]);
        assert_eq!(record.bases, b"acn".to_vec());
        assert_eq!(record.peak_index, vec![0, 1, 1]);
        assert_eq!(record.confidence, vec![40, 41, 0]);
        assert!(record.valid_scores);
        assert_eq!(record.clip_quality_left, 2);
        assert_eq!(record.clip_quality_right, 3);
        assert!(record.comments.contains("MACH = ABI3730\n"));
        assert!(record.comments.contains("DATE = 2004-01-02\n"));
    }

    #[test]
    fn compressed_chunks_are_inflated_before_dispatch() {
        use super::decode_ztr;
        use crate::compression::{delta, zlib, RAW};
        use crate::record::TraceOverrides;

        let mut cnf4: Vec<u8> = vec![0];
        cnf4.extend([30, 31]);
        cnf4.extend(vec![0_u8; 6]);

        // Samples under a delta-then-zlib chain, the common writer choice.
        let raw = smp4_data(&[&[100, 101], &[1, 1], &[2, 2], &[3, 3]]);
        let mut inner: Vec<u8> = vec![RAW];
        inner.extend(&raw[1..]);
        let chained = zlib(&delta(&inner, 1, 1).unwrap()).unwrap();

        let data = file(&[
            chunk(b"SMP4", b"", &chained),
            chunk(b"BASE", b"", b"\x00ag"),
            chunk(b"BPOS", b"", &bpos_data(&[0, 1])),
            chunk(b"CNF4", b"", &cnf4),
        ]);

        let record = decode_ztr(&data, &TraceOverrides::default()).unwrap();
        assert_eq!(record.samples_a, vec![100, 101]);
        assert_eq!(record.samples_t, vec![3, 3]);
    }

    #[test]
    fn samp_chunks_route_by_metadata() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        fn samp(name: &[u8], values: &[u16]) -> Vec<u8> {
            let mut data: Vec<u8> = vec![0, 0];
            data.extend(values.iter().flat_map(|value| value.to_be_bytes()));
            chunk(b"SAMP", name, &data)
        }

        let data = file(&[
            samp(b"A\x00", &[9]),
            samp(b"C\x00", &[8]),
            samp(b"G\x00", &[7]),
            samp(b"T\x00", &[6]),
            chunk(b"BASE", b"", b"\x00a"),
            chunk(b"BPOS", b"", &bpos_data(&[0])),
            chunk(b"CNF1", b"", &[0, 50]),
        ]);

        let record = decode_ztr(&data, &TraceOverrides::default()).unwrap();
        assert_eq!(record.samples_a, vec![9]);
        assert_eq!(record.samples_c, vec![8]);
        assert_eq!(record.samples_g, vec![7]);
        assert_eq!(record.samples_t, vec![6]);
        assert_eq!(record.confidence, vec![50]);
    }

    #[test]
    fn missing_chunks_are_named_in_the_error() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        let data = file(&[chunk(b"SMP4", b"", &smp4_data(&[&[1], &[2], &[3], &[4]]))]);

        let err = decode_ztr(&data, &TraceOverrides::default()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("bases"));
        assert!(text.contains("peak positions"));
        assert!(text.contains("confidence"));
    }

    #[test]
    fn overrides_stand_in_for_missing_chunks() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        let data = file(&[chunk(b"SMP4", b"", &smp4_data(&[&[1], &[2], &[3], &[4]]))]);
        let overrides = TraceOverrides {
            bases: Some(b"a".to_vec()),
            confidence: Some(vec![40]),
            peak_index: Some(vec![0]),
        };

        assert!(decode_ztr(&data, &overrides).is_ok());
    }

    #[test]
    fn bpos_count_mismatch_is_an_error() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        let data = file(&[
            chunk(b"SMP4", b"", &smp4_data(&[&[1], &[2], &[3], &[4]])),
            chunk(b"BASE", b"", b"\x00acg"),
            chunk(b"BPOS", b"", &bpos_data(&[0, 1])),
            chunk(b"CNF1", b"", &[0, 1, 2, 3]),
        ]);

        assert!(decode_ztr(&data, &TraceOverrides::default()).is_err());
    }

    #[test]
    fn confidence_before_bases_is_an_error() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        let data = file(&[
            chunk(b"SMP4", b"", &smp4_data(&[&[1], &[2], &[3], &[4]])),
            chunk(b"CNF1", b"", &[0, 1]),
            chunk(b"BASE", b"", b"\x00a"),
        ]);

        assert!(decode_ztr(&data, &TraceOverrides::default()).is_err());
    }

    #[test]
    fn bad_magic_and_version_are_errors() {
        use super::decode_ztr;
        use crate::record::TraceOverrides;

        assert!(decode_ztr(b"not a ztr", &TraceOverrides::default()).is_err());

        let mut data = full_fixture();
        data[8] = 9;
        assert!(decode_ztr(&data, &TraceOverrides::default()).is_err());
    }
}
