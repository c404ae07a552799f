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

//! ZTR chunk transforms and gzip helpers.
//!
//! A ZTR data blob starts with a one-byte format code. Transforms chain:
//! decoding one layer yields another blob that again starts with a format
//! code, and [uncompress] keeps re-dispatching until it observes [RAW].
//! The run-length and zlib payloads contain the complete inner blob; the
//! recorrelation, expansion, follow, and Chebyshev codecs emit `RAW` plus
//! their decoded data.
//!
//! Encoding counterparts exist for every transform so chained fixtures can
//! be built in tests and by other tooling.

pub mod gzwrapper;

use crate::error::{Result, TrlError};

/// Uncompressed data follows this byte directly.
pub const RAW: u8 = 0;
/// Run-length encoding with an explicit guard byte.
pub const RLE: u8 = 1;
/// zlib/deflate stream.
pub const ZLIB: u8 = 2;
/// Running-sum recorrelation at 1-byte granularity.
pub const DELTA1: u8 = 64;
/// Recorrelation over big-endian u16 values.
pub const DELTA2: u8 = 65;
/// Recorrelation over big-endian u32 values.
pub const DELTA4: u8 = 66;
/// Sign-extension expansion of 8-bit deltas to 16-bit values.
pub const X8TO16: u8 = 70;
/// Sign-extension expansion of 8-bit deltas to 32-bit values.
pub const X8TO32: u8 = 71;
/// Predictive decode through a 256-entry follower table.
pub const FOLLOW1: u8 = 72;
/// Integer Chebyshev-style polynomial predictor over u16 values.
pub const ICHEB: u8 = 74;

/// Upper bound on chained transforms.
///
/// The chain in a well-formed file is at most a handful deep; a corrupt
/// file must not be able to keep the loop spinning.
pub const MAX_CHAIN: usize = 32;

/// Escape byte the 8-to-16/8-to-32 expansions use for out-of-range values.
const EXPAND_ESCAPE: i8 = -128;

/// Decodes a chunk data blob down to its raw form.
///
/// The returned buffer still starts with the [RAW] format byte; chunk
/// decoders address their payloads relative to it.
pub fn uncompress(blob: &[u8]) -> Result<Vec<u8>> {
    if blob.is_empty() {
        return Err(TrlError::Format("empty chunk data blob".to_string()));
    }
    let mut data = blob.to_vec();
    let mut rounds = 0_usize;
    while data[0] != RAW {
        if rounds == MAX_CHAIN {
            return Err(TrlError::Format(format!(
                "transform chain did not terminate after {MAX_CHAIN} rounds"
            )));
        }
        data = match data[0] {
            RLE => unrle(&data)?,
            ZLIB => unzlib(&data)?,
            DELTA1 => undelta(&data, 1)?,
            DELTA2 => undelta(&data, 2)?,
            DELTA4 => undelta(&data, 4)?,
            X8TO16 => unexpand(&data, 2)?,
            X8TO32 => unexpand(&data, 4)?,
            FOLLOW1 => unfollow(&data)?,
            ICHEB => unicheb(&data)?,
            other => {
                return Err(TrlError::Format(format!("unknown transform code {other}")));
            },
        };
        if data.is_empty() {
            return Err(TrlError::Format("transform produced an empty blob".to_string()));
        }
        rounds += 1;
    }
    Ok(data)
}

fn declared_len(blob: &[u8]) -> Result<usize> {
    crate::bytes::u32_be(blob, 1).map(|len| len as usize)
}

/// Run-length decode. Layout: code, u32 inner length, guard byte, payload.
///
/// In the payload, `guard count value` expands to `count` copies of `value`
/// and `guard 0` is a literal guard byte; everything else passes through.
pub fn unrle(blob: &[u8]) -> Result<Vec<u8>> {
    let expected = declared_len(blob)?;
    if blob.len() < 6 {
        return Err(TrlError::truncated("rle header", blob.len()));
    }
    let guard = blob[5];
    let payload = &blob[6..];

    let mut out: Vec<u8> = Vec::with_capacity(expected);
    let mut idx = 0_usize;
    while idx < payload.len() {
        if payload[idx] == guard {
            let count = *payload
                .get(idx + 1)
                .ok_or_else(|| TrlError::truncated("rle run length", idx))?;
            if count == 0 {
                out.push(guard);
                idx += 2;
            } else {
                let value = *payload
                    .get(idx + 2)
                    .ok_or_else(|| TrlError::truncated("rle run value", idx))?;
                out.extend(std::iter::repeat(value).take(count as usize));
                idx += 3;
            }
        } else {
            out.push(payload[idx]);
            idx += 1;
        }
    }

    if out.len() != expected {
        return Err(TrlError::Format(format!(
            "rle declared {expected} bytes but produced {}",
            out.len()
        )));
    }
    Ok(out)
}

/// Run-length encode of a complete inner blob.
pub fn rle(inner: &[u8], guard: u8) -> Vec<u8> {
    let mut out: Vec<u8> = vec![RLE];
    out.extend((inner.len() as u32).to_be_bytes());
    out.push(guard);

    let mut idx = 0_usize;
    while idx < inner.len() {
        let value = inner[idx];
        let mut run = 1_usize;
        while idx + run < inner.len() && inner[idx + run] == value && run < 255 {
            run += 1;
        }
        if run >= 4 {
            out.push(guard);
            out.push(run as u8);
            out.push(value);
            idx += run;
        } else if value == guard {
            out.push(guard);
            out.push(0);
            idx += 1;
        } else {
            out.push(value);
            idx += 1;
        }
    }
    out
}

/// zlib decode. Layout: code, u32 inner length, deflate stream.
pub fn unzlib(blob: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let expected = declared_len(blob)?;
    if blob.len() < 5 {
        return Err(TrlError::truncated("zlib header", blob.len()));
    }
    let mut out: Vec<u8> = Vec::with_capacity(expected);
    let mut decoder = flate2::read::ZlibDecoder::new(&blob[5..]);
    decoder
        .read_to_end(&mut out)
        .map_err(|err| TrlError::Format(format!("zlib stream: {err}")))?;
    if out.len() != expected {
        return Err(TrlError::Format(format!(
            "zlib declared {expected} bytes but produced {}",
            out.len()
        )));
    }
    Ok(out)
}

/// zlib encode of a complete inner blob.
pub fn zlib(inner: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut out: Vec<u8> = vec![ZLIB];
    out.extend((inner.len() as u32).to_be_bytes());
    let mut encoder = flate2::write::ZlibEncoder::new(&mut out, flate2::Compression::default());
    encoder.write_all(inner)?;
    encoder.finish()?;
    Ok(out)
}

/// Recorrelation decode. Layout: code, level byte (1-3), payload.
///
/// Decoding is a running cumulative sum over the payload, repeated `level`
/// times, at the element width the code names.
pub fn undelta(blob: &[u8], width: usize) -> Result<Vec<u8>> {
    if blob.len() < 2 {
        return Err(TrlError::truncated("delta header", blob.len()));
    }
    let level = blob[1];
    if !(1..=3).contains(&level) {
        return Err(TrlError::Format(format!("delta level {level} out of range")));
    }
    let payload = &blob[2..];
    if payload.len() % width != 0 {
        return Err(TrlError::Format(format!(
            "delta payload of {} bytes is not a multiple of {width}",
            payload.len()
        )));
    }

    let mut values: Vec<u32> = payload
        .chunks_exact(width)
        .map(|chunk| chunk.iter().fold(0_u32, |acc, byte| (acc << 8) | *byte as u32))
        .collect();
    let mask: u64 = if width == 4 { u32::MAX as u64 } else { (1_u64 << (8 * width)) - 1 };

    for _ in 0..level {
        let mut running = 0_u64;
        values.iter_mut().for_each(|value| {
            running = (running + *value as u64) & mask;
            *value = running as u32;
        });
    }

    let mut out: Vec<u8> = Vec::with_capacity(1 + payload.len());
    out.push(RAW);
    values
        .iter()
        .for_each(|value| out.extend(&value.to_be_bytes()[4 - width..]));
    Ok(out)
}

/// Recorrelation encode of a raw blob (`RAW` + data).
pub fn delta(raw: &[u8], width: usize, level: u8) -> Result<Vec<u8>> {
    let payload = &raw[1..];
    if payload.len() % width != 0 {
        return Err(TrlError::Format(format!(
            "delta payload of {} bytes is not a multiple of {width}",
            payload.len()
        )));
    }
    let code = match width {
        1 => DELTA1,
        2 => DELTA2,
        4 => DELTA4,
        _ => return Err(TrlError::Format(format!("unsupported delta width {width}"))),
    };

    let mut values: Vec<u32> = payload
        .chunks_exact(width)
        .map(|chunk| chunk.iter().fold(0_u32, |acc, byte| (acc << 8) | *byte as u32))
        .collect();
    let mask: u64 = if width == 4 { u32::MAX as u64 } else { (1_u64 << (8 * width)) - 1 };

    for _ in 0..level {
        let mut previous = 0_u64;
        values.iter_mut().for_each(|value| {
            let current = *value as u64;
            *value = (current.wrapping_sub(previous) & mask) as u32;
            previous = current;
        });
    }

    let mut out: Vec<u8> = vec![code, level];
    values
        .iter()
        .for_each(|value| out.extend(&value.to_be_bytes()[4 - width..]));
    Ok(out)
}

/// Sign-extension expansion decode for the 8-to-16 and 8-to-32 codes.
///
/// Single payload bytes are sign-extended; the escape byte -128 introduces
/// one full-width big-endian value stored verbatim.
pub fn unexpand(blob: &[u8], width: usize) -> Result<Vec<u8>> {
    let payload = &blob[1..];
    let mut out: Vec<u8> = vec![RAW];
    let mut idx = 0_usize;
    while idx < payload.len() {
        let byte = payload[idx] as i8;
        if byte == EXPAND_ESCAPE {
            if idx + 1 + width > payload.len() {
                return Err(TrlError::truncated("expansion escape value", idx));
            }
            out.extend(&payload[idx + 1..idx + 1 + width]);
            idx += 1 + width;
        } else {
            let value = byte as i32;
            out.extend(&value.to_be_bytes()[4 - width..]);
            idx += 1;
        }
    }
    Ok(out)
}

/// Expansion encode of a raw blob of full-width big-endian values.
pub fn expand(raw: &[u8], width: usize) -> Result<Vec<u8>> {
    let payload = &raw[1..];
    if payload.len() % width != 0 {
        return Err(TrlError::Format(format!(
            "expansion payload of {} bytes is not a multiple of {width}",
            payload.len()
        )));
    }
    let code = match width {
        2 => X8TO16,
        4 => X8TO32,
        _ => return Err(TrlError::Format(format!("unsupported expansion width {width}"))),
    };

    let mut out: Vec<u8> = vec![code];
    payload.chunks_exact(width).for_each(|chunk| {
        let value = chunk.iter().fold(0_i64, |acc, byte| (acc << 8) | *byte as i64);
        let value = if width == 2 { value as i16 as i64 } else { value as i32 as i64 };
        if value > EXPAND_ESCAPE as i64 && value <= i8::MAX as i64 {
            out.push(value as i8 as u8);
        } else {
            out.push(EXPAND_ESCAPE as u8);
            out.extend(chunk);
        }
    });
    Ok(out)
}

/// Follower-table decode. Layout: code, 256-byte table, first byte verbatim,
/// then differences from the table's prediction.
pub fn unfollow(blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < 257 {
        return Err(TrlError::truncated("follow table", blob.len()));
    }
    let table = &blob[1..257];
    let payload = &blob[257..];

    let mut out: Vec<u8> = vec![RAW];
    if payload.is_empty() {
        return Ok(out);
    }
    let mut previous = payload[0];
    out.push(previous);
    payload[1..].iter().for_each(|diff| {
        let value = diff.wrapping_add(table[previous as usize]);
        out.push(value);
        previous = value;
    });
    Ok(out)
}

/// Follower-table encode of a raw blob.
pub fn follow(raw: &[u8]) -> Vec<u8> {
    let payload = &raw[1..];

    // Most frequent follower per byte value.
    let mut counts = vec![[0_u32; 256]; 256];
    payload.windows(2).for_each(|pair| {
        counts[pair[0] as usize][pair[1] as usize] += 1;
    });
    let table: Vec<u8> = counts
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by_key(|(_, count)| **count)
                .map(|(value, _)| value as u8)
                .unwrap_or(0)
        })
        .collect();

    let mut out: Vec<u8> = vec![FOLLOW1];
    out.extend(&table);
    if payload.is_empty() {
        return out;
    }
    out.push(payload[0]);
    payload.windows(2).for_each(|pair| {
        out.push(pair[1].wrapping_sub(table[pair[0] as usize]));
    });
    out
}

/// Predicts the next u16 from the last four via integer polynomial
/// extrapolation (coefficients -1, 4, -6, 4).
fn cheb_predict(history: &[u16; 4]) -> u16 {
    let p0 = history[0] as i64;
    let p1 = history[1] as i64;
    let p2 = history[2] as i64;
    let p3 = history[3] as i64;
    (4 * p3 - 6 * p2 + 4 * p1 - p0) as u16
}

/// Chebyshev-predictor decode over big-endian u16 values. The first four
/// values are verbatim; the rest are wrapping differences from prediction.
pub fn unicheb(blob: &[u8]) -> Result<Vec<u8>> {
    let payload = &blob[1..];
    if payload.len() % 2 != 0 {
        return Err(TrlError::Format(format!(
            "predictor payload of {} bytes is not a multiple of 2",
            payload.len()
        )));
    }
    let words: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let mut out: Vec<u8> = vec![RAW];
    let mut history = [0_u16; 4];
    words.iter().enumerate().for_each(|(idx, word)| {
        let value = if idx < 4 { *word } else { word.wrapping_add(cheb_predict(&history)) };
        out.extend(value.to_be_bytes());
        history.rotate_left(1);
        history[3] = value;
    });
    Ok(out)
}

/// Chebyshev-predictor encode of a raw blob of big-endian u16 values.
pub fn icheb(raw: &[u8]) -> Result<Vec<u8>> {
    let payload = &raw[1..];
    if payload.len() % 2 != 0 {
        return Err(TrlError::Format(format!(
            "predictor payload of {} bytes is not a multiple of 2",
            payload.len()
        )));
    }
    let words: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let mut out: Vec<u8> = vec![ICHEB];
    let mut history = [0_u16; 4];
    words.iter().enumerate().for_each(|(idx, word)| {
        let stored = if idx < 4 { *word } else { word.wrapping_sub(cheb_predict(&history)) };
        out.extend(stored.to_be_bytes());
        history.rotate_left(1);
        history[3] = *word;
    });
    Ok(out)
}
