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

//! Bounds-checked big-endian reads over a borrowed byte buffer.
//!
//! All four trace container formats store multi-byte integers in network
//! order. Every size here derives from an explicit length parameter, never
//! from a sentinel.

use crate::error::{Result, TrlError};

/// Standalone big-endian reads at an absolute offset.
pub fn u16_be(buf: &[u8], offset: usize) -> Result<u16> {
    let end = offset.checked_add(2).filter(|end| *end <= buf.len());
    match end {
        Some(end) => Ok(u16::from_be_bytes([buf[end - 2], buf[end - 1]])),
        None => Err(TrlError::truncated("u16", offset)),
    }
}

pub fn u32_be(buf: &[u8], offset: usize) -> Result<u32> {
    let end = offset.checked_add(4).filter(|end| *end <= buf.len());
    match end {
        Some(end) => {
            let mut raw = [0_u8; 4];
            raw.copy_from_slice(&buf[end - 4..end]);
            Ok(u32::from_be_bytes(raw))
        },
        None => Err(TrlError::truncated("u32", offset)),
    }
}

pub fn u64_be(buf: &[u8], offset: usize) -> Result<u64> {
    let end = offset.checked_add(8).filter(|end| *end <= buf.len());
    match end {
        Some(end) => {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(&buf[end - 8..end]);
            Ok(u64::from_be_bytes(raw))
        },
        None => Err(TrlError::truncated("u64", offset)),
    }
}

/// A cursor over a borrowed buffer with bounds-checked reads.
///
/// The decoders advance one of these through a mapped or inflated trace
/// file instead of passing mutable offsets around.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        ByteReader { buf, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(TrlError::truncated("seek target", pos));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(self.pos + n)
    }

    /// Borrows the next `n` bytes and advances past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(TrlError::truncated("byte run", self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let out = self.take(1)?;
        Ok(out[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let out = self.take(2)?;
        Ok(u16::from_be_bytes([out[0], out[1]]))
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        Ok(self.read_u16_be()? as i16)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let out = self.take(4)?;
        let mut raw = [0_u8; 4];
        raw.copy_from_slice(out);
        Ok(u32::from_be_bytes(raw))
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        Ok(self.read_u32_be()? as i32)
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        let out = self.take(8)?;
        let mut raw = [0_u8; 8];
        raw.copy_from_slice(out);
        Ok(u64::from_be_bytes(raw))
    }

    /// Reads `count` consecutive big-endian u16 values.
    pub fn read_u16_be_array(&mut self, count: usize) -> Result<Vec<u16>> {
        let raw = self.take(count * 2)?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Reads `count` consecutive big-endian u32 values.
    pub fn read_u32_be_array(&mut self, count: usize) -> Result<Vec<u32>> {
        let raw = self.take(count * 4)?;
        Ok(raw
            .chunks_exact(4)
            .map(|quad| u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]))
            .collect())
    }
}
