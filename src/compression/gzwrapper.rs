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

//! gzip helpers for compressed trace files.
//!
//! Compressed inputs are inflated into one owned buffer before decoding;
//! uncompressed inputs stay memory-mapped.

use std::io::Read;
use std::io::Write;

use crate::error::{Result, TrlError};

/// gzip signature check.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Inflates a gzip stream into memory.
pub fn inflate_gz(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    decoder
        .read_to_end(&mut out)
        .map_err(|err| TrlError::Format(format!("gzip stream: {err}")))?;
    Ok(out)
}

/// Deflates bytes into a gzip stream.
pub fn deflate_gz(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn gz_round_trip() {
        use super::{deflate_gz, inflate_gz, is_gzip};

        let data = b"binary trace payload".to_vec();
        let deflated = deflate_gz(&data).unwrap();

        assert!(is_gzip(&deflated));
        assert!(!is_gzip(&data));

        let got = inflate_gz(&deflated).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        use super::{deflate_gz, inflate_gz};

        let deflated = deflate_gz(b"some longer payload for the stream").unwrap();
        assert!(inflate_gz(&deflated[0..deflated.len() / 2]).is_err());
    }
}
