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

// Format specific implementations
pub mod abi;
pub mod scf;
pub mod sff;
pub mod ztr;

use crate::error::{Result, TrlError};
use crate::record::TraceOverrides;
use crate::record::TraceRecord;
use crate::TraceFormat;

/// One row of the signature table: format, magic bytes, offset.
struct Magic {
    format: TraceFormat,
    bytes: &'static [u8],
    offset: usize,
}

/// Priority-ordered signature table; the first match wins.
const MAGIC_TABLE: [Magic; 5] = [
    Magic { format: TraceFormat::Ztr, bytes: ztr::MAGIC, offset: 0 },
    Magic { format: TraceFormat::Abi, bytes: b"ABIF", offset: 0 },
    Magic { format: TraceFormat::Abi, bytes: b"ABIF", offset: abi::LEGACY_EDGE },
    Magic { format: TraceFormat::Scf, bytes: b".scf", offset: 0 },
    Magic { format: TraceFormat::Sff, bytes: b".sff", offset: 0 },
];

/// Detects the trace container format from signature bytes.
///
/// Returns [TraceFormat::Unk] when nothing in the table matches.
pub fn guess_format(bytes: &[u8]) -> TraceFormat {
    for entry in MAGIC_TABLE.iter() {
        let end = entry.offset + entry.bytes.len();
        if bytes.len() >= end && &bytes[entry.offset..end] == entry.bytes {
            return entry.format.clone();
        }
    }
    TraceFormat::Unk
}

/// Decodes one trace file held in memory.
///
/// `read_name` is required for the shared multi-read SFF container and
/// ignored by the single-read formats. `overrides` stand in for in-trace
/// data where the manifest supplied external base/peak/quality files (the
/// ZTR completeness check accounts for them).
pub fn decode(
    format: &TraceFormat,
    bytes: &[u8],
    read_name: Option<&str>,
    overrides: &TraceOverrides,
) -> Result<TraceRecord> {
    let record = match format {
        TraceFormat::Abi => abi::decode_abi(bytes)?,
        TraceFormat::Scf => scf::decode_scf(bytes)?,
        TraceFormat::Ztr => ztr::decode_ztr(bytes, overrides)?,
        TraceFormat::Sff => {
            let name = read_name.ok_or_else(|| {
                TrlError::Format("sff container requires the target read name".to_string())
            })?;
            sff::decode_sff(bytes, name)?
        },
        TraceFormat::Unk => {
            return Err(TrlError::Format("unrecognized trace file format".to_string()));
        },
    };
    record.check()?;
    Ok(record)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn guess_format_by_magic() {
        use super::guess_format;
        use crate::TraceFormat;

        assert_eq!(guess_format(b".scf3.00whatever"), TraceFormat::Scf);
        assert_eq!(guess_format(b".sff\x00\x00\x00\x01rest"), TraceFormat::Sff);
        assert_eq!(guess_format(b"ABIF\x00\x65"), TraceFormat::Abi);
        assert_eq!(guess_format(b"\xaeZTR\r\n\x1a\n\x01\x02"), TraceFormat::Ztr);
        assert_eq!(guess_format(b"nothing recognizable"), TraceFormat::Unk);
        assert_eq!(guess_format(b""), TraceFormat::Unk);
    }

    #[test]
    fn guess_format_legacy_abi_padding() {
        use super::guess_format;
        use crate::TraceFormat;

        let mut data: Vec<u8> = vec![0; 128];
        data.extend(b"ABIF\x00\x65");

        assert_eq!(guess_format(&data), TraceFormat::Abi);
    }

    #[test]
    fn sff_decode_without_name_is_an_error() {
        use super::decode;
        use crate::record::TraceOverrides;
        use crate::TraceFormat;

        let got = decode(&TraceFormat::Sff, b".sff", None, &TraceOverrides::default());
        assert!(got.is_err());
    }

    #[test]
    fn unknown_format_is_an_error() {
        use super::decode;
        use crate::record::TraceOverrides;
        use crate::TraceFormat;

        let got = decode(&TraceFormat::Unk, b"....", None, &TraceOverrides::default());
        assert!(got.is_err());
    }
}
