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

//! SFF flowgram container decoder.
//!
//! Unlike the other formats an SFF file holds many reads, so decoding takes
//! the name of the read to extract and scans the read blocks in file order.
//! Flowgram values become the sample channels: each flow lights up exactly
//! the channel its flow character names, the other three stay at zero for
//! that position.

use bincode::decode_from_slice;
use bincode::Decode;

use crate::bytes::ByteReader;
use crate::error::{Result, TrlError};
use crate::record::{distribute_confidence, normalize_base, TraceRecord};

const COMMON_HEADER_SIZE: usize = 31;
const READ_HEADER_SIZE: usize = 16;
const SFF_MAGIC: u32 = 0x2e73_6666;

/// The 31-byte common header, all fields big endian.
#[derive(Decode)]
struct CommonHeader {
    magic: u32,
    version: [u8; 4],
    index_offset: u64,
    index_length: u32,
    n_reads: u32,
    header_length: u16,
    key_length: u16,
    flows_per_read: u16,
    flowgram_format: u8,
}

/// The 16-byte per-read header.
#[derive(Decode)]
struct ReadHeader {
    header_length: u16,
    name_length: u16,
    n_bases: u32,
    clip_qual_left: u16,
    clip_qual_right: u16,
    clip_adapter_left: u16,
    clip_adapter_right: u16,
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

fn bincode_section<T: Decode<()>>(bytes: &[u8], offset: usize, size: usize, what: &str) -> Result<T> {
    if bytes.len() < offset + size {
        return Err(TrlError::truncated(what, bytes.len()));
    }
    Ok(decode_from_slice(
        &bytes[offset..offset + size],
        bincode::config::standard().with_big_endian().with_fixed_int_encoding(),
    )
    .map_err(|err| TrlError::Format(format!("{what}: {err}")))?
    .0)
}

fn decode_common_header(bytes: &[u8]) -> Result<CommonHeader> {
    let header: CommonHeader = bincode_section(bytes, 0, COMMON_HEADER_SIZE, "sff common header")?;
    if header.magic != SFF_MAGIC {
        return Err(TrlError::Format("missing .sff magic".to_string()));
    }
    if header.version != [0, 0, 0, 1] {
        return Err(TrlError::Format(format!("unsupported sff version {:?}", header.version)));
    }
    if header.flowgram_format != 1 {
        return Err(TrlError::Format(format!(
            "unsupported sff flowgram format {}",
            header.flowgram_format
        )));
    }
    let expected =
        align8(COMMON_HEADER_SIZE + header.flows_per_read as usize + header.key_length as usize);
    if header.header_length as usize != expected {
        return Err(TrlError::Format(format!(
            "sff header length {} does not match declared layout ({expected})",
            header.header_length
        )));
    }
    Ok(header)
}

/// One read block located during the scan.
struct ReadBlock {
    header: ReadHeader,
    data_offset: usize,
}

/// Walks the read blocks until `name` matches, skipping over the index
/// block if it sits between reads.
fn find_read(bytes: &[u8], header: &CommonHeader, name: &str) -> Result<ReadBlock> {
    let flows = header.flows_per_read as usize;
    let mut offset = header.header_length as usize;

    for _ in 0..header.n_reads {
        if header.index_offset != 0 && offset == header.index_offset as usize {
            offset += align8(header.index_length as usize);
        }
        let read: ReadHeader = bincode_section(bytes, offset, READ_HEADER_SIZE, "sff read header")?;
        let name_offset = offset + READ_HEADER_SIZE;
        let expected = align8(READ_HEADER_SIZE + read.name_length as usize);
        if read.header_length as usize != expected {
            return Err(TrlError::Format(format!(
                "sff read header length {} does not match declared layout ({expected})",
                read.header_length
            )));
        }
        let data_offset = offset + read.header_length as usize;
        let n = read.n_bases as usize;
        let data_len = align8(flows * 2 + n * 3);

        let name_end = name_offset + read.name_length as usize;
        if bytes.len() < name_end {
            return Err(TrlError::truncated("sff read name", bytes.len()));
        }
        if &bytes[name_offset..name_end] == name.as_bytes() {
            return Ok(ReadBlock { header: read, data_offset });
        }
        offset = data_offset + data_len;
    }

    Err(TrlError::Format(format!("cannot find entry {name} in sff container")))
}

pub fn decode_sff(bytes: &[u8], name: &str) -> Result<TraceRecord> {
    let header = decode_common_header(bytes)?;
    let flows = header.flows_per_read as usize;

    let mut reader = ByteReader::at(bytes, COMMON_HEADER_SIZE);
    let flow_chars: Vec<u8> = reader.take(flows)?.iter().map(|raw| normalize_base(*raw)).collect();
    let _key = reader.take(header.key_length as usize)?;

    let block = find_read(bytes, &header, name)?;
    let n = block.header.n_bases as usize;

    let mut reader = ByteReader::at(bytes, block.data_offset);
    let flowgram = reader.read_u16_be_array(flows)?;
    let flow_index = reader.take(n)?.to_vec();
    let bases: Vec<u8> = reader.take(n)?.iter().map(|raw| normalize_base(*raw)).collect();
    let quality = reader.take(n)?.to_vec();

    let mut record = TraceRecord {
        samples_a: vec![0; flows],
        samples_c: vec![0; flows],
        samples_g: vec![0; flows],
        samples_t: vec![0; flows],
        ..Default::default()
    };

    // Each flow reads out on the channel its flow character names.
    for (idx, value) in flowgram.iter().enumerate() {
        match flow_chars[idx] {
            b'a' => record.samples_a[idx] = *value,
            b'c' => record.samples_c[idx] = *value,
            b'g' => record.samples_g[idx] = *value,
            b't' => record.samples_t[idx] = *value,
            _ => {},
        }
    }

    // Flow index bytes are cumulative offsets from one before the first
    // flow, so the running sum yields absolute peak positions.
    let mut position: i64 = -1;
    record.peak_index = flow_index
        .iter()
        .map(|step| {
            position += *step as i64;
            position.max(0) as u32
        })
        .collect();

    record.confidence = distribute_confidence(&bases, &quality);
    record.valid_scores = true;
    record.bases = bases;

    record.clip_quality_left = block.header.clip_qual_left as u32;
    record.clip_quality_right = block.header.clip_qual_right as u32;
    record.clip_adapter_left = block.header.clip_adapter_left as u32;
    record.clip_adapter_right = block.header.clip_adapter_right as u32;

    Ok(record)
}

// Tests
#[cfg(test)]
mod tests {

    struct SffRead {
        name: &'static str,
        flowgram: Vec<u16>,
        flow_index: Vec<u8>,
        bases: &'static [u8],
        quality: Vec<u8>,
        clips: [u16; 4],
    }

    fn align8(value: usize) -> usize {
        (value + 7) & !7
    }

    fn build_sff(flow_chars: &[u8], key: &[u8], reads: &[SffRead]) -> Vec<u8> {
        let header_length = align8(31 + flow_chars.len() + key.len());

        let mut out: Vec<u8> = Vec::new();
        out.extend(0x2e73_6666_u32.to_be_bytes());
        out.extend([0, 0, 0, 1]);
        out.extend(0_u64.to_be_bytes());
        out.extend(0_u32.to_be_bytes());
        out.extend((reads.len() as u32).to_be_bytes());
        out.extend((header_length as u16).to_be_bytes());
        out.extend((key.len() as u16).to_be_bytes());
        out.extend((flow_chars.len() as u16).to_be_bytes());
        out.push(1);
        out.extend(flow_chars);
        out.extend(key);
        out.resize(header_length, 0);

        for read in reads {
            let read_header_length = align8(16 + read.name.len());
            out.extend((read_header_length as u16).to_be_bytes());
            out.extend((read.name.len() as u16).to_be_bytes());
            out.extend((read.bases.len() as u32).to_be_bytes());
            for clip in read.clips {
                out.extend(clip.to_be_bytes());
            }
            out.extend(read.name.as_bytes());
            out.resize(out.len() + read_header_length - 16 - read.name.len(), 0);

            let data_start = out.len();
            out.extend(read.flowgram.iter().flat_map(|value| value.to_be_bytes()));
            out.extend(&read.flow_index);
            out.extend(read.bases);
            out.extend(&read.quality);
            out.resize(data_start + align8(flow_chars.len() * 2 + read.bases.len() * 3), 0);
        }
        out
    }

    fn two_read_fixture() -> Vec<u8> {
        build_sff(
            b"TACG",
            b"tcag",
            &[
                SffRead {
                    name: "run1_0001",
                    flowgram: vec![100, 5, 108, 3],
                    flow_index: vec![1, 2],
                    bases: b"TC",
                    quality: vec![30, 31],
                    clips: [1, 2, 0, 0],
                },
                SffRead {
                    name: "run1_0002",
                    flowgram: vec![9, 104, 6, 97],
                    flow_index: vec![2, 2],
                    bases: b"AG",
                    quality: vec![20, 21],
                    clips: [3, 4, 5, 6],
                },
            ],
        )
    }

    #[test]
    fn named_read_is_extracted() {
        use super::decode_sff;

        let record = decode_sff(&two_read_fixture(), "run1_0002").unwrap();
        record.check().unwrap();

        assert_eq!(record.bases, b"ag".to_vec());
        assert_eq!(record.confidence, vec![20, 21]);
        assert_eq!(record.clip_quality_left, 3);
        assert_eq!(record.clip_quality_right, 4);
        assert_eq!(record.clip_adapter_left, 5);
        assert_eq!(record.clip_adapter_right, 6);
    }

    #[test]
    fn flows_light_up_one_channel_each() {
        use super::decode_sff;

        // Flow order TACG: position 0 is a T flow, position 2 a C flow.
        let record = decode_sff(&two_read_fixture(), "run1_0001").unwrap();

        assert_eq!(record.samples_t, vec![100, 0, 0, 0]);
        assert_eq!(record.samples_a, vec![0, 5, 0, 0]);
        assert_eq!(record.samples_c, vec![0, 0, 108, 0]);
        assert_eq!(record.samples_g, vec![0, 0, 0, 3]);
    }

    #[test]
    fn peak_positions_accumulate_flow_index_steps() {
        use super::decode_sff;

        let first = decode_sff(&two_read_fixture(), "run1_0001").unwrap();
        assert_eq!(first.peak_index, vec![0, 2]);

        let second = decode_sff(&two_read_fixture(), "run1_0002").unwrap();
        assert_eq!(second.peak_index, vec![1, 3]);
    }

    #[test]
    fn unknown_read_name_is_an_error() {
        use super::decode_sff;

        let err = decode_sff(&two_read_fixture(), "run1_9999").unwrap_err();
        assert!(err.to_string().contains("cannot find entry"));
    }

    #[test]
    fn bad_magic_version_and_format_are_errors() {
        use super::decode_sff;

        let good = two_read_fixture();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'x';
        assert!(decode_sff(&bad_magic, "run1_0001").is_err());

        let mut bad_version = good.clone();
        bad_version[7] = 9;
        assert!(decode_sff(&bad_version, "run1_0001").is_err());

        let mut bad_format = good.clone();
        bad_format[30] = 2;
        assert!(decode_sff(&bad_format, "run1_0001").is_err());
    }

    #[test]
    fn header_length_mismatch_is_an_error() {
        use super::decode_sff;

        let mut data = two_read_fixture();
        // Common header length field at offset 24.
        data[25] = data[25].wrapping_add(8);
        assert!(decode_sff(&data, "run1_0001").is_err());
    }
}
