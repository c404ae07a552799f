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

//! The normalized in-memory trace representation shared by all decoders.

use crate::error::{Result, TrlError};

/// One decoded sequencer read.
///
/// Invariants after a successful decode:
///   - every byte in `bases` is one of `a c g t n`,
///   - `bases`, `peak_index` and `confidence` have equal lengths whenever
///     each is non-empty,
///   - the four channel arrays have equal lengths.
///
/// A record is owned by the decode call that produced it and discarded after
/// export; nothing is cached across rows.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TraceRecord {
    /// Basecalls, lowercase `a c g t` with `n` for anything unrecognized.
    pub bases: Vec<u8>,
    /// Sample offset of the peak for each base.
    pub peak_index: Vec<u32>,
    /// Per-base scores. Meaningful only when `valid_scores` is set.
    pub confidence: Vec<u8>,
    pub valid_scores: bool,

    pub samples_a: Vec<u16>,
    pub samples_c: Vec<u16>,
    pub samples_g: Vec<u16>,
    pub samples_t: Vec<u16>,

    /// 0 means "not computed".
    pub clip_quality_left: u32,
    pub clip_quality_right: u32,
    pub clip_adapter_left: u32,
    pub clip_adapter_right: u32,

    /// Free-text `KEY = value` block assembled by the decoder.
    pub comments: String,
    /// Opaque blob, only filled by SCF.
    pub private_data: Vec<u8>,
}

impl TraceRecord {
    /// Max signal value over all four channels.
    pub fn max_trace_value(&self) -> u16 {
        [&self.samples_a, &self.samples_c, &self.samples_g, &self.samples_t]
            .iter()
            .flat_map(|channel| channel.iter().copied())
            .max()
            .unwrap_or(0)
    }

    /// Packs one u16 per channel into one u64 per sample position.
    ///
    /// Only callable once all four channels are known; layout is
    /// `A << 48 | C << 32 | G << 16 | T`.
    pub fn sample_combined(&self) -> Result<Vec<u64>> {
        self.check_samples()?;
        let out = (0..self.samples_a.len())
            .map(|idx| {
                ((self.samples_a[idx] as u64) << 48)
                    | ((self.samples_c[idx] as u64) << 32)
                    | ((self.samples_g[idx] as u64) << 16)
                    | (self.samples_t[idx] as u64)
            })
            .collect();
        Ok(out)
    }

    fn check_samples(&self) -> Result<()> {
        let len = self.samples_a.len();
        if self.samples_c.len() != len || self.samples_g.len() != len || self.samples_t.len() != len {
            return Err(TrlError::Format(format!(
                "channel length mismatch: a={} c={} g={} t={}",
                self.samples_a.len(),
                self.samples_c.len(),
                self.samples_g.len(),
                self.samples_t.len()
            )));
        }
        Ok(())
    }

    /// Verifies the cross-field invariants documented on the struct.
    pub fn check(&self) -> Result<()> {
        self.check_samples()?;
        let n_bases = self.bases.len();
        if !self.peak_index.is_empty() && self.peak_index.len() != n_bases {
            return Err(TrlError::Format(format!(
                "{} peak positions for {} bases",
                self.peak_index.len(),
                n_bases
            )));
        }
        if !self.confidence.is_empty() && self.confidence.len() != n_bases {
            return Err(TrlError::Format(format!(
                "{} confidence values for {} bases",
                self.confidence.len(),
                n_bases
            )));
        }
        if let Some(bad) = self.bases.iter().find(|base| !matches!(base, b'a' | b'c' | b'g' | b't' | b'n')) {
            return Err(TrlError::Format(format!("unnormalized base 0x{:02x}", bad)));
        }
        Ok(())
    }

    /// Appends one `KEY = value` line to the comments block.
    pub fn push_comment(&mut self, key: &str, value: &str) {
        self.comments.push_str(key);
        self.comments.push_str(" = ");
        self.comments.push_str(value);
        self.comments.push('\n');
    }
}

/// Lowercases a raw basecall; anything outside `acgt` becomes `n`.
pub fn normalize_base(raw: u8) -> u8 {
    match raw.to_ascii_lowercase() {
        base @ (b'a' | b'c' | b'g' | b't') => base,
        _ => b'n',
    }
}

/// Redistributes raw per-base scores through the four-channel confidence
/// scheme the ABI and ZTR decoders share.
///
/// Each score lands in the channel named by the (already normalized) base at
/// the same position; bases that match no channel score 0. The scores stay
/// valid either way.
pub fn distribute_confidence(bases: &[u8], raw: &[u8]) -> Vec<u8> {
    let mut channels: [Vec<u8>; 4] = [
        vec![0; bases.len()],
        vec![0; bases.len()],
        vec![0; bases.len()],
        vec![0; bases.len()],
    ];
    bases.iter().zip(raw.iter()).enumerate().for_each(|(idx, (base, score))| {
        match base {
            b'a' => channels[0][idx] = *score,
            b'c' => channels[1][idx] = *score,
            b'g' => channels[2][idx] = *score,
            b't' => channels[3][idx] = *score,
            _ => {},
        }
    });

    bases
        .iter()
        .enumerate()
        .map(|(idx, base)| match base {
            b'a' => channels[0][idx],
            b'c' => channels[1][idx],
            b'g' => channels[2][idx],
            b't' => channels[3][idx],
            _ => 0,
        })
        .collect()
}

/// Externally supplied replacements for in-trace data.
///
/// The manifest may point at plain-text base, quality, and peak files that
/// take precedence over whatever the trace container itself stores.
#[derive(Clone, Debug, Default)]
pub struct TraceOverrides {
    pub bases: Option<Vec<u8>>,
    pub confidence: Option<Vec<u8>>,
    pub peak_index: Option<Vec<u32>>,
}

impl TraceOverrides {
    pub fn is_empty(&self) -> bool {
        self.bases.is_none() && self.confidence.is_none() && self.peak_index.is_none()
    }
}

/// A decoded record together with its manifest-supplied overrides.
#[derive(Clone, Debug, Default)]
pub struct TraceBundle {
    pub record: TraceRecord,
    pub overrides: TraceOverrides,
}

impl TraceBundle {
    pub fn new(record: TraceRecord) -> Self {
        TraceBundle { record, overrides: TraceOverrides::default() }
    }

    pub fn effective_bases(&self) -> &[u8] {
        self.overrides.bases.as_deref().unwrap_or(&self.record.bases)
    }

    pub fn effective_confidence(&self) -> &[u8] {
        self.overrides.confidence.as_deref().unwrap_or(&self.record.confidence)
    }

    pub fn effective_peak_index(&self) -> &[u32] {
        self.overrides.peak_index.as_deref().unwrap_or(&self.record.peak_index)
    }

    /// The bundle-level invariant: override arrays must agree with the base
    /// count they accompany.
    pub fn check(&self) -> Result<()> {
        self.record.check()?;
        let n_bases = self.effective_bases().len();
        if !self.effective_peak_index().is_empty() && self.effective_peak_index().len() != n_bases {
            return Err(TrlError::Format(format!(
                "override peak count {} does not match {} bases",
                self.effective_peak_index().len(),
                n_bases
            )));
        }
        if !self.effective_confidence().is_empty() && self.effective_confidence().len() != n_bases {
            return Err(TrlError::Format(format!(
                "override quality count {} does not match {} bases",
                self.effective_confidence().len(),
                n_bases
            )));
        }
        Ok(())
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn normalize_base_maps_everything_to_acgtn() {
        use super::normalize_base;

        assert_eq!(normalize_base(b'A'), b'a');
        assert_eq!(normalize_base(b'c'), b'c');
        assert_eq!(normalize_base(b'G'), b'g');
        assert_eq!(normalize_base(b't'), b't');
        assert_eq!(normalize_base(b'N'), b'n');
        assert_eq!(normalize_base(b'X'), b'n');
        assert_eq!(normalize_base(0x00), b'n');
        assert_eq!(normalize_base(b'-'), b'n');
    }

    #[test]
    fn distribute_confidence_keeps_matched_scores() {
        use super::distribute_confidence;

        let bases = b"acgtn".to_vec();
        let raw: Vec<u8> = vec![10, 20, 30, 40, 50];

        let got = distribute_confidence(&bases, &raw);
        let expected: Vec<u8> = vec![10, 20, 30, 40, 0];

        assert_eq!(got, expected);
    }

    #[test]
    fn sample_combined_packs_channels() {
        use super::TraceRecord;

        let record = TraceRecord {
            samples_a: vec![1, 2],
            samples_c: vec![3, 4],
            samples_g: vec![5, 6],
            samples_t: vec![7, 8],
            ..Default::default()
        };

        let got = record.sample_combined().unwrap();
        let expected: Vec<u64> = vec![
            (1 << 48) | (3 << 32) | (5 << 16) | 7,
            (2 << 48) | (4 << 32) | (6 << 16) | 8,
        ];

        assert_eq!(got, expected);
        assert_eq!(record.max_trace_value(), 8);
    }

    #[test]
    fn check_rejects_channel_length_mismatch() {
        use super::TraceRecord;

        let record = TraceRecord {
            samples_a: vec![1, 2],
            samples_c: vec![3],
            ..Default::default()
        };

        assert!(record.check().is_err());
        assert!(record.sample_combined().is_err());
    }

    #[test]
    fn check_rejects_peak_count_mismatch() {
        use super::TraceRecord;

        let record = TraceRecord {
            bases: b"acgt".to_vec(),
            peak_index: vec![1, 2, 3],
            ..Default::default()
        };

        assert!(record.check().is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        use super::{TraceBundle, TraceRecord};

        let record = TraceRecord { bases: b"acgt".to_vec(), ..Default::default() };
        let mut bundle = TraceBundle::new(record);
        assert_eq!(bundle.effective_bases(), b"acgt");

        bundle.overrides.bases = Some(b"ttt".to_vec());
        assert_eq!(bundle.effective_bases(), b"ttt");
    }

    #[test]
    fn bundle_check_rejects_mismatched_override() {
        use super::{TraceBundle, TraceRecord};

        let record = TraceRecord { bases: b"acgt".to_vec(), ..Default::default() };
        let mut bundle = TraceBundle::new(record);
        bundle.overrides.confidence = Some(vec![40, 40]);

        assert!(bundle.check().is_err());
    }
}
