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

//! The `key = value` property-bag record serialization used by rule files.
//!
//! A file holds records separated by delimiter lines (a line starting with
//! `=====`). Each record carries a `name = ...` line and arbitrary ordered
//! `key = value` pairs; keys may repeat, so pairs are kept as an ordered
//! list rather than a map.

use crate::error::{Result, TrlError};

const DELIMITER: &str = "=====";

/// One named record of ordered key/value pairs.
#[derive(Clone, Debug, Default)]
pub struct OwpRecord {
    pub name: String,
    pairs: Vec<(String, String)>,
}

impl OwpRecord {
    /// First value stored under `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// All values stored under `key`, in file order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.pairs.is_empty()
    }
}

/// Parses a property-bag file into its records.
///
/// Empty records produced by consecutive delimiter lines are dropped; a
/// non-empty line without `=` is a parse error.
pub fn parse_owp(text: &str) -> Result<Vec<OwpRecord>> {
    let mut records: Vec<OwpRecord> = Vec::new();
    let mut current = OwpRecord::default();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with(DELIMITER) {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            TrlError::Parse(format!("line {}: expected key = value, got {line:?}", lineno + 1))
        })?;
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("name") {
            current.name = value.to_string();
        } else {
            current.pairs.push((key.to_string(), value.to_string()));
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    Ok(records)
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn records_split_on_delimiter_lines() {
        use super::parse_owp;

        let text = "\
name = first
condition = ANY
=====
name = second
yes_fields = TRACE_NAME
yes_fields = TRACE_FILE
";
        let got = parse_owp(text).unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].name, "first");
        assert_eq!(got[0].get("condition"), Some("ANY"));
        assert_eq!(got[1].name, "second");
        assert_eq!(got[1].values("yes_fields"), vec!["TRACE_NAME", "TRACE_FILE"]);
    }

    #[test]
    fn keys_are_case_insensitive_and_trimmed() {
        use super::parse_owp;

        let text = "Name = r1\n  Condition =  SPECIES_CODE == \"x\"  \n";
        let got = parse_owp(text).unwrap();

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "r1");
        assert_eq!(got[0].get("CONDITION"), Some("SPECIES_CODE == \"x\""));
    }

    #[test]
    fn blank_records_and_comments_are_dropped() {
        use super::parse_owp;

        let text = "=====\n# comment\n=====\nname = only\n=====\n=====\n";
        let got = parse_owp(text).unwrap();

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "only");
    }

    #[test]
    fn line_without_separator_is_a_parse_error() {
        use super::parse_owp;

        assert!(parse_owp("name = r1\nnot a pair\n").is_err());
    }
}
