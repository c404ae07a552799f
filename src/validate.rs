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

//! Manifest validation: static field checks, rule application, hardcoded
//! per-row checks, file existence, and the failure threshold.
//!
//! The validator is a small state machine, `Ready → Loaded → Valid` with
//! `Invalid` reachable from anywhere. Per-row failures mark the row invalid
//! and count against the threshold; the failure that brings the counter to
//! the allowed limit aborts the whole run. Syntax-level problems (manifest
//! parse errors, unknown field names, missing mandatory fields) abort
//! immediately without counting.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{info, warn};

use crate::error::{Result, TrlError};
use crate::fields::FieldCatalog;
use crate::manifest::{load_manifest, ManifestRow};
use crate::rules::Rule;

/// Characters a trace name must not contain.
const FORBIDDEN_NAME_CHARS: &[char] = &[' ', '\t', '/', '\\', '\'', '"', ',', ';', '<', '>', '|'];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Ready,
    Loaded,
    Valid,
    Invalid,
}

#[derive(Clone, Debug)]
pub struct ValidatorOptions {
    /// Absolute failure limit; wins over the percentage when set.
    pub max_err_count: Option<usize>,
    /// Failure limit as a percentage of the row count.
    pub max_err_percent: u32,
    /// Directory file-field paths are resolved against.
    pub base_dir: PathBuf,
    /// Disable to validate a manifest without the referenced files on disk.
    pub check_files: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        ValidatorOptions {
            max_err_count: None,
            max_err_percent: 5,
            base_dir: PathBuf::from("."),
            check_files: true,
        }
    }
}

pub struct Validator<'a> {
    catalog: &'a FieldCatalog,
    rules: &'a [Rule],
    options: ValidatorOptions,
    state: State,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a FieldCatalog, rules: &'a [Rule], options: ValidatorOptions) -> Self {
        Validator { catalog, rules, options, state: State::Ready }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of row failures the run tolerates before aborting.
    ///
    /// The explicit count wins when set; otherwise the percentage of the
    /// row total, rounded to nearest, at least 1 and at most 100, never
    /// more than the row count itself.
    pub fn allowed_failures(&self, total: usize) -> usize {
        if let Some(count) = self.options.max_err_count {
            return count;
        }
        let by_percent = (total as f64 * self.options.max_err_percent as f64 / 100.0 + 0.5) as usize;
        by_percent.clamp(1, 100).min(total)
    }

    /// `Ready → Loaded`; a parse error moves to `Invalid` instead.
    pub fn load(&mut self, bytes: &[u8]) -> Result<Vec<ManifestRow>> {
        match load_manifest(bytes) {
            Ok(rows) => {
                self.state = State::Loaded;
                Ok(rows)
            },
            Err(err) => {
                self.state = State::Invalid;
                Err(err)
            },
        }
    }

    /// `Loaded → Valid`; runs every validation stage in fixed order and
    /// returns the number of rows marked invalid.
    pub fn validate(&mut self, rows: &mut [ManifestRow]) -> Result<usize> {
        if self.state != State::Loaded {
            self.state = State::Invalid;
            return Err(TrlError::Parse("validate called before a successful load".to_string()));
        }
        match self.run_stages(rows) {
            Ok(failures) => {
                self.state = State::Valid;
                Ok(failures)
            },
            Err(err) => {
                self.state = State::Invalid;
                Err(err)
            },
        }
    }

    fn run_stages(&self, rows: &mut [ManifestRow]) -> Result<usize> {
        self.check_static_fields(rows)?;

        let limit = self.allowed_failures(rows.len());
        let mut failures = 0_usize;
        let mut seen_names: HashSet<String> = HashSet::new();

        for (index, row) in rows.iter_mut().enumerate() {
            let problem = crate::rules::apply(self.rules, row)
                .or_else(|| self.check_hardcoded(row, &mut seen_names))
                .or_else(|| self.check_files(row));
            if let Some(reason) = problem {
                failures += 1;
                if failures >= limit {
                    return Err(TrlError::TooManyErrors {
                        failures,
                        total: rows.len(),
                        limit,
                        last: reason,
                    });
                }
                warn!("row {}: {reason}", index + 1);
                row.mark_invalid(reason);
            }
        }
        info!("{} of {} rows valid", rows.len() - failures, rows.len());
        Ok(failures)
    }

    /// Mandatory catalog fields must appear in the first row; every field
    /// name anywhere must be known to the catalog.
    fn check_static_fields(&self, rows: &[ManifestRow]) -> Result<()> {
        let first = rows
            .first()
            .ok_or_else(|| TrlError::Parse("manifest has no data rows".to_string()))?;
        for descriptor in self.catalog.mandatory() {
            if !first.fields.contains_key(descriptor.name) {
                return Err(TrlError::Parse(format!(
                    "mandatory field {} missing from the manifest",
                    descriptor.name
                )));
            }
        }
        for row in rows {
            for name in row.fields.keys() {
                if !self.catalog.contains(name) {
                    return Err(TrlError::Parse(format!("unknown manifest field {name}")));
                }
            }
        }
        Ok(())
    }

    fn check_hardcoded(&self, row: &ManifestRow, seen_names: &mut HashSet<String>) -> Option<String> {
        let name = row.get("TRACE_NAME").unwrap_or("");
        if name.is_empty() {
            return Some("trace name is empty".to_string());
        }
        if let Some(bad) = name.chars().find(|symbol| FORBIDDEN_NAME_CHARS.contains(symbol)) {
            return Some(format!("trace name {name:?} contains forbidden character {bad:?}"));
        }
        if !seen_names.insert(name.to_ascii_lowercase()) {
            return Some(format!("trace name {name:?} is not unique"));
        }

        match row.get_non_empty("SPECIES_CODE") {
            None => return Some("species code is not set".to_string()),
            Some(code) if code.eq_ignore_ascii_case("454") => {
                return Some("species code must not be the literal 454".to_string());
            },
            Some(_) => {},
        }
        for field in ["TRACE_TYPE_CODE", "TRACE_FORMAT", "SOURCE_TYPE"] {
            if row.get_non_empty(field).is_none() {
                return Some(format!("{field} is not set"));
            }
        }

        // Replacing the basecalls invalidates in-trace peaks and quality,
        // so both replacements must come along.
        if row.get_non_empty("BASE_FILE").is_some() {
            for field in ["PEAK_FILE", "QUAL_FILE"] {
                if row.get_non_empty(field).is_none() {
                    return Some(format!("BASE_FILE given without {field}"));
                }
            }
        }
        None
    }

    fn check_files(&self, row: &ManifestRow) -> Option<String> {
        if !self.options.check_files {
            return None;
        }
        for descriptor in self.catalog.file_fields() {
            if let Some(value) = row.get_non_empty(descriptor.name) {
                let path = self.options.base_dir.join(value);
                match std::fs::metadata(&path) {
                    Ok(meta) if meta.len() > 0 => {},
                    Ok(_) => return Some(format!("{} {value:?} is empty", descriptor.name)),
                    Err(_) => return Some(format!("{} {value:?} does not exist", descriptor.name)),
                }
            }
        }
        None
    }
}

// Tests
#[cfg(test)]
mod tests {
    use crate::fields::FieldCatalog;
    use crate::validate::{State, Validator, ValidatorOptions};

    fn options_no_files() -> ValidatorOptions {
        ValidatorOptions { check_files: false, ..Default::default() }
    }

    /// A manifest with `total` rows of which the first `bad` have an empty
    /// species code.
    fn manifest(total: usize, bad: usize) -> Vec<u8> {
        let mut text = String::from(
            "CENTER_NAME = WUGSC\nTRACE_FORMAT = ZTR\nTRACE_TYPE_CODE = WGS\nSOURCE_TYPE = G\n\
             TRACE_NAME\tTRACE_FILE\tSPECIES_CODE\n",
        );
        for index in 0..total {
            let species = if index < bad { "" } else { "HOMO SAPIENS" };
            text.push_str(&format!("t{index}\ttraces/t{index}.ztr\t{species}\n"));
        }
        text.into_bytes()
    }

    #[test]
    fn clean_manifest_reaches_valid() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());
        assert_eq!(validator.state(), State::Ready);

        let mut rows = validator.load(&manifest(10, 0)).unwrap();
        assert_eq!(validator.state(), State::Loaded);

        let failures = validator.validate(&mut rows).unwrap();
        assert_eq!(failures, 0);
        assert_eq!(validator.state(), State::Valid);
        assert!(rows.iter().all(|row| row.is_valid()));
    }

    #[test]
    fn failures_below_the_limit_mark_rows_invalid() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());

        // 100 rows at 5 percent: the limit is 5, so 4 failures pass.
        let mut rows = validator.load(&manifest(100, 4)).unwrap();
        let failures = validator.validate(&mut rows).unwrap();

        assert_eq!(failures, 4);
        assert_eq!(rows.iter().filter(|row| !row.is_valid()).count(), 4);
        assert_eq!(validator.state(), State::Valid);
    }

    #[test]
    fn failure_reaching_the_limit_aborts() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());

        let mut rows = validator.load(&manifest(100, 5)).unwrap();
        let err = validator.validate(&mut rows).unwrap_err();

        assert!(err.to_string().contains("5"));
        assert_eq!(validator.state(), State::Invalid);
    }

    #[test]
    fn absolute_count_wins_over_percentage() {
        let catalog = FieldCatalog::standard();
        let options = ValidatorOptions {
            max_err_count: Some(2),
            check_files: false,
            ..Default::default()
        };
        let mut validator = Validator::new(&catalog, &[], options);

        // 2 failures would pass the 5 percent rule but hit the count.
        let mut rows = validator.load(&manifest(100, 2)).unwrap();
        assert!(validator.validate(&mut rows).is_err());
    }

    #[test]
    fn allowed_failures_rounding() {
        let catalog = FieldCatalog::standard();
        let validator = Validator::new(&catalog, &[], options_no_files());

        // floor(N*5/100 + 0.5), minimum 1, capped at N and at 100.
        assert_eq!(validator.allowed_failures(100), 5);
        assert_eq!(validator.allowed_failures(10), 1);
        assert_eq!(validator.allowed_failures(30), 2);
        assert_eq!(validator.allowed_failures(1), 1);
        assert_eq!(validator.allowed_failures(5000), 100);
    }

    #[test]
    fn missing_mandatory_field_is_fatal() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());

        // No SPECIES_CODE column or common field at all.
        let manifest = b"CENTER_NAME = X\nTRACE_NAME\tTRACE_FILE\nt1\tt1.ztr\n";
        let mut rows = validator.load(manifest).unwrap();
        assert!(validator.validate(&mut rows).is_err());
        assert_eq!(validator.state(), State::Invalid);
    }

    #[test]
    fn unknown_field_name_is_fatal() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());

        let mut rows = validator.load(&manifest(3, 0)).unwrap();
        rows[2].set("MYSTERY_COLUMN", "x");
        assert!(validator.validate(&mut rows).is_err());
    }

    #[test]
    fn hardcoded_checks_catch_row_problems() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());
        let mut rows = validator.load(&manifest(30, 0)).unwrap();

        rows[0].set("TRACE_NAME", "bad name");
        rows[1].set("SPECIES_CODE", "454");
        // Duplicate of row 3, differing only in case.
        let name = rows[3].get("TRACE_NAME").unwrap().to_ascii_uppercase();
        rows[4].set("TRACE_NAME", &name);
        rows[5].set("BASE_FILE", "b.txt");

        let err = validator.validate(&mut rows).unwrap_err();
        // 30 rows at 5 percent allow 2 failures; the third aborts.
        assert!(err.to_string().contains("2"));
    }

    #[test]
    fn base_override_requires_peak_and_quality() {
        let catalog = FieldCatalog::standard();
        let mut validator = Validator::new(&catalog, &[], options_no_files());
        let mut rows = validator.load(&manifest(30, 0)).unwrap();

        rows[0].set("BASE_FILE", "b.txt");
        let failures = validator.validate(&mut rows).unwrap();
        assert_eq!(failures, 1);
        assert!(rows[0].invalid.as_deref().unwrap().contains("PEAK_FILE"));

        let mut validator = Validator::new(&catalog, &[], options_no_files());
        let mut rows = validator.load(&manifest(30, 0)).unwrap();
        rows[0].set("BASE_FILE", "b.txt");
        rows[0].set("PEAK_FILE", "p.txt");
        rows[0].set("QUAL_FILE", "q.txt");
        assert_eq!(validator.validate(&mut rows).unwrap(), 0);
    }

    #[test]
    fn file_checks_require_existing_non_empty_files() {
        use std::path::PathBuf;

        let catalog = FieldCatalog::standard();
        let root = std::env::temp_dir().join(format!("trl-validate-{}", std::process::id()));
        std::fs::create_dir_all(root.join("traces")).unwrap();

        let manifest = b"\
CENTER_NAME = X
TRACE_FORMAT = ZTR
TRACE_TYPE_CODE = WGS
SOURCE_TYPE = G
SPECIES_CODE = HOMO SAPIENS
TRACE_NAME\tTRACE_FILE
t1\ttraces/t1.ztr
t2\ttraces/t2.ztr
t3\ttraces/t3.ztr
";
        std::fs::write(root.join("traces/t1.ztr"), b"data").unwrap();
        std::fs::write(root.join("traces/t2.ztr"), b"").unwrap();

        let options = ValidatorOptions {
            base_dir: PathBuf::from(&root),
            max_err_count: Some(10),
            ..Default::default()
        };
        let mut validator = Validator::new(&catalog, &[], options);
        let mut rows = validator.load(manifest).unwrap();
        let failures = validator.validate(&mut rows).unwrap();

        assert_eq!(failures, 2);
        assert!(rows[0].is_valid());
        assert!(rows[1].invalid.as_deref().unwrap().contains("empty"));
        assert!(rows[2].invalid.as_deref().unwrap().contains("does not exist"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn rules_run_before_hardcoded_checks() {
        use crate::rules::action::{Action, CheckFieldPresence};
        use crate::rules::expr::Expr;
        use crate::rules::Rule;

        let catalog = FieldCatalog::standard();
        let rules = vec![Rule {
            name: "needs_strain".to_string(),
            condition: Expr::Any,
            action: Action::FieldPresence(
                CheckFieldPresence::new(vec!["STRAIN".to_string()], vec![], &catalog).unwrap(),
            ),
        }];
        let mut validator = Validator::new(&catalog, &rules, options_no_files());

        // Every row fails the rule, so the run aborts at the limit with the
        // rule's message attached.
        let mut rows = validator.load(&manifest(30, 0)).unwrap();
        let err = validator.validate(&mut rows).unwrap_err();
        assert!(err.to_string().contains("needs_strain"));
    }
}
