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

//! Validation rules: loading, compilation, and application.
//!
//! A rule file is a property-bag file of records. Every record is one rule:
//! a `condition` expression plus either a typed field check (`type`,
//! optional `min`/`max`/`alphabet`) or a presence check (`yes_fields`/
//! `no_fields`). The pseudo-rule named `INIT` lists further rule files to
//! load, resolved relative to the file that names them; a visited set
//! guards against include cycles.

pub mod action;
pub mod expr;
pub mod token;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Result, TrlError};
use crate::fields::FieldCatalog;
use crate::manifest::owp::{parse_owp, OwpRecord};
use crate::manifest::ManifestRow;
use crate::rules::action::{Action, CheckFieldPresence, CheckFieldType, FieldType};
use crate::rules::expr::{compile, Expr};

/// One compiled rule; applied in file-then-include order, never mutated.
#[derive(Clone, Debug)]
pub struct Rule {
    pub name: String,
    pub condition: Expr,
    pub action: Action,
}

impl Rule {
    /// Runs the rule against one row; `Some` carries the failure message.
    pub fn apply(&self, row: &ManifestRow) -> Option<String> {
        if !self.condition.eval(row) {
            return None;
        }
        self.action
            .check(row)
            .map(|message| format!("rule {}: {message}", self.name))
    }
}

/// Applies every rule in order, returning the first failure.
pub fn apply(rules: &[Rule], row: &ManifestRow) -> Option<String> {
    rules.iter().find_map(|rule| rule.apply(row))
}

/// Loads a rule file and everything it includes.
pub fn load_rules(path: &Path, catalog: &FieldCatalog) -> Result<Vec<Rule>> {
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut rules: Vec<Rule> = Vec::new();
    load_file(path, catalog, &mut visited, &mut rules)?;
    Ok(rules)
}

fn load_file(
    path: &Path,
    catalog: &FieldCatalog,
    visited: &mut HashSet<PathBuf>,
    rules: &mut Vec<Rule>,
) -> Result<()> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        debug!("rule file {} already loaded, skipping", path.display());
        return Ok(());
    }

    let text = std::fs::read_to_string(path)
        .map_err(|err| TrlError::Parse(format!("rule file {}: {err}", path.display())))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    for record in parse_owp(&text)? {
        if record.name.eq_ignore_ascii_case("INIT") {
            for (_, include) in record.iter() {
                load_file(&base.join(include), catalog, visited, rules)?;
            }
            continue;
        }
        rules.push(build_rule(&record, catalog)?);
    }
    Ok(())
}

/// List-valued record keys may repeat and may hold comma-separated values.
fn list_values(record: &OwpRecord, key: &str) -> Vec<String> {
    record
        .values(key)
        .iter()
        .flat_map(|value| value.split(','))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn number_value(record: &OwpRecord, key: &str, rule: &str) -> Result<Option<f64>> {
    match record.get(key) {
        None => Ok(None),
        Some(text) => text.parse::<f64>().map(Some).map_err(|_| {
            TrlError::Parse(format!("rule {rule}: {key} value {text:?} is not a number"))
        }),
    }
}

fn build_rule(record: &OwpRecord, catalog: &FieldCatalog) -> Result<Rule> {
    if record.name.is_empty() {
        return Err(TrlError::Parse("rule record without a name line".to_string()));
    }
    let condition = compile(record.get("condition").unwrap_or("ANY"), catalog)?;

    let action = if let Some(ty) = record.get("type") {
        let field = record.get("field").ok_or_else(|| {
            TrlError::Parse(format!("rule {}: type check without a field", record.name))
        })?;
        Action::FieldType(CheckFieldType::new(
            field,
            FieldType::parse(ty)?,
            number_value(record, "min", &record.name)?,
            number_value(record, "max", &record.name)?,
            record.get("alphabet").map(|chars| chars.to_string()),
            catalog,
        )?)
    } else {
        let yes_fields = list_values(record, "yes_fields");
        let no_fields = list_values(record, "no_fields");
        if yes_fields.is_empty() && no_fields.is_empty() {
            return Err(TrlError::Parse(format!("rule {} has no action", record.name)));
        }
        Action::FieldPresence(CheckFieldPresence::new(yes_fields, no_fields, catalog)?)
    };

    Ok(Rule { name: record.name.clone(), condition, action })
}

// Tests
#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    /// Scratch directory torn down on drop.
    struct RuleDir {
        root: PathBuf,
    }

    impl RuleDir {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!("trl-rules-{tag}-{}", std::process::id()));
            std::fs::create_dir_all(&root).unwrap();
            RuleDir { root }
        }

        fn write(&self, name: &str, text: &str) -> PathBuf {
            let path = self.root.join(name);
            std::fs::write(&path, text).unwrap();
            path
        }
    }

    impl Drop for RuleDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn row(pairs: &[(&str, &str)]) -> crate::manifest::ManifestRow {
        let mut row = crate::manifest::ManifestRow::default();
        for (key, value) in pairs {
            row.set(key, value);
        }
        row
    }

    #[test]
    fn rules_load_and_apply_in_order() {
        use super::{apply, load_rules};
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("basic");
        let path = dir.write(
            "rules.txt",
            "\
name = insert_size_sane
condition = INSERT_SIZE
field = INSERT_SIZE
type = int
min = 1
=====
name = mouse_needs_strain
condition = SPECIES_CODE == \"mus musculus\"
yes_fields = STRAIN
",
        );
        let catalog = FieldCatalog::standard();
        let rules = load_rules(&path, &catalog).unwrap();
        assert_eq!(rules.len(), 2);

        assert!(apply(&rules, &row(&[("SPECIES_CODE", "homo sapiens")])).is_none());

        let message = apply(&rules, &row(&[("SPECIES_CODE", "MUS MUSCULUS")])).unwrap();
        assert!(message.contains("mouse_needs_strain"));
        assert!(message.contains("STRAIN"));

        let message = apply(
            &rules,
            &row(&[("SPECIES_CODE", "mus musculus"), ("INSERT_SIZE", "zero"), ("STRAIN", "c57")]),
        )
        .unwrap();
        assert!(message.contains("insert_size_sane"));
    }

    #[test]
    fn init_records_include_recursively_with_cycle_guard() {
        use super::load_rules;
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("init");
        dir.write(
            "extra.txt",
            "\
name = INIT
file = main.txt
=====
name = from_extra
yes_fields = CENTER_NAME
",
        );
        let path = dir.write(
            "main.txt",
            "\
name = INIT
file = extra.txt
=====
name = from_main
yes_fields = TRACE_NAME
",
        );

        let catalog = FieldCatalog::standard();
        let rules = load_rules(&path, &catalog).unwrap();

        // The cyclic include of main.txt is skipped, not re-loaded.
        let names: Vec<&str> = rules.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, vec!["from_extra", "from_main"]);
    }

    #[test]
    fn missing_include_is_a_parse_error() {
        use super::load_rules;
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("missing");
        let path = dir.write("main.txt", "name = INIT\nfile = nowhere.txt\n");

        let catalog = FieldCatalog::standard();
        assert!(load_rules(&path, &catalog).is_err());
    }

    #[test]
    fn rule_without_action_is_a_parse_error() {
        use super::load_rules;
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("noaction");
        let path = dir.write("main.txt", "name = empty\ncondition = ANY\n");

        let catalog = FieldCatalog::standard();
        assert!(load_rules(&path, &catalog).is_err());
    }

    #[test]
    fn comma_separated_field_lists_split() {
        use super::load_rules;
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("lists");
        let path = dir.write(
            "main.txt",
            "name = overrides\nyes_fields = BASE_FILE, QUAL_FILE\nyes_fields = PEAK_FILE\n",
        );

        let catalog = FieldCatalog::standard();
        let rules = load_rules(&path, &catalog).unwrap();

        match &rules[0].action {
            super::Action::FieldPresence(check) => {
                assert_eq!(check.yes_fields, vec!["BASE_FILE", "QUAL_FILE", "PEAK_FILE"]);
            },
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn conditional_rule_only_fires_when_condition_holds() {
        use super::load_rules;
        use crate::fields::FieldCatalog;

        let dir = RuleDir::new("conditional");
        let path = dir.write(
            "main.txt",
            "name = latitude_range\ncondition = LATITUDE\nfield = LATITUDE\ntype = float\nmin = -90\nmax = 90\n",
        );

        let catalog = FieldCatalog::standard();
        let rules = load_rules(&path, &catalog).unwrap();

        // No latitude: condition false, action never runs.
        assert!(rules[0].apply(&row(&[])).is_none());
        assert!(rules[0].apply(&row(&[("LATITUDE", "45.0")])).is_none());
        assert!(rules[0].apply(&row(&[("LATITUDE", "120.0")])).is_some());
    }
}
