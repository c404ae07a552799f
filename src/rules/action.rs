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

//! Rule actions: typed field checks and field-presence checks.
//!
//! An action runs only when its rule's condition held for the row; a
//! failing action yields the human-readable message the validator uses to
//! invalidate the row.

use crate::error::{Result, TrlError};
use crate::fields::FieldCatalog;
use crate::manifest::ManifestRow;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Int,
    Date,
    Float,
    Str,
}

impl FieldType {
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "int" => Ok(FieldType::Int),
            "date" => Ok(FieldType::Date),
            "float" => Ok(FieldType::Float),
            "string" => Ok(FieldType::Str),
            other => Err(TrlError::Parse(format!("unknown field type {other}"))),
        }
    }
}

/// Validates one field's value against a type, an optional numeric-or-length
/// bound, and for strings an optional character whitelist.
#[derive(Clone, Debug)]
pub struct CheckFieldType {
    pub field: String,
    pub ty: FieldType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub alphabet: Option<String>,
}

impl CheckFieldType {
    pub fn new(
        field: &str,
        ty: FieldType,
        min: Option<f64>,
        max: Option<f64>,
        alphabet: Option<String>,
        catalog: &FieldCatalog,
    ) -> Result<Self> {
        if !catalog.contains(field) {
            return Err(TrlError::Parse(format!("unknown field {field} in type check")));
        }
        Ok(CheckFieldType {
            field: field.to_string(),
            ty,
            min,
            max,
            alphabet: alphabet.map(|chars| chars.to_ascii_uppercase()),
        })
    }

    fn check_bounds(&self, magnitude: f64, what: &str) -> Option<String> {
        if let Some(min) = self.min {
            if magnitude < min {
                return Some(format!("{} of field {} is below {min}", what, self.field));
            }
        }
        if let Some(max) = self.max {
            if magnitude > max {
                return Some(format!("{} of field {} is above {max}", what, self.field));
            }
        }
        None
    }

    pub fn check(&self, row: &ManifestRow) -> Option<String> {
        let value = match row.get_non_empty(&self.field) {
            Some(value) => value,
            None => return Some(format!("field {} is not set", self.field)),
        };
        match self.ty {
            FieldType::Int => match value.parse::<i64>() {
                Ok(number) => self.check_bounds(number as f64, "value"),
                Err(_) => Some(format!("field {} value {value:?} is not an integer", self.field)),
            },
            FieldType::Float => match value.parse::<f64>() {
                Ok(number) => self.check_bounds(number, "value"),
                Err(_) => Some(format!("field {} value {value:?} is not a number", self.field)),
            },
            FieldType::Date => {
                if parse_date(value) {
                    None
                } else {
                    Some(format!("field {} value {value:?} is not a date", self.field))
                }
            },
            FieldType::Str => {
                if let Some(message) = self.check_bounds(value.len() as f64, "length") {
                    return Some(message);
                }
                if let Some(alphabet) = &self.alphabet {
                    let upper = value.to_ascii_uppercase();
                    if let Some(bad) = upper.chars().find(|symbol| !alphabet.contains(*symbol)) {
                        return Some(format!(
                            "field {} contains {bad:?} outside the allowed alphabet",
                            self.field
                        ));
                    }
                }
                None
            },
        }
    }
}

/// Accepts `YYYY-MM-DD` (also with `/`) and `Mon DD YYYY` month-name forms.
fn parse_date(text: &str) -> bool {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];

    let numeric: Vec<&str> = text.split(['-', '/']).collect();
    if numeric.len() == 3 {
        let year = numeric[0].parse::<u32>();
        let month = numeric[1].parse::<u32>();
        let day = numeric[2].parse::<u32>();
        if let (Ok(year), Ok(month), Ok(day)) = (year, month, day) {
            return year >= 1000 && (1..=12).contains(&month) && (1..=31).contains(&day);
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() == 3 {
        let month = words[0].to_ascii_uppercase();
        let day = words[1].parse::<u32>();
        let year = words[2].parse::<u32>();
        if let (Ok(day), Ok(year)) = (day, year) {
            return MONTHS.contains(&month.as_str()) && (1..=31).contains(&day) && year >= 1000;
        }
    }
    false
}

/// Requires one list of fields to be set and another to be unset.
#[derive(Clone, Debug)]
pub struct CheckFieldPresence {
    pub yes_fields: Vec<String>,
    pub no_fields: Vec<String>,
}

impl CheckFieldPresence {
    pub fn new(yes_fields: Vec<String>, no_fields: Vec<String>, catalog: &FieldCatalog) -> Result<Self> {
        for field in yes_fields.iter().chain(no_fields.iter()) {
            if !catalog.contains(field) {
                return Err(TrlError::Parse(format!("unknown field {field} in presence check")));
            }
        }
        for field in yes_fields.iter() {
            if no_fields.iter().any(|other| other.eq_ignore_ascii_case(field)) {
                return Err(TrlError::Parse(format!(
                    "field {field} appears in both the required and forbidden lists"
                )));
            }
        }
        Ok(CheckFieldPresence { yes_fields, no_fields })
    }

    pub fn check(&self, row: &ManifestRow) -> Option<String> {
        for field in self.yes_fields.iter() {
            if row.get_non_empty(field).is_none() {
                return Some(format!("required field {field} is not set"));
            }
        }
        for field in self.no_fields.iter() {
            if row.get_non_empty(field).is_some() {
                return Some(format!("forbidden field {field} is set"));
            }
        }
        None
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    FieldType(CheckFieldType),
    FieldPresence(CheckFieldPresence),
}

impl Action {
    /// Runs the action; `Some` carries the failure message.
    pub fn check(&self, row: &ManifestRow) -> Option<String> {
        match self {
            Action::FieldType(action) => action.check(row),
            Action::FieldPresence(action) => action.check(row),
        }
    }
}

// Tests
#[cfg(test)]
mod tests {

    fn row(pairs: &[(&str, &str)]) -> crate::manifest::ManifestRow {
        let mut row = crate::manifest::ManifestRow::default();
        for (key, value) in pairs {
            row.set(key, value);
        }
        row
    }

    #[test]
    fn int_check_with_bounds() {
        use super::{CheckFieldType, FieldType};
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let check = CheckFieldType::new("INSERT_SIZE", FieldType::Int, Some(1.0), Some(50000.0), None, &catalog)
            .unwrap();

        assert!(check.check(&row(&[("INSERT_SIZE", "4000")])).is_none());
        assert!(check.check(&row(&[("INSERT_SIZE", "0")])).is_some());
        assert!(check.check(&row(&[("INSERT_SIZE", "99999")])).is_some());
        assert!(check.check(&row(&[("INSERT_SIZE", "4e3")])).is_some());
        assert!(check.check(&row(&[])).is_some());
    }

    #[test]
    fn float_and_date_checks() {
        use super::{CheckFieldType, FieldType};
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let latitude =
            CheckFieldType::new("LATITUDE", FieldType::Float, Some(-90.0), Some(90.0), None, &catalog)
                .unwrap();
        assert!(latitude.check(&row(&[("LATITUDE", "61.5")])).is_none());
        assert!(latitude.check(&row(&[("LATITUDE", "100.0")])).is_some());

        let run_date = CheckFieldType::new("RUN_DATE", FieldType::Date, None, None, None, &catalog).unwrap();
        assert!(run_date.check(&row(&[("RUN_DATE", "2004-02-05")])).is_none());
        assert!(run_date.check(&row(&[("RUN_DATE", "Feb 5 2004")])).is_none());
        assert!(run_date.check(&row(&[("RUN_DATE", "soon")])).is_some());
        assert!(run_date.check(&row(&[("RUN_DATE", "2004-13-05")])).is_some());
    }

    #[test]
    fn string_alphabet_whitelist() {
        use super::{CheckFieldType, FieldType};
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let check = CheckFieldType::new(
            "TRACE_DIRECTION",
            FieldType::Str,
            None,
            None,
            Some("forwadevs".to_string()),
            &catalog,
        )
        .unwrap();

        assert!(check.check(&row(&[("TRACE_DIRECTION", "FORWARD")])).is_none());
        assert!(check.check(&row(&[("TRACE_DIRECTION", "reverse")])).is_none());
        assert!(check.check(&row(&[("TRACE_DIRECTION", "up!")])).is_some());
    }

    #[test]
    fn presence_check_both_directions() {
        use super::CheckFieldPresence;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let check = CheckFieldPresence::new(
            vec!["BASE_FILE".to_string()],
            vec!["ACCESSION".to_string()],
            &catalog,
        )
        .unwrap();

        assert!(check.check(&row(&[("BASE_FILE", "b.txt")])).is_none());
        assert!(check.check(&row(&[])).is_some());
        assert!(check
            .check(&row(&[("BASE_FILE", "b.txt"), ("ACCESSION", "TI123")]))
            .is_some());
    }

    #[test]
    fn overlapping_presence_lists_are_a_parse_error() {
        use super::CheckFieldPresence;
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();
        let got = CheckFieldPresence::new(
            vec!["BASE_FILE".to_string()],
            vec!["base_file".to_string()],
            &catalog,
        );

        assert!(got.is_err());
    }

    #[test]
    fn unknown_fields_are_a_parse_error() {
        use super::{CheckFieldPresence, CheckFieldType, FieldType};
        use crate::fields::FieldCatalog;

        let catalog = FieldCatalog::standard();

        assert!(CheckFieldType::new("BOGUS", FieldType::Int, None, None, None, &catalog).is_err());
        assert!(CheckFieldPresence::new(vec!["BOGUS".to_string()], vec![], &catalog).is_err());
    }
}
