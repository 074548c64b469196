//! Error types for the MAR engine and its record store.
//!
//! Failures fall into two families. [`ValidationError`]s are raised before any
//! store call is made and describe an edit the clinician is not allowed to make.
//! [`StoreError`]s wrap anything that went wrong while reading or writing the
//! record store. [`MarError`] is the union returned by engine operations.

use crate::models::PrnField;
use thiserror::Error;

/// A failure reported by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A row addressed by id does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

/// An edit rejected before it reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("day {0} is outside the 1-31 grid")]
    DayOutOfRange(u8),
    #[error("{item} is not active on day {day}")]
    InactiveDay { item: String, day: u8 },
    #[error("day {day} is blocked: discontinued on day {origin}")]
    Discontinued { day: u8, origin: u8 },
    #[error("a code or initials value is required")]
    EmptyCode,
    #[error("`{code}` is longer than {max} characters")]
    CodeTooLong { code: String, max: usize },
    #[error("{field} cannot be entered before {}", field_list(.missing))]
    PrnPrerequisites {
        field: PrnField,
        missing: Vec<PrnField>,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("`{input}` is not a valid {field}")]
    InvalidValue { field: &'static str, input: String },
    #[error("stop date {stop} is before start date {start}")]
    StopBeforeStart { start: String, stop: String },
    #[error("this operation only applies to {expected} rows")]
    WrongKind { expected: &'static str },
    #[error("`{0}` is a built-in legend code")]
    ReservedLegendCode(String),
    #[error("invalid reporting month `{0}`, expected YYYY-MM")]
    InvalidMonth(String),
    #[error("line item {0} is not on this form")]
    UnknownLineItem(i64),
    #[error("day {0} is not a discontinuation origin")]
    NotDiscontinued(u8),
}

fn field_list(fields: &[PrnField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Any failure of an engine operation.
#[derive(Debug, Error)]
pub enum MarError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarError {
    /// True when the failure was a rejected edit rather than a store problem.
    pub fn is_validation(&self) -> bool {
        matches!(self, MarError::Validation(_))
    }
}

pub type MarResult<T> = Result<T, MarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisite_message_names_every_missing_field() {
        let err = ValidationError::PrnPrerequisites {
            field: PrnField::Initials,
            missing: vec![PrnField::Hour, PrnField::Result],
        };
        assert_eq!(
            err.to_string(),
            "initials cannot be entered before hour and result"
        );
    }

    #[test]
    fn store_errors_are_not_validation_errors() {
        let err: MarError = StoreError::NotFound {
            entity: "form",
            id: 7,
        }
        .into();
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "form 7 not found");
    }
}
