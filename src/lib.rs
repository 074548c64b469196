//! Medication Administration Record editor.
//!
//! The library holds everything except the terminal front end: the data
//! model, the [`db::RecordStore`] seam with its SQLite implementation, and the
//! [`engine::MarEditor`] that enforces the clinical editing rules of the
//! 31-day administration grid.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;

pub use db::{RecordStore, SqliteStore};
pub use engine::{EditOutcome, EditStatus, MarEditor, Resync};
pub use error::{MarError, MarResult, StoreError, ValidationError};
