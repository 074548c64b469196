//! The MAR grid engine.
//!
//! [`MarEditor`] borrows a [`RecordStore`] and applies the clinical editing
//! rules on top of it: active windows, the per-cell administration state
//! machine, the discontinuation cascade, display ordering and the PRN field
//! gates.
//!
//! The store is the source of truth. Every mutating operation returns an
//! [`EditOutcome`] whose [`Resync`] names the slice of state the caller must
//! re-read (with [`MarEditor::reload_row`] or [`MarEditor::load_grid`], or in
//! one step with [`MarEditor::resync`]) before rendering again.

pub mod administration;
pub mod discontinuation;
pub mod forms;
pub mod grid;
pub mod legend;
pub mod ordering;
pub mod prn;
pub mod vitals;
pub mod window;

pub use administration::{CellCommand, Transition};
pub use forms::FormCreation;
pub use grid::{CellView, GridRow, MarGrid};
pub use legend::cycle_code;
pub use ordering::{InsertKey, Placement};
pub use prn::SignatureLegend;

use crate::config::GridConfig;
use crate::db::RecordStore;
use crate::error::StoreError;
use tracing::error;

/// The slice of state that is stale after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// Re-read one line-item and its marks.
    LineItem(i64),
    /// Re-read the whole form.
    Form(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStatus {
    Applied,
    /// The command was valid but had nothing to do.
    Unchanged,
}

/// Result of a mutating engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub status: EditStatus,
    pub resync: Resync,
    /// Set when the primary write succeeded but a follow-up write did not.
    pub warning: Option<String>,
}

impl EditOutcome {
    pub fn applied(resync: Resync) -> Self {
        Self {
            status: EditStatus::Applied,
            resync,
            warning: None,
        }
    }

    pub fn unchanged(resync: Resync) -> Self {
        Self {
            status: EditStatus::Unchanged,
            resync,
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn is_applied(&self) -> bool {
        self.status == EditStatus::Applied
    }
}

/// Editing session over one record store.
pub struct MarEditor<'s, S: RecordStore> {
    store: &'s S,
    settings: GridConfig,
    clinician: Option<String>,
}

impl<'s, S: RecordStore> MarEditor<'s, S> {
    pub fn new(store: &'s S, settings: GridConfig) -> Self {
        Self {
            store,
            settings,
            clinician: None,
        }
    }

    /// Attributes custom legend codes to a clinician.
    pub fn with_clinician(mut self, clinician_id: impl Into<String>) -> Self {
        self.clinician = Some(clinician_id.into());
        self
    }

    pub fn settings(&self) -> &GridConfig {
        &self.settings
    }

    pub fn clinician(&self) -> Option<&str> {
        self.clinician.as_deref()
    }

    fn is_discontinuation_code(&self, code: &str) -> bool {
        code.trim().eq_ignore_ascii_case(&self.settings.discontinued_code)
    }
}

/// Logs a failed store write before it is propagated.
trait LogStoreError<T> {
    fn logged(self, operation: &'static str) -> Result<T, StoreError>;
}

impl<T> LogStoreError<T> for Result<T, StoreError> {
    fn logged(self, operation: &'static str) -> Result<T, StoreError> {
        self.inspect_err(|e| error!(operation, error = %e, "record store write failed"))
    }
}
