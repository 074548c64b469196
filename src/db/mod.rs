//! Record store for the MAR editor.
//!
//! The engine never talks to SQLite directly. It goes through [`RecordStore`],
//! a table-shaped interface over the six entity collections (forms, line-items,
//! administration marks, PRN records, vital-signs readings and custom legends).
//! [`SqliteStore`] is the production implementation, backed by `rusqlite`.
//!
//! Every insert returns the persisted row, including its generated id and
//! timestamps. Reads that address a row by id fail with
//! [`StoreError::NotFound`]; reads by natural key return `Option`.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{
    AdministrationMark, ClinicalDetails, CustomLegend, Form, LineItem, LineItemPatch, MarkDraft,
    MarkPatch, NewForm, NewLegend, NewLineItem, NewPrnRecord, PrnPatch, PrnRecord,
    ReportingMonth, VitalSigns, VitalSignsReading,
};

/// What a bulk mark upsert does when a (line-item, day) pair already has a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Replace the existing row's status, initials, note and timestamps.
    Overwrite,
    /// Fail the whole batch. Nothing from the batch is written.
    Reject,
}

/// Filtered read, insert, update, upsert and delete over the MAR collections.
pub trait RecordStore {
    /// Inserts a new form.
    ///
    /// The store does not enforce one form per (patient, month); duplicate
    /// detection is the caller's job.
    fn insert_form(&self, form: &NewForm) -> Result<Form, StoreError>;

    fn get_form(&self, id: i64) -> Result<Form, StoreError>;

    /// Replaces the free-text clinical header of a form.
    fn update_form(&self, id: i64, details: &ClinicalDetails) -> Result<Form, StoreError>;

    /// All forms, newest reporting month first.
    fn list_forms(&self) -> Result<Vec<Form>, StoreError>;

    fn forms_for_patient_month(
        &self,
        patient_id: &str,
        month: ReportingMonth,
    ) -> Result<Vec<Form>, StoreError>;

    /// Deletes a form together with everything that belongs to it.
    fn delete_form(&self, id: i64) -> Result<(), StoreError>;

    fn insert_line_item(&self, item: &NewLineItem) -> Result<LineItem, StoreError>;

    /// Inserts several line-items in one transaction.
    ///
    /// # Errors
    ///
    /// If any insert fails, none of the items are persisted.
    fn insert_line_items(&self, items: &[NewLineItem]) -> Result<Vec<LineItem>, StoreError>;

    fn get_line_item(&self, id: i64) -> Result<LineItem, StoreError>;

    /// Line-items of a form, ascending by display order with unordered rows last.
    fn line_items_for_form(&self, form_id: i64) -> Result<Vec<LineItem>, StoreError>;

    fn update_line_item(&self, id: i64, patch: &LineItemPatch) -> Result<LineItem, StoreError>;

    /// Writes `(line_item_id, display_order)` pairs in one transaction.
    fn set_display_orders(&self, keys: &[(i64, i64)]) -> Result<(), StoreError>;

    /// Deletes a line-item and, first, every mark that belongs to it.
    fn delete_line_item(&self, id: i64) -> Result<(), StoreError>;

    fn marks_for_line_item(&self, line_item_id: i64)
        -> Result<Vec<AdministrationMark>, StoreError>;

    fn marks_for_line_items(&self, ids: &[i64]) -> Result<Vec<AdministrationMark>, StoreError>;

    fn marks_for_form(&self, form_id: i64) -> Result<Vec<AdministrationMark>, StoreError>;

    /// The mark for one cell, if the cell has ever been written.
    fn mark_for_cell(
        &self,
        line_item_id: i64,
        day: u8,
    ) -> Result<Option<AdministrationMark>, StoreError>;

    fn update_mark(&self, id: i64, patch: &MarkPatch) -> Result<AdministrationMark, StoreError>;

    /// Writes a batch of marks keyed by (line-item, day) in one transaction.
    ///
    /// # Arguments
    ///
    /// * `drafts` - The marks to write.
    /// * `on_conflict` - Whether an existing row for the same cell is replaced
    ///   or fails the batch. Duplicates are never skipped silently.
    ///
    /// # Returns
    ///
    /// The persisted rows, in the order of `drafts`.
    fn upsert_marks(
        &self,
        drafts: &[MarkDraft],
        on_conflict: OnConflict,
    ) -> Result<Vec<AdministrationMark>, StoreError>;

    fn delete_mark(&self, id: i64) -> Result<(), StoreError>;

    /// Removes every mark of a line-item, returning how many were deleted.
    fn delete_marks_for_line_item(&self, line_item_id: i64) -> Result<usize, StoreError>;

    /// PRN entries of a form, ordered by entry number.
    fn prn_records_for_form(&self, form_id: i64) -> Result<Vec<PrnRecord>, StoreError>;

    fn get_prn_record(&self, id: i64) -> Result<PrnRecord, StoreError>;

    /// Inserts a PRN entry and assigns its entry number.
    fn insert_prn_record(&self, record: &NewPrnRecord) -> Result<PrnRecord, StoreError>;

    fn update_prn_record(&self, id: i64, patch: &PrnPatch) -> Result<PrnRecord, StoreError>;

    /// Deletes a PRN entry. Remaining entries keep their numbers.
    fn delete_prn_record(&self, id: i64) -> Result<(), StoreError>;

    fn vitals_for_form(&self, form_id: i64) -> Result<Vec<VitalSignsReading>, StoreError>;

    fn vitals_for_day(&self, form_id: i64, day: u8)
        -> Result<Option<VitalSignsReading>, StoreError>;

    /// Inserts or replaces the reading for (form, day).
    fn upsert_vitals_reading(
        &self,
        form_id: i64,
        day: u8,
        values: &VitalSigns,
    ) -> Result<VitalSignsReading, StoreError>;

    fn legends_for_clinician(&self, clinician_id: &str) -> Result<Vec<CustomLegend>, StoreError>;

    fn insert_legend(&self, legend: &NewLegend) -> Result<CustomLegend, StoreError>;

    fn delete_legend(&self, id: i64) -> Result<(), StoreError>;
}

/// Builders shared by the unit tests of the store and the engine.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::{
        LineItemKind, MedicationSchedule, PatientSnapshot, VitalsEntry,
    };
    use time::{Date, Month};

    pub fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    pub fn new_form(patient_id: &str, month: ReportingMonth) -> NewForm {
        NewForm {
            patient: PatientSnapshot {
                patient_id: patient_id.to_string(),
                name: "Jane Roe".to_string(),
                record_number: "MRN-0042".to_string(),
                date_of_birth: None,
                sex: Some("F".to_string()),
            },
            month,
            details: ClinicalDetails::default(),
        }
    }

    pub fn march() -> ReportingMonth {
        ReportingMonth::new(2024, Month::March)
    }

    pub fn form(store: &SqliteStore) -> Form {
        store.insert_form(&new_form("patient-1", march())).unwrap()
    }

    pub fn medication(name: &str, start: Date, stop: Option<Date>) -> LineItemKind {
        LineItemKind::Medication(MedicationSchedule {
            name: name.to_string(),
            dosage: "10mg".to_string(),
            route: "PO".to_string(),
            start_date: start,
            stop_date: stop,
            frequency: Some(1),
            frequency_label: None,
        })
    }

    pub fn vitals() -> LineItemKind {
        LineItemKind::Vitals(VitalsEntry {
            label: "Blood pressure".to_string(),
            instructions: "Every morning".to_string(),
        })
    }

    pub fn line_item(store: &SqliteStore, form_id: i64, kind: LineItemKind, order: Option<i64>) -> LineItem {
        store
            .insert_line_item(&NewLineItem {
                form_id,
                kind,
                hour: None,
                notes: None,
                parameter: None,
                display_order: order,
            })
            .unwrap()
    }
}
