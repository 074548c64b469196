//! Form lifecycle.

use super::{LogStoreError, MarEditor};
use crate::db::RecordStore;
use crate::error::{MarResult, ValidationError};
use crate::models::{ClinicalDetails, Form, NewForm};
use tracing::{debug, info};

/// Result of [`MarEditor::create_form`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormCreation {
    Created(Form),
    /// A form for the same patient and month exists. Nothing was written;
    /// repeat the call with confirmation to create another one.
    DuplicateExists(Form),
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_details(details: &ClinicalDetails) -> ClinicalDetails {
    ClinicalDetails {
        diagnosis: trimmed(&details.diagnosis),
        diet: trimmed(&details.diet),
        allergies: trimmed(&details.allergies),
        physician: trimmed(&details.physician),
        facility: trimmed(&details.facility),
        comments: trimmed(&details.comments),
    }
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// Creates the form for a patient and month.
    ///
    /// The store allows several forms per patient and month; the editor only
    /// creates a second one when `confirm_duplicate` is set.
    pub fn create_form(&self, draft: &NewForm, confirm_duplicate: bool) -> MarResult<FormCreation> {
        if draft.patient.patient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("patient id").into());
        }
        if draft.patient.name.trim().is_empty() {
            return Err(ValidationError::MissingField("patient name").into());
        }
        let existing = self
            .store
            .forms_for_patient_month(&draft.patient.patient_id, draft.month)?;
        if let Some(form) = existing.into_iter().next() {
            if !confirm_duplicate {
                debug!(form_id = form.id, month = %draft.month, "form already exists");
                return Ok(FormCreation::DuplicateExists(form));
            }
        }

        let mut draft = draft.clone();
        draft.details = clean_details(&draft.details);
        let form = self.store.insert_form(&draft).logged("insert form")?;
        info!(form_id = form.id, month = %form.month, "form created");
        Ok(FormCreation::Created(form))
    }

    pub fn update_form_details(&self, form_id: i64, details: &ClinicalDetails) -> MarResult<Form> {
        let form = self
            .store
            .update_form(form_id, &clean_details(details))
            .logged("update form")?;
        debug!(form_id, "form details updated");
        Ok(form)
    }

    pub fn forms(&self) -> MarResult<Vec<Form>> {
        Ok(self.store.list_forms()?)
    }

    /// Deletes a form with all its rows, marks, PRN entries and readings.
    pub fn delete_form(&self, form_id: i64) -> MarResult<()> {
        self.store.delete_form(form_id).logged("delete form")?;
        info!(form_id, "form deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;

    #[test]
    fn second_form_for_a_month_needs_confirmation() {
        let store = store();
        let editor = editor(&store);
        let draft = new_form("patient-1", march());

        let FormCreation::Created(first) = editor.create_form(&draft, false).unwrap() else {
            panic!("first form should be created");
        };
        assert_eq!(
            editor.create_form(&draft, false).unwrap(),
            FormCreation::DuplicateExists(first.clone())
        );
        assert_eq!(editor.forms().unwrap().len(), 1);

        let FormCreation::Created(second) = editor.create_form(&draft, true).unwrap() else {
            panic!("confirmed duplicate should be created");
        };
        assert_ne!(first.id, second.id);
        assert_eq!(editor.forms().unwrap().len(), 2);
    }

    #[test]
    fn details_are_trimmed_and_blank_fields_cleared() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let details = ClinicalDetails {
            diagnosis: Some("  Hypertension ".into()),
            diet: Some("   ".into()),
            ..Default::default()
        };
        let updated = editor.update_form_details(form.id, &details).unwrap();
        assert_eq!(updated.details.diagnosis.as_deref(), Some("Hypertension"));
        assert_eq!(updated.details.diet, None);
    }

    #[test]
    fn patient_identity_is_required() {
        let store = store();
        let editor = editor(&store);
        let mut draft = new_form("  ", march());
        assert!(editor.create_form(&draft, true).is_err());
        draft.patient.patient_id = "patient-2".into();
        draft.patient.name = String::new();
        assert!(editor.create_form(&draft, true).is_err());
    }
}
