//! The PRN (as-needed) log and its field gates.
//!
//! Fields of a PRN entry are filled in a fixed order: initials need an hour and
//! a result, and the staff signature needs initials. Writing initials that
//! appear in the form's signature legend fills in the signature as well.

use super::{EditOutcome, LogStoreError, MarEditor, Resync};
use crate::db::RecordStore;
use crate::error::{MarResult, ValidationError};
use crate::models::{format_hour, parse_date, parse_hour, NewPrnRecord, PrnField, PrnPatch, PrnRecord};
use std::collections::HashMap;
use tracing::debug;

/// Fields that must be filled before `field` may be edited.
pub fn prerequisites(field: PrnField) -> &'static [PrnField] {
    match field {
        PrnField::Initials => &[PrnField::Hour, PrnField::Result],
        PrnField::StaffSignature => &[PrnField::Initials],
        _ => &[],
    }
}

/// Rejects an edit of `field` while any prerequisite is blank.
pub fn check_gate(
    field: PrnField,
    is_filled: impl Fn(PrnField) -> bool,
) -> Result<(), ValidationError> {
    let missing: Vec<PrnField> = prerequisites(field)
        .iter()
        .copied()
        .filter(|&f| !is_filled(f))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::PrnPrerequisites { field, missing })
    }
}

/// Initials to staff signature, learned from earlier PRN entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureLegend {
    entries: HashMap<String, String>,
}

impl SignatureLegend {
    /// Builds the legend from entries in log order. Later entries win.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PrnRecord>) -> Self {
        let mut entries = HashMap::new();
        for record in records {
            if let (Some(initials), Some(signature)) = (
                record.value(PrnField::Initials),
                record.value(PrnField::StaffSignature),
            ) {
                entries.insert(initials.trim().to_uppercase(), signature);
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, initials: &str) -> Option<&str> {
        self.entries
            .get(&initials.trim().to_uppercase())
            .map(String::as_str)
    }

    /// Initials and signatures, sorted by initials.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(initials, signature)| (initials.as_str(), signature.as_str()))
            .collect();
        entries.sort_unstable();
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_prn_hour(value: Option<String>) -> Result<Option<String>, ValidationError> {
    blank_to_none(value)
        .map(|raw| {
            parse_hour(&raw)
                .map(format_hour)
                .ok_or(ValidationError::InvalidValue {
                    field: "hour",
                    input: raw,
                })
        })
        .transpose()
}

impl<S: RecordStore> MarEditor<'_, S> {
    pub fn prn_records(&self, form_id: i64) -> MarResult<Vec<PrnRecord>> {
        Ok(self.store.prn_records_for_form(form_id)?)
    }

    pub fn signature_legend(&self, form_id: i64) -> MarResult<SignatureLegend> {
        let records = self.store.prn_records_for_form(form_id)?;
        Ok(SignatureLegend::from_records(&records))
    }

    /// Logs a new PRN entry.
    ///
    /// Medication and reason are required. Gated fields follow the same rules
    /// as [`Self::edit_prn_field`]. A blank signature is filled from the
    /// signature legend when the initials are known.
    pub fn add_prn_record(&self, draft: NewPrnRecord) -> MarResult<(PrnRecord, EditOutcome)> {
        self.store.get_form(draft.form_id)?;
        let mut record = NewPrnRecord {
            hour: normalize_prn_hour(draft.hour)?,
            initials: blank_to_none(draft.initials).map(|i| i.to_uppercase()),
            medication: draft.medication.trim().to_string(),
            reason: draft.reason.trim().to_string(),
            result: blank_to_none(draft.result),
            staff_signature: blank_to_none(draft.staff_signature),
            note: blank_to_none(draft.note),
            ..draft
        };
        if record.medication.is_empty() {
            return Err(ValidationError::MissingField("medication").into());
        }
        if record.reason.is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }

        if record.staff_signature.is_none() {
            if let Some(initials) = &record.initials {
                let legend = self.signature_legend(record.form_id)?;
                record.staff_signature = legend.lookup(initials).map(str::to_string);
            }
        }
        let filled = |field: PrnField| match field {
            PrnField::Hour => record.hour.is_some(),
            PrnField::Result => record.result.is_some(),
            PrnField::Initials => record.initials.is_some(),
            PrnField::StaffSignature => record.staff_signature.is_some(),
            _ => true,
        };
        for field in [PrnField::Initials, PrnField::StaffSignature] {
            if filled(field) {
                check_gate(field, filled)?;
            }
        }

        let saved = self
            .store
            .insert_prn_record(&record)
            .logged("insert PRN record")?;
        debug!(
            form_id = saved.form_id,
            entry_number = saved.entry_number,
            "PRN entry logged"
        );
        let outcome = EditOutcome::applied(Resync::Form(saved.form_id));
        Ok((saved, outcome))
    }

    /// Sets one field of a PRN entry from user input. Blank input clears it.
    ///
    /// # Errors
    ///
    /// Fails with [`ValidationError::PrnPrerequisites`] when a gated field is
    /// edited, or cleared, before its prerequisites are filled. Medication and
    /// reason cannot be cleared, and dates and hours must parse.
    pub fn edit_prn_field(
        &self,
        record_id: i64,
        field: PrnField,
        input: &str,
    ) -> MarResult<(PrnRecord, EditOutcome)> {
        let record = self.store.get_prn_record(record_id)?;
        check_gate(field, |f| record.value(f).is_some())?;

        let text = blank_to_none(Some(input.to_string()));
        let mut patch = PrnPatch::default();
        match field {
            PrnField::Date => {
                let raw = text.ok_or(ValidationError::MissingField("date"))?;
                let date = parse_date(&raw).map_err(|_| ValidationError::InvalidValue {
                    field: "date",
                    input: raw.clone(),
                })?;
                patch.date = Some(date);
            }
            PrnField::Hour => patch.hour = Some(normalize_prn_hour(text)?),
            PrnField::Medication => {
                patch.medication = Some(text.ok_or(ValidationError::MissingField("medication"))?)
            }
            PrnField::Reason => {
                patch.reason = Some(text.ok_or(ValidationError::MissingField("reason"))?)
            }
            PrnField::Result => patch.result = Some(text),
            PrnField::Initials => {
                let initials = text.map(|i| i.to_uppercase());
                match &initials {
                    Some(initials) => {
                        let legend = self.signature_legend(record.form_id)?;
                        if let Some(signature) = legend.lookup(initials) {
                            patch.staff_signature = Some(Some(signature.to_string()));
                        }
                    }
                    // A signature cannot outlive the initials it belongs to.
                    None => patch.staff_signature = Some(None),
                }
                patch.initials = Some(initials);
            }
            PrnField::StaffSignature => patch.staff_signature = Some(text),
            PrnField::Note => patch.note = Some(text),
        }

        let updated = self
            .store
            .update_prn_record(record.id, &patch)
            .logged("update PRN record")?;
        debug!(
            form_id = updated.form_id,
            entry_number = updated.entry_number,
            field = %field,
            "PRN entry edited"
        );
        Ok((updated, EditOutcome::applied(Resync::Form(record.form_id))))
    }

    /// Deletes a PRN entry. Other entries keep their numbers.
    pub fn delete_prn_record(&self, record_id: i64) -> MarResult<EditOutcome> {
        let record = self.store.get_prn_record(record_id)?;
        self.store
            .delete_prn_record(record.id)
            .logged("delete PRN record")?;
        debug!(form_id = record.form_id, entry_number = record.entry_number, "PRN entry deleted");
        Ok(EditOutcome::applied(Resync::Form(record.form_id)))
    }
}
