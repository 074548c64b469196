//! The per-cell administration state machine.
//!
//! A cell is either unset (no stored mark) or holds a mark with status Given,
//! Not Given or PRN. The discontinued state is never stored; it is an overlay
//! computed from the row's marks (see [`super::discontinuation`]).

use super::discontinuation::discontinuation_origin;
use super::window::is_active;
use super::{EditOutcome, LogStoreError, MarEditor, Resync};
use crate::config::GridConfig;
use crate::db::{OnConflict, RecordStore};
use crate::error::{MarResult, ValidationError};
use crate::models::{
    AdministrationMark, LineItem, LineItemKind, MarkDraft, MarkPatch, MarkStatus, ReportingMonth,
    GRID_DAYS,
};
use std::slice;
use time::OffsetDateTime;
use tracing::debug;

/// A clinician's action on one grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellCommand {
    /// Record a code or initials with status Given. On a vitals row the text
    /// is stored verbatim and empty text clears the cell.
    SetCode { code: String, note: Option<String> },
    /// Mark an existing entry Not Given, optionally replacing its initials.
    SetNotGiven {
        initials: Option<String>,
        note: Option<String>,
    },
    /// Record an as-needed administration.
    SetPrn {
        initials: String,
        note: Option<String>,
    },
    /// The double-click gesture: demotes a Given medication mark to Not Given.
    Activate,
    /// Remove the mark so the cell is unset again.
    Clear,
}

/// The store write a command resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Insert(MarkDraft),
    Update { id: i64, patch: MarkPatch },
    Delete(i64),
    Noop,
}

/// Rejects edits on days outside the grid, outside the item's active window
/// or under a discontinuation overlay. The active-window check comes first.
pub fn check_editable(
    item: &LineItem,
    month: ReportingMonth,
    day: u8,
    marks: &[AdministrationMark],
    settings: &GridConfig,
) -> Result<(), ValidationError> {
    if !(1..=GRID_DAYS).contains(&day) {
        return Err(ValidationError::DayOutOfRange(day));
    }
    if !is_active(item, month, day) {
        return Err(ValidationError::InactiveDay {
            item: item.display_name(),
            day,
        });
    }
    if item.is_vitals() {
        return Ok(());
    }
    match discontinuation_origin(marks, day, &settings.discontinued_code) {
        Some(origin) => Err(ValidationError::Discontinued { day, origin }),
        None => Ok(()),
    }
}

/// Upper-cases and length-checks a medication code.
pub fn normalize_code(raw: &str, settings: &GridConfig) -> Result<String, ValidationError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    if code.chars().count() > settings.max_initials_len {
        return Err(ValidationError::CodeTooLong {
            code,
            max: settings.max_initials_len,
        });
    }
    Ok(code)
}

/// Decides what `command` does to the cell `(item, day)` given its current mark.
///
/// Pure: the caller supplies the clock and performs the returned transition.
pub fn plan_transition(
    item: &LineItem,
    day: u8,
    existing: Option<&AdministrationMark>,
    command: &CellCommand,
    settings: &GridConfig,
    now: OffsetDateTime,
) -> Result<Transition, ValidationError> {
    let write = |status: MarkStatus,
                 initials: String,
                 note: &Option<String>,
                 administered_at: Option<OffsetDateTime>| match existing {
        Some(mark) => Transition::Update {
            id: mark.id,
            patch: MarkPatch {
                status: Some(status),
                initials: Some(initials),
                note: note.clone().map(Some),
                administered_at: Some(administered_at),
            },
        },
        None => Transition::Insert(MarkDraft {
            line_item_id: item.id,
            day,
            status,
            initials,
            note: note.clone(),
            administered_at,
        }),
    };
    let clear = || match existing {
        Some(mark) => Transition::Delete(mark.id),
        None => Transition::Noop,
    };

    let transition = match (command, &item.kind) {
        (CellCommand::SetCode { code, note }, LineItemKind::Vitals(_)) => {
            if code.trim().is_empty() {
                clear()
            } else {
                write(MarkStatus::Given, code.clone(), note, Some(now))
            }
        }
        (CellCommand::SetCode { code, note }, LineItemKind::Medication(_)) => {
            let code = normalize_code(code, settings)?;
            write(MarkStatus::Given, code, note, Some(now))
        }
        (CellCommand::SetNotGiven { initials, note }, kind) => match existing {
            None => Transition::Noop,
            Some(mark) => {
                let initials = match initials.as_deref().map(str::trim) {
                    Some(raw) if !raw.is_empty() => match kind {
                        LineItemKind::Medication(_) => normalize_code(raw, settings)?,
                        LineItemKind::Vitals(_) => raw.to_string(),
                    },
                    _ => mark.initials.clone(),
                };
                write(MarkStatus::NotGiven, initials, note, None)
            }
        },
        (CellCommand::SetPrn { .. }, LineItemKind::Vitals(_)) => {
            return Err(ValidationError::WrongKind {
                expected: "medication",
            })
        }
        (CellCommand::SetPrn { initials, note }, LineItemKind::Medication(_)) => {
            let initials = normalize_code(initials, settings)?;
            write(MarkStatus::Prn, initials, note, None)
        }
        (CellCommand::Activate, LineItemKind::Medication(_)) => match existing {
            Some(mark)
                if mark.status == MarkStatus::Given
                    && !mark
                        .initials
                        .eq_ignore_ascii_case(&settings.discontinued_code) =>
            {
                Transition::Update {
                    id: mark.id,
                    patch: MarkPatch {
                        status: Some(MarkStatus::NotGiven),
                        administered_at: Some(None),
                        ..Default::default()
                    },
                }
            }
            _ => Transition::Noop,
        },
        (CellCommand::Activate, LineItemKind::Vitals(_)) => Transition::Noop,
        (CellCommand::Clear, _) => clear(),
    };
    Ok(transition)
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// Applies a command to one cell.
    ///
    /// Writing the discontinuation code on a medication also runs the
    /// discontinuation cascade. A failure of that follow-up write is reported
    /// through [`EditOutcome::warning`]; the cell's own mark stays written.
    ///
    /// # Errors
    ///
    /// Returns a validation error for days that are out of range, inactive or
    /// blocked by a discontinuation, and for malformed codes. Store failures are
    /// propagated unchanged.
    pub fn edit_cell(
        &self,
        line_item_id: i64,
        day: u8,
        command: CellCommand,
    ) -> MarResult<EditOutcome> {
        let item = self.store.get_line_item(line_item_id)?;
        let form = self.store.get_form(item.form_id)?;
        let marks = self.store.marks_for_line_item(item.id)?;
        check_editable(&item, form.month, day, &marks, &self.settings)?;

        let existing = marks.iter().find(|m| m.day == day);
        let transition = plan_transition(
            &item,
            day,
            existing,
            &command,
            &self.settings,
            OffsetDateTime::now_utc(),
        )?;
        let resync = Resync::LineItem(item.id);

        let written = match transition {
            Transition::Noop => return Ok(EditOutcome::unchanged(resync)),
            Transition::Insert(draft) => self
                .store
                .upsert_marks(slice::from_ref(&draft), OnConflict::Overwrite)
                .logged("upsert mark")?
                .into_iter()
                .next(),
            Transition::Update { id, patch } => {
                Some(self.store.update_mark(id, &patch).logged("update mark")?)
            }
            Transition::Delete(id) => {
                self.store.delete_mark(id).logged("delete mark")?;
                None
            }
        };
        debug!(
            form_id = item.form_id,
            line_item_id = item.id,
            day,
            command = ?command,
            "cell edited"
        );

        let outcome = EditOutcome::applied(resync);
        match written {
            Some(mark)
                if !item.is_vitals()
                    && mark.status == MarkStatus::Given
                    && self.is_discontinuation_code(&mark.initials) =>
            {
                Ok(self.cascade_after_origin(&item, mark.day, outcome))
            }
            _ => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;
    use crate::engine::EditStatus;
    use time::macros::date;

    fn settings() -> GridConfig {
        GridConfig::default()
    }

    fn medication_item() -> LineItem {
        LineItem {
            id: 7,
            form_id: 1,
            kind: medication("Metformin", date!(2024 - 03 - 01), None),
            hour: None,
            notes: None,
            parameter: None,
            display_order: Some(10),
        }
    }

    fn mark(status: MarkStatus, initials: &str) -> AdministrationMark {
        AdministrationMark {
            id: 3,
            line_item_id: 7,
            day: 2,
            status,
            initials: initials.into(),
            note: Some("after meal".into()),
            administered_at: Some(OffsetDateTime::UNIX_EPOCH),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn plan(existing: Option<&AdministrationMark>, command: CellCommand) -> Transition {
        plan_transition(
            &medication_item(),
            2,
            existing,
            &command,
            &settings(),
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap()
    }

    #[test]
    fn set_code_inserts_an_upper_cased_given_mark() {
        let transition = plan(
            None,
            CellCommand::SetCode {
                code: " ab ".into(),
                note: None,
            },
        );
        let Transition::Insert(draft) = transition else {
            panic!("expected insert, got {transition:?}");
        };
        assert_eq!(draft.status, MarkStatus::Given);
        assert_eq!(draft.initials, "AB");
        assert_eq!(draft.administered_at, Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn codes_are_length_checked() {
        let command = CellCommand::SetCode {
            code: "ABCDE".into(),
            note: None,
        };
        let result = plan_transition(
            &medication_item(),
            2,
            None,
            &command,
            &settings(),
            OffsetDateTime::UNIX_EPOCH,
        );
        assert!(matches!(result, Err(ValidationError::CodeTooLong { max: 4, .. })));
    }

    #[test]
    fn not_given_without_a_mark_is_a_noop() {
        let command = CellCommand::SetNotGiven {
            initials: Some("AB".into()),
            note: None,
        };
        assert_eq!(plan(None, command), Transition::Noop);
    }

    #[test]
    fn not_given_keeps_prior_initials_unless_replaced() {
        let existing = mark(MarkStatus::Given, "AB");
        let keep = plan(
            Some(&existing),
            CellCommand::SetNotGiven {
                initials: None,
                note: None,
            },
        );
        let Transition::Update { patch, .. } = keep else {
            panic!("expected update");
        };
        assert_eq!(patch.initials.as_deref(), Some("AB"));
        assert_eq!(patch.note, None);

        let replace = plan(
            Some(&existing),
            CellCommand::SetNotGiven {
                initials: Some("cd".into()),
                note: None,
            },
        );
        let Transition::Update { patch, .. } = replace else {
            panic!("expected update");
        };
        assert_eq!(patch.initials.as_deref(), Some("CD"));
    }

    #[test]
    fn activate_demotes_given_to_not_given() {
        let existing = mark(MarkStatus::Given, "AB");
        let Transition::Update { id, patch } = plan(Some(&existing), CellCommand::Activate) else {
            panic!("expected update");
        };
        assert_eq!(id, 3);
        assert_eq!(patch.status, Some(MarkStatus::NotGiven));
        assert_eq!(patch.initials, None);
        assert_eq!(patch.administered_at, Some(None));

        let not_given = mark(MarkStatus::NotGiven, "AB");
        assert_eq!(plan(Some(&not_given), CellCommand::Activate), Transition::Noop);
        assert_eq!(plan(None, CellCommand::Activate), Transition::Noop);
    }

    #[test]
    fn activate_leaves_a_discontinuation_alone() {
        let existing = mark(MarkStatus::Given, "DC");
        assert_eq!(plan(Some(&existing), CellCommand::Activate), Transition::Noop);
    }

    #[test]
    fn vitals_text_is_verbatim_and_prn_is_refused() {
        let mut item = medication_item();
        item.kind = vitals();
        let text = CellCommand::SetCode {
            code: "120/80 sitting".into(),
            note: None,
        };
        let transition =
            plan_transition(&item, 2, None, &text, &settings(), OffsetDateTime::UNIX_EPOCH)
                .unwrap();
        let Transition::Insert(draft) = transition else {
            panic!("expected insert");
        };
        assert_eq!(draft.initials, "120/80 sitting");

        let prn = CellCommand::SetPrn {
            initials: "AB".into(),
            note: None,
        };
        assert!(matches!(
            plan_transition(&item, 2, None, &prn, &settings(), OffsetDateTime::UNIX_EPOCH),
            Err(ValidationError::WrongKind { .. })
        ));
    }

    #[test]
    fn not_given_on_a_fresh_cell_leaves_the_store_unchanged() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);

        let outcome = editor
            .edit_cell(
                item.id,
                3,
                CellCommand::SetNotGiven {
                    initials: Some("AB".into()),
                    note: None,
                },
            )
            .unwrap();
        assert_eq!(outcome.status, EditStatus::Unchanged);
        assert!(store.marks_for_line_item(item.id).unwrap().is_empty());
    }

    #[test]
    fn edits_before_the_start_date_are_rejected() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 05), None), None);

        let err = editor
            .edit_cell(
                item.id,
                4,
                CellCommand::SetCode {
                    code: "AB".into(),
                    note: None,
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.marks_for_line_item(item.id).unwrap().is_empty());
    }

    #[test]
    fn editing_a_cell_twice_keeps_one_mark() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        let set = |code: &str| CellCommand::SetCode {
            code: code.into(),
            note: None,
        };

        editor.edit_cell(item.id, 2, set("ab")).unwrap();
        let outcome = editor.edit_cell(item.id, 2, set("cd")).unwrap();
        assert_eq!(outcome.resync, Resync::LineItem(item.id));

        let marks = store.marks_for_line_item(item.id).unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].initials, "CD");

        editor.edit_cell(item.id, 2, CellCommand::Clear).unwrap();
        assert!(store.marks_for_line_item(item.id).unwrap().is_empty());
    }
}
