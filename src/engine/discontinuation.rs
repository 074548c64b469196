//! The discontinuation cascade.
//!
//! Writing the discontinuation code on day D of a medication blocks every later
//! day. The block is stored as placeholder marks (status Given, the
//! discontinuation code as initials, no administration time) for days D+1
//! through 31, written in one upsert keyed by (line-item, day). Existing marks
//! on those days are overwritten.
//!
//! For display the block is an overlay: a day is discontinued when an earlier
//! day of the same row carries the code, whatever is stored on the day itself.

use super::{EditOutcome, LogStoreError, MarEditor, Resync};
use crate::db::{OnConflict, RecordStore};
use crate::error::{MarResult, ValidationError};
use crate::models::{AdministrationMark, LineItem, MarkDraft, MarkStatus, GRID_DAYS};
use tracing::{info, warn};

fn is_code(mark: &AdministrationMark, code: &str) -> bool {
    mark.initials.trim().eq_ignore_ascii_case(code)
}

/// The earliest day before `day` that carries the discontinuation code.
pub fn discontinuation_origin(marks: &[AdministrationMark], day: u8, code: &str) -> Option<u8> {
    marks
        .iter()
        .filter(|m| m.day < day && is_code(m, code))
        .map(|m| m.day)
        .min()
}

pub fn is_discontinued(marks: &[AdministrationMark], day: u8, code: &str) -> bool {
    discontinuation_origin(marks, day, code).is_some()
}

/// The earliest day of the row that carries the code, if any.
pub fn first_discontinuation(marks: &[AdministrationMark], code: &str) -> Option<u8> {
    discontinuation_origin(marks, GRID_DAYS + 1, code)
}

/// Placeholder marks for every day after `origin`.
pub fn placeholder_drafts(line_item_id: i64, origin: u8, code: &str) -> Vec<MarkDraft> {
    (origin.saturating_add(1)..=GRID_DAYS)
        .map(|day| MarkDraft {
            line_item_id,
            day,
            status: MarkStatus::Given,
            initials: code.to_string(),
            note: None,
            administered_at: None,
        })
        .collect()
}

fn is_placeholder(mark: &AdministrationMark, code: &str) -> bool {
    mark.status == MarkStatus::Given && mark.administered_at.is_none() && is_code(mark, code)
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// Writes the placeholders after a freshly written origin mark. A failed
    /// write becomes a warning on `outcome`.
    pub(super) fn cascade_after_origin(
        &self,
        item: &LineItem,
        origin: u8,
        outcome: EditOutcome,
    ) -> EditOutcome {
        match self.write_placeholders(item.id, origin) {
            Ok(written) => {
                info!(
                    form_id = item.form_id,
                    line_item_id = item.id,
                    day = origin,
                    written,
                    "medication discontinued"
                );
                outcome
            }
            Err(e) => {
                warn!(
                    form_id = item.form_id,
                    line_item_id = item.id,
                    day = origin,
                    error = %e,
                    "discontinuation recorded but later days were not blocked"
                );
                outcome.with_warning(format!(
                    "Discontinued on day {origin}, but blocking later days failed: {e}. \
                     Re-enter the code to retry."
                ))
            }
        }
    }

    fn write_placeholders(&self, line_item_id: i64, origin: u8) -> MarResult<usize> {
        let drafts = placeholder_drafts(line_item_id, origin, &self.settings.discontinued_code);
        let written = self
            .store
            .upsert_marks(&drafts, OnConflict::Overwrite)
            .logged("discontinuation cascade")?;
        Ok(written.len())
    }

    /// Re-runs the cascade from an existing origin mark.
    ///
    /// Running it again after a success changes nothing but the update times.
    ///
    /// # Errors
    ///
    /// Fails with [`ValidationError::NotDiscontinued`] when `origin` does not
    /// carry the discontinuation code, and with any store error of the write.
    pub fn cascade(&self, line_item_id: i64, origin: u8) -> MarResult<EditOutcome> {
        let item = self.store.get_line_item(line_item_id)?;
        if item.is_vitals() {
            return Err(ValidationError::WrongKind {
                expected: "medication",
            }
            .into());
        }
        let origin_mark = self.store.mark_for_cell(item.id, origin)?;
        let code = &self.settings.discontinued_code;
        if !origin_mark.is_some_and(|m| is_code(&m, code)) {
            return Err(ValidationError::NotDiscontinued(origin).into());
        }
        let written = self.write_placeholders(item.id, origin)?;
        info!(line_item_id = item.id, day = origin, written, "discontinuation cascade re-run");
        Ok(EditOutcome::applied(Resync::LineItem(item.id)))
    }

    /// Undoes a discontinuation: deletes the origin mark and the placeholders
    /// after it. Marks with an administration time are kept.
    ///
    /// # Errors
    ///
    /// `origin` must be the row's earliest discontinuation day.
    pub fn reinstate(&self, line_item_id: i64, origin: u8) -> MarResult<EditOutcome> {
        let item = self.store.get_line_item(line_item_id)?;
        if item.is_vitals() {
            return Err(ValidationError::WrongKind {
                expected: "medication",
            }
            .into());
        }
        let code = &self.settings.discontinued_code;
        let marks = self.store.marks_for_line_item(item.id)?;
        if let Some(earlier) = discontinuation_origin(&marks, origin, code) {
            return Err(ValidationError::Discontinued {
                day: origin,
                origin: earlier,
            }
            .into());
        }
        let Some(origin_mark) = marks.iter().find(|m| m.day == origin && is_code(m, code)) else {
            return Err(ValidationError::NotDiscontinued(origin).into());
        };

        let mut doomed: Vec<&AdministrationMark> = marks
            .iter()
            .filter(|m| m.day > origin && is_placeholder(m, code))
            .collect();
        // Latest first, so an interrupted run still leaves the overlay in place.
        doomed.sort_by(|a, b| b.day.cmp(&a.day));
        for mark in &doomed {
            self.store.delete_mark(mark.id).logged("reinstate")?;
        }
        self.store.delete_mark(origin_mark.id).logged("reinstate")?;

        info!(
            form_id = item.form_id,
            line_item_id = item.id,
            day = origin,
            removed = doomed.len() + 1,
            "medication reinstated"
        );
        Ok(EditOutcome::applied(Resync::LineItem(item.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;
    use crate::engine::{CellCommand, CellView, EditStatus};
    use proptest::prelude::*;
    use time::macros::date;
    use time::OffsetDateTime;

    fn dc() -> CellCommand {
        CellCommand::SetCode {
            code: "DC".into(),
            note: None,
        }
    }

    fn code(initials: &str) -> CellCommand {
        CellCommand::SetCode {
            code: initials.into(),
            note: None,
        }
    }

    fn snapshot(marks: &[AdministrationMark]) -> Vec<(u8, MarkStatus, String, bool)> {
        marks
            .iter()
            .map(|m| (m.day, m.status, m.initials.clone(), m.administered_at.is_some()))
            .collect()
    }

    #[test]
    fn lisinopril_discontinued_on_the_fifth() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 05), None), None);

        let outcome = editor.edit_cell(item.id, 5, dc()).unwrap();
        assert_eq!(outcome.status, EditStatus::Applied);
        assert_eq!(outcome.warning, None);

        let grid = editor.load_grid(form.id).unwrap();
        let row = grid.row(item.id).unwrap();
        assert_eq!(row.cell(4), Some(&CellView::Inactive));
        assert!(matches!(row.cell(5), Some(CellView::DiscontinuedOrigin(_))));
        assert_eq!(row.cell(6), Some(&CellView::Blocked { origin: 5 }));
        assert_eq!(row.cell(31), Some(&CellView::Blocked { origin: 5 }));

        let marks = store.marks_for_line_item(item.id).unwrap();
        assert_eq!(marks.len(), 27);
        assert!(marks[0].administered_at.is_some());
        assert!(marks[1..].iter().all(|m| m.administered_at.is_none() && m.initials == "DC"));
    }

    #[test]
    fn blocked_days_reject_edits() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 01), None), None);
        editor.edit_cell(item.id, 10, dc()).unwrap();

        let err = editor.edit_cell(item.id, 12, code("AB")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::MarError::Validation(ValidationError::Discontinued { day: 12, origin: 10 })
        ));
        editor.edit_cell(item.id, 9, code("AB")).unwrap();
    }

    #[test]
    fn cascade_overwrites_later_administrations() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Warfarin", date!(2024 - 03 - 01), None), None);
        editor.edit_cell(item.id, 8, code("AB")).unwrap();
        editor.edit_cell(item.id, 5, dc()).unwrap();

        let day8 = store.mark_for_cell(item.id, 8).unwrap().unwrap();
        assert_eq!(day8.initials, "DC");
        assert_eq!(day8.administered_at, None);
    }

    #[test]
    fn rerunning_the_cascade_is_idempotent() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 01), None), None);
        editor.edit_cell(item.id, 20, dc()).unwrap();
        let once = snapshot(&store.marks_for_line_item(item.id).unwrap());

        editor.cascade(item.id, 20).unwrap();
        let twice = snapshot(&store.marks_for_line_item(item.id).unwrap());
        assert_eq!(once, twice);

        assert!(matches!(
            editor.cascade(item.id, 19),
            Err(crate::error::MarError::Validation(ValidationError::NotDiscontinued(19)))
        ));
    }

    #[test]
    fn failed_cascade_keeps_the_origin_and_warns() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 01), None), None);
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER fail_cascade BEFORE INSERT ON administration_marks \
                 WHEN NEW.day > 5 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )
            .unwrap();

        let outcome = editor.edit_cell(item.id, 5, dc()).unwrap();
        assert!(outcome.is_applied());
        assert!(outcome.warning.is_some());

        let marks = store.marks_for_line_item(item.id).unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].day, 5);
        assert_eq!(marks[0].initials, "DC");

        // The overlay still blocks the later days.
        let grid = editor.load_grid(form.id).unwrap();
        assert_eq!(grid.row(item.id).unwrap().cell(6), Some(&CellView::Blocked { origin: 5 }));
    }

    #[test]
    fn reinstating_removes_only_placeholders() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 01), None), None);
        editor.edit_cell(item.id, 3, code("AB")).unwrap();
        editor.edit_cell(item.id, 5, dc()).unwrap();
        // A real administration written over a placeholder through the store.
        store
            .upsert_marks(
                &[MarkDraft {
                    line_item_id: item.id,
                    day: 9,
                    status: MarkStatus::Given,
                    initials: "DC".into(),
                    note: None,
                    administered_at: Some(OffsetDateTime::now_utc()),
                }],
                OnConflict::Overwrite,
            )
            .unwrap();

        assert!(editor.reinstate(item.id, 6).is_err());
        editor.reinstate(item.id, 5).unwrap();

        let days: Vec<u8> = store
            .marks_for_line_item(item.id)
            .unwrap()
            .iter()
            .map(|m| m.day)
            .collect();
        assert_eq!(days, vec![3, 9]);
    }

    fn mark_on(day: u8, initials: &str) -> AdministrationMark {
        AdministrationMark {
            id: i64::from(day),
            line_item_id: 1,
            day,
            status: MarkStatus::Given,
            initials: initials.into(),
            note: None,
            administered_at: None,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    proptest! {
        #[test]
        fn overlay_covers_exactly_the_days_after_the_earliest_code(
            origin in 1u8..=31,
            later in proptest::collection::vec(1u8..=31, 0..4),
            day in 1u8..=31,
        ) {
            let mut marks = vec![mark_on(origin, "DC")];
            marks.extend(later.iter().filter(|&&d| d > origin).map(|&d| mark_on(d, "dc")));
            prop_assert_eq!(is_discontinued(&marks, day, "DC"), day > origin);
            if day > origin {
                prop_assert_eq!(discontinuation_origin(&marks, day, "DC"), Some(origin));
            }
            prop_assert_eq!(first_discontinuation(&marks, "DC"), Some(origin));
        }
    }

    #[test]
    fn placeholders_start_the_day_after_the_origin() {
        let drafts = placeholder_drafts(4, 29, "DC");
        let days: Vec<u8> = drafts.iter().map(|d| d.day).collect();
        assert_eq!(days, vec![30, 31]);
        assert!(placeholder_drafts(4, 31, "DC").is_empty());
    }
}
