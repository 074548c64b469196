//! The 31-column grid projection of a form.

use super::discontinuation::{discontinuation_origin, first_discontinuation};
use super::ordering::sort_line_items;
use super::window::is_active;
use super::{MarEditor, Resync};
use crate::config::GridConfig;
use crate::db::RecordStore;
use crate::error::MarResult;
use crate::models::{
    AdministrationMark, Form, LegendEntry, LineItem, MarkStatus, ReportingMonth, GRID_DAYS,
};
use std::collections::HashMap;

/// Marker shown on days blocked by a discontinuation.
pub const BLOCKED_MARKER: &str = "▒▒";

/// What one cell shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellView {
    /// Outside the row's active window.
    Inactive,
    /// Active, nothing recorded.
    Empty,
    Given(String),
    NotGiven(String),
    Prn(String),
    /// Free text on a vitals row.
    VitalsText(String),
    /// The day the discontinuation code was entered.
    DiscontinuedOrigin(String),
    /// After a discontinuation. Not editable.
    Blocked { origin: u8 },
}

impl CellView {
    fn project(
        item: &LineItem,
        month: ReportingMonth,
        day: u8,
        marks: &[AdministrationMark],
        settings: &GridConfig,
    ) -> Self {
        if !is_active(item, month, day) {
            return CellView::Inactive;
        }
        let code = &settings.discontinued_code;
        if !item.is_vitals() {
            if let Some(origin) = discontinuation_origin(marks, day, code) {
                return CellView::Blocked { origin };
            }
        }
        let Some(mark) = marks.iter().find(|m| m.day == day) else {
            return CellView::Empty;
        };
        let text = mark.initials.clone();
        match mark.status {
            MarkStatus::Given if item.is_vitals() => CellView::VitalsText(text),
            _ if !item.is_vitals() && text.trim().eq_ignore_ascii_case(code) => {
                CellView::DiscontinuedOrigin(text)
            }
            MarkStatus::Given => CellView::Given(text),
            MarkStatus::NotGiven => CellView::NotGiven(text),
            MarkStatus::Prn => CellView::Prn(text),
        }
    }

    /// Text to draw in the cell.
    pub fn label(&self) -> &str {
        match self {
            CellView::Inactive | CellView::Empty => "",
            CellView::Given(text)
            | CellView::NotGiven(text)
            | CellView::Prn(text)
            | CellView::VitalsText(text)
            | CellView::DiscontinuedOrigin(text) => text,
            CellView::Blocked { .. } => BLOCKED_MARKER,
        }
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self, CellView::Inactive | CellView::Blocked { .. })
    }
}

/// One line-item with its marks and projected cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub item: LineItem,
    marks: Vec<AdministrationMark>,
    cells: Vec<CellView>,
}

impl GridRow {
    pub fn build(
        item: LineItem,
        month: ReportingMonth,
        marks: Vec<AdministrationMark>,
        settings: &GridConfig,
    ) -> Self {
        let mut row = Self {
            item: item.clone(),
            marks: Vec::new(),
            cells: Vec::new(),
        };
        row.refresh(item, month, marks, settings);
        row
    }

    /// Replaces the row's item, marks and cells wholesale.
    pub fn refresh(
        &mut self,
        item: LineItem,
        month: ReportingMonth,
        mut marks: Vec<AdministrationMark>,
        settings: &GridConfig,
    ) {
        marks.sort_by_key(|m| m.day);
        self.cells = (1..=GRID_DAYS)
            .map(|day| CellView::project(&item, month, day, &marks, settings))
            .collect();
        self.item = item;
        self.marks = marks;
    }

    /// The cell for a 1-based day.
    pub fn cell(&self, day: u8) -> Option<&CellView> {
        usize::from(day)
            .checked_sub(1)
            .and_then(|index| self.cells.get(index))
    }

    pub fn mark(&self, day: u8) -> Option<&AdministrationMark> {
        self.marks.iter().find(|m| m.day == day)
    }

    /// The earliest discontinuation day of the row.
    pub fn discontinued_from(&self, settings: &GridConfig) -> Option<u8> {
        if self.item.is_vitals() {
            return None;
        }
        first_discontinuation(&self.marks, &settings.discontinued_code)
    }
}

/// A form as the clinician sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarGrid {
    pub form: Form,
    pub rows: Vec<GridRow>,
    pub legend: Vec<LegendEntry>,
}

impl MarGrid {
    pub fn row(&self, line_item_id: i64) -> Option<&GridRow> {
        self.rows.iter().find(|r| r.item.id == line_item_id)
    }

    pub fn row_index(&self, line_item_id: i64) -> Option<usize> {
        self.rows.iter().position(|r| r.item.id == line_item_id)
    }
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// Reads a form, its rows in display order, all marks and the legend.
    pub fn load_grid(&self, form_id: i64) -> MarResult<MarGrid> {
        let form = self.store.get_form(form_id)?;
        let mut items = self.store.line_items_for_form(form_id)?;
        sort_line_items(&mut items);

        let mut marks_by_item: HashMap<i64, Vec<AdministrationMark>> = HashMap::new();
        for mark in self.store.marks_for_form(form_id)? {
            marks_by_item.entry(mark.line_item_id).or_default().push(mark);
        }
        let rows = items
            .into_iter()
            .map(|item| {
                let marks = marks_by_item.remove(&item.id).unwrap_or_default();
                GridRow::build(item, form.month, marks, &self.settings)
            })
            .collect();

        Ok(MarGrid {
            legend: self.legend()?,
            form,
            rows,
        })
    }

    /// Re-reads one row. Falls back to a full reload when the row is not on
    /// the grid or no longer exists.
    pub fn reload_row(&self, grid: &mut MarGrid, line_item_id: i64) -> MarResult<()> {
        let Some(index) = grid.row_index(line_item_id) else {
            *grid = self.load_grid(grid.form.id)?;
            return Ok(());
        };
        let item = match self.store.get_line_item(line_item_id) {
            Ok(item) => item,
            Err(crate::error::StoreError::NotFound { .. }) => {
                *grid = self.load_grid(grid.form.id)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let marks = self.store.marks_for_line_item(line_item_id)?;
        grid.rows[index].refresh(item, grid.form.month, marks, &self.settings);
        Ok(())
    }

    /// Brings `grid` back in line with the store after a mutation.
    pub fn resync(&self, grid: &mut MarGrid, resync: Resync) -> MarResult<()> {
        match resync {
            Resync::LineItem(id) => self.reload_row(grid, id),
            Resync::Form(id) => {
                *grid = self.load_grid(id)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;
    use crate::engine::CellCommand;
    use time::macros::date;

    fn set(code: &str) -> CellCommand {
        CellCommand::SetCode {
            code: code.into(),
            note: None,
        }
    }

    #[test]
    fn vitals_cells_show_text_and_are_never_blocked() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, vitals(), None);
        editor.edit_cell(item.id, 1, set("dc")).unwrap();
        editor.edit_cell(item.id, 2, set("118/76")).unwrap();

        let grid = editor.load_grid(form.id).unwrap();
        let row = grid.row(item.id).unwrap();
        assert_eq!(row.cell(1), Some(&CellView::VitalsText("dc".into())));
        assert_eq!(row.cell(2).map(CellView::label), Some("118/76"));
        assert_eq!(row.cell(3), Some(&CellView::Empty));
        assert_eq!(row.discontinued_from(editor.settings()), None);
    }

    #[test]
    fn inactive_wins_over_blocked() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(
            &store,
            form.id,
            medication("Lisinopril", date!(2024 - 03 - 01), Some(date!(2024 - 03 - 10))),
            None,
        );
        editor.edit_cell(item.id, 5, set("DC")).unwrap();

        let grid = editor.load_grid(form.id).unwrap();
        let row = grid.row(item.id).unwrap();
        assert_eq!(row.cell(6), Some(&CellView::Blocked { origin: 5 }));
        assert_eq!(row.cell(11), Some(&CellView::Inactive));
        assert!(row.cell(5).is_some_and(CellView::is_editable));
        assert!(!row.cell(6).is_some_and(CellView::is_editable));
        assert!(!row.cell(11).is_some_and(CellView::is_editable));
        assert_eq!(row.cell(0), None);
        assert_eq!(row.cell(32), None);
        assert_eq!(row.discontinued_from(editor.settings()), Some(5));
    }

    #[test]
    fn statuses_project_to_their_views() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        editor.edit_cell(item.id, 1, set("ab")).unwrap();
        editor.edit_cell(item.id, 2, set("ab")).unwrap();
        editor.edit_cell(item.id, 2, CellCommand::Activate).unwrap();
        editor
            .edit_cell(
                item.id,
                3,
                CellCommand::SetPrn {
                    initials: "cd".into(),
                    note: None,
                },
            )
            .unwrap();

        let grid = editor.load_grid(form.id).unwrap();
        let row = grid.row(item.id).unwrap();
        assert_eq!(row.cell(1), Some(&CellView::Given("AB".into())));
        assert_eq!(row.cell(2), Some(&CellView::NotGiven("AB".into())));
        assert_eq!(row.cell(3), Some(&CellView::Prn("CD".into())));
        assert!(row.mark(2).unwrap().administered_at.is_none());
    }

    #[test]
    fn resync_refreshes_one_row_or_the_form() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        let mut grid = editor.load_grid(form.id).unwrap();

        let outcome = editor.edit_cell(item.id, 4, set("ab")).unwrap();
        editor.resync(&mut grid, outcome.resync).unwrap();
        assert_eq!(grid.row(item.id).unwrap().cell(4), Some(&CellView::Given("AB".into())));

        let outcome = editor.delete_line_item(item.id).unwrap();
        editor.resync(&mut grid, outcome.resync).unwrap();
        assert!(grid.rows.is_empty());
        assert!(grid.legend.iter().any(|e| e.code == "DC"));
    }
}
