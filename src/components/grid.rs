//! The 31-day administration grid of one form.

use crate::app::{Editor, Screen};
use crate::components::input::{DialogEvent, InputDialog};
use crate::components::{
    panel, render_header, render_help, Component, StatusLine, BACKGROUND, BORDER, FOCUS, HEADER_ROW,
    HIGHLIGHT, MUTED, PANEL, TEXT,
};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use mar_editor::engine::{cycle_code, CellCommand, CellView, GridRow, MarGrid, Placement};
use mar_editor::models::{
    format_hour, parse_date, parse_hour, LineItemKind, LineItemPatch, MedicationSchedule,
    NewLineItem, VitalSign, VitalSigns, VitalSignsReading, VitalsEntry, GRID_DAYS,
};
use mar_editor::{EditOutcome, MarError, MarResult, ValidationError};
use ratatui::{prelude::*, widgets::*};
use std::time::Duration;
use time::Date;

const NAME_WIDTH: u16 = 28;
const DAY_WIDTH: u16 = 4;

const MEDICATION_FIELDS: [&str; 7] = [
    "Medication",
    "Dosage",
    "Route",
    "Start date",
    "Stop date",
    "Hours (08:00,20:00)",
    "Frequency label",
];

enum GridDialog {
    Code { line_item_id: i64, day: u8 },
    NotGiven { line_item_id: i64, day: u8 },
    Prn { line_item_id: i64, day: u8 },
    AddMedication { below: Option<i64> },
    AddVitals,
    Schedule { line_item_id: i64 },
    Legend,
    Vitals { day: u8 },
}

pub struct GridView {
    grid: MarGrid,
    vitals: Vec<VitalSignsReading>,
    row: usize,
    day: u8,
    dialog: Option<(GridDialog, InputDialog)>,
    pending_delete: Option<i64>,
    status: StatusLine,
}

impl GridView {
    pub fn open(editor: &Editor<'_>, form_id: i64, timeout: Duration) -> MarResult<Self> {
        Ok(Self {
            grid: editor.load_grid(form_id)?,
            vitals: editor.vitals(form_id)?,
            row: 0,
            day: 1,
            dialog: None,
            pending_delete: None,
            status: StatusLine::new(timeout),
        })
    }

    pub fn form_id(&self) -> i64 {
        self.grid.form.id
    }

    pub fn reload(&mut self, editor: &Editor<'_>) {
        match editor.load_grid(self.form_id()) {
            Ok(grid) => {
                self.grid = grid;
                self.clamp_cursor();
            }
            Err(e) => self.status.report(&e),
        }
        self.reload_vitals(editor);
    }

    fn reload_vitals(&mut self, editor: &Editor<'_>) {
        match editor.vitals(self.form_id()) {
            Ok(vitals) => self.vitals = vitals,
            Err(e) => self.status.report(&e),
        }
    }

    fn reading(&self, day: u8) -> Option<&VitalSigns> {
        self.vitals
            .iter()
            .find(|reading| reading.day == day)
            .map(|reading| &reading.values)
    }

    fn clamp_cursor(&mut self) {
        self.row = self.row.min(self.grid.rows.len().saturating_sub(1));
        self.day = self.day.clamp(1, GRID_DAYS);
    }

    fn current_row(&self) -> Option<&GridRow> {
        self.grid.rows.get(self.row)
    }

    fn current_id(&self) -> Option<i64> {
        self.current_row().map(|row| row.item.id)
    }

    /// Why the cell under the cursor cannot take a mark, if it cannot.
    fn locked_reason(&self) -> Option<String> {
        let cell = self.current_row()?.cell(self.day)?;
        if cell.is_editable() {
            return None;
        }
        Some(match cell {
            CellView::Blocked { origin } => {
                format!("Discontinued from day {origin}. Press r to reinstate.")
            }
            _ => format!("Day {} is outside this row's active dates", self.day),
        })
    }

    /// Applies the result of an engine call to the view: resync what went
    /// stale and surface warnings or errors.
    fn apply(&mut self, editor: &Editor<'_>, result: MarResult<EditOutcome>, done: &str) {
        let focus = self.current_id();
        match result {
            Ok(outcome) => {
                if let Err(e) = editor.resync(&mut self.grid, outcome.resync) {
                    self.status.report(&e);
                }
                match outcome.warning {
                    Some(warning) => self.status.set_error(warning),
                    None if outcome.is_applied() => self.status.set_success(done),
                    None => {}
                }
            }
            Err(e) => {
                self.status.report(&e);
                if !e.is_validation() {
                    self.reload(editor);
                }
            }
        }
        self.follow(focus);
    }

    /// Moves the cursor back onto a row after the grid was rebuilt.
    fn follow(&mut self, line_item_id: Option<i64>) {
        if let Some(index) = line_item_id.and_then(|id| self.grid.row_index(id)) {
            self.row = index;
        }
        self.clamp_cursor();
    }

    fn open_dialog(&mut self, key: char, editor: &Editor<'_>) {
        if matches!(key, 'a' | 'v' | 'l' | 'g') {
            self.open_row_independent(key, editor);
            return;
        }
        let Some(row) = self.current_row() else {
            self.status.set_error("Add a row first");
            return;
        };
        let line_item_id = row.item.id;
        let day = self.day;
        let title = format!("{} · day {day}", row.item.display_name());
        let dialog = match key {
            'n' => (
                GridDialog::NotGiven { line_item_id, day },
                InputDialog::new(format!("Not given: {title}"), &["Initials", "Note"])
                    .with_value(0, row.mark(day).map(|m| m.initials.clone()).unwrap_or_default()),
            ),
            'p' => (
                GridDialog::Prn { line_item_id, day },
                InputDialog::new(format!("PRN: {title}"), &["Initials", "Note"]),
            ),
            's' => {
                let item = &row.item;
                let stop = item
                    .medication()
                    .and_then(|m| m.stop_date)
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                (
                    GridDialog::Schedule { line_item_id },
                    InputDialog::new(
                        format!("Schedule: {}", item.display_name()),
                        &["Hour", "Stop date", "Notes", "Parameter"],
                    )
                    .with_value(0, item.hour.map(format_hour).unwrap_or_default())
                    .with_value(1, stop)
                    .with_value(2, item.notes.clone().unwrap_or_default())
                    .with_value(3, item.parameter.clone().unwrap_or_default()),
                )
            }
            _ => {
                let current = row.mark(day).map(|m| m.initials.clone()).unwrap_or_default();
                (
                    GridDialog::Code { line_item_id, day },
                    InputDialog::new(format!("{title} · PgUp/PgDn: legend"), &["Code / initials", "Note"])
                        .with_value(0, current),
                )
            }
        };
        self.dialog = Some(dialog);
    }

    fn open_row_independent(&mut self, key: char, editor: &Editor<'_>) {
        let start = self
            .grid
            .form
            .month
            .date(1)
            .map(|d| d.to_string())
            .unwrap_or_default();
        let dialog = match key {
            'a' => (
                GridDialog::AddMedication {
                    below: self.current_id(),
                },
                InputDialog::new("Add medication", &MEDICATION_FIELDS).with_value(3, start),
            ),
            'v' => (
                GridDialog::AddVitals,
                InputDialog::new("Add vitals row", &["Label", "Instructions"]),
            ),
            'l' => {
                let Some(clinician) = editor.clinician() else {
                    self.status
                        .set_error("Set a clinician id in the config to add legend codes");
                    return;
                };
                (
                    GridDialog::Legend,
                    InputDialog::new(
                        format!("Custom legend code · {clinician}"),
                        &["Code", "Description"],
                    ),
                )
            }
            _ => {
                let labels: Vec<&'static str> = VitalSign::ALL.iter().map(|s| s.label()).collect();
                let current = self.reading(self.day).cloned().unwrap_or_default();
                let dialog = VitalSign::ALL.iter().enumerate().fold(
                    InputDialog::new(format!("Vital signs · day {}", self.day), &labels),
                    |dialog, (index, &sign)| {
                        dialog.with_value(index, current.value(sign).unwrap_or_default())
                    },
                );
                (GridDialog::Vitals { day: self.day }, dialog)
            }
        };
        self.dialog = Some(dialog);
    }

    fn handle_dialog(&mut self, key: KeyEvent, editor: &Editor<'_>) {
        let Some((kind, input)) = &mut self.dialog else {
            return;
        };
        if let (GridDialog::Code { .. }, KeyCode::PageUp | KeyCode::PageDown) = (&*kind, key.code) {
            let forward = key.code == KeyCode::PageDown;
            if let Some(entry) = cycle_code(&self.grid.legend, input.value(0), forward) {
                input.set_value(0, entry.code.clone());
                self.status
                    .set_success(format!("{} {}", entry.code, entry.description));
            }
            return;
        }
        match input.handle_key(key) {
            DialogEvent::Pending => {}
            DialogEvent::Cancel => self.dialog = None,
            DialogEvent::Submit => {
                let Some((kind, input)) = self.dialog.take() else {
                    return;
                };
                if let Err(e) = self.submit(editor, &kind, &input) {
                    self.status.report(&e);
                    if e.is_validation() {
                        self.dialog = Some((kind, input));
                    } else {
                        self.reload(editor);
                    }
                }
            }
        }
    }

    fn submit(&mut self, editor: &Editor<'_>, kind: &GridDialog, input: &InputDialog) -> MarResult<()> {
        let note = input.optional(1);
        match *kind {
            GridDialog::Code { line_item_id, day } => {
                let command = CellCommand::SetCode {
                    code: input.value(0).to_string(),
                    note,
                };
                let outcome = editor.edit_cell(line_item_id, day, command)?;
                self.apply(editor, Ok(outcome), "Saved");
            }
            GridDialog::NotGiven { line_item_id, day } => {
                let command = CellCommand::SetNotGiven {
                    initials: input.optional(0),
                    note,
                };
                let outcome = editor.edit_cell(line_item_id, day, command)?;
                self.apply(editor, Ok(outcome), "Marked not given");
            }
            GridDialog::Prn { line_item_id, day } => {
                let command = CellCommand::SetPrn {
                    initials: input.value(0).to_string(),
                    note,
                };
                let outcome = editor.edit_cell(line_item_id, day, command)?;
                self.apply(editor, Ok(outcome), "PRN recorded");
            }
            GridDialog::AddMedication { below } => {
                let schedule = MedicationSchedule {
                    name: input.value(0).trim().to_string(),
                    dosage: input.value(1).trim().to_string(),
                    route: input.value(2).trim().to_string(),
                    start_date: date_field(input, 3, "start date")?
                        .ok_or(ValidationError::MissingField("start date"))?,
                    stop_date: date_field(input, 4, "stop date")?,
                    frequency: None,
                    frequency_label: input.optional(6),
                };
                let hours = input
                    .value(5)
                    .split(',')
                    .filter(|h| !h.trim().is_empty())
                    .map(|h| {
                        parse_hour(h).ok_or_else(|| ValidationError::InvalidValue {
                            field: "hour",
                            input: h.trim().to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let placement = below.map_or(Placement::Default, Placement::Below);
                let (items, outcome) =
                    editor.add_medication(self.form_id(), schedule, &hours, placement)?;
                self.apply(editor, Ok(outcome), &format!("Added {} row(s)", items.len()));
                self.follow(items.first().map(|item| item.id));
            }
            GridDialog::AddVitals => {
                let label = input
                    .optional(0)
                    .ok_or(ValidationError::MissingField("label"))?;
                let item = NewLineItem {
                    form_id: self.form_id(),
                    kind: LineItemKind::Vitals(VitalsEntry {
                        label,
                        instructions: input.value(1).trim().to_string(),
                    }),
                    hour: None,
                    notes: None,
                    parameter: None,
                    display_order: None,
                };
                let (item, outcome) = editor.add_line_item(item, Placement::Default)?;
                self.apply(editor, Ok(outcome), "Vitals row added");
                self.follow(Some(item.id));
            }
            GridDialog::Schedule { line_item_id } => {
                let hour = match input.optional(0) {
                    Some(raw) => Some(parse_hour(&raw).ok_or(ValidationError::InvalidValue {
                        field: "hour",
                        input: raw,
                    })?),
                    None => None,
                };
                let is_medication = self
                    .grid
                    .row(line_item_id)
                    .is_some_and(|row| row.item.medication().is_some());
                let patch = LineItemPatch {
                    hour: Some(hour),
                    notes: Some(input.optional(2)),
                    parameter: Some(input.optional(3)),
                    stop_date: if is_medication {
                        Some(date_field(input, 1, "stop date")?)
                    } else {
                        None
                    },
                    display_order: None,
                };
                let (_, outcome) = editor.update_schedule(line_item_id, patch)?;
                self.apply(editor, Ok(outcome), "Schedule updated");
            }
            GridDialog::Legend => {
                let legend = editor.add_custom_legend(input.value(0), input.value(1))?;
                self.reload(editor);
                self.status.set_success(format!("Added legend code {}", legend.code));
            }
            GridDialog::Vitals { day } => {
                let inputs: Vec<(VitalSign, &str)> = VitalSign::ALL
                    .into_iter()
                    .enumerate()
                    .map(|(index, sign)| (sign, input.value(index)))
                    .collect();
                if editor.set_vitals(self.form_id(), day, &inputs)?.is_some() {
                    self.reload_vitals(editor);
                    self.status.set_success(format!("Vital signs saved for day {day}"));
                } else {
                    self.status.set_success("No changes");
                }
            }
        }
        Ok(())
    }

    fn edit_current(&mut self, editor: &Editor<'_>, command: CellCommand, done: &str) {
        let Some(line_item_id) = self.current_id() else {
            return;
        };
        let result = editor.edit_cell(line_item_id, self.day, command);
        self.apply(editor, result, done);
    }

    fn move_row(&mut self, editor: &Editor<'_>, delta: isize) {
        let Some(line_item_id) = self.current_id() else {
            return;
        };
        let Some(target) = self.row.checked_add_signed(delta) else {
            return;
        };
        if target >= self.grid.rows.len() {
            return;
        }
        let result = editor.move_line_item(line_item_id, target);
        self.apply(editor, result, "Row moved");
    }

    fn reinstate_current(&mut self, editor: &Editor<'_>) {
        let Some(row) = self.current_row() else {
            return;
        };
        let line_item_id = row.item.id;
        let origin = match row.cell(self.day) {
            Some(CellView::DiscontinuedOrigin(_)) => Some(self.day),
            Some(CellView::Blocked { origin }) => Some(*origin),
            _ => None,
        };
        let Some(origin) = origin else {
            self.status
                .set_error("Select the discontinued day to reinstate the medication");
            return;
        };
        let result = editor.reinstate(line_item_id, origin);
        self.apply(editor, result, "Medication reinstated");
    }

    fn cell_style(cell: &CellView) -> Style {
        let style = Style::default().fg(TEXT);
        match cell {
            CellView::Inactive => style.bg(Color::Rgb(12, 12, 20)).fg(MUTED),
            CellView::Empty => style,
            CellView::Given(_) | CellView::VitalsText(_) => style.fg(Color::Rgb(140, 220, 140)),
            CellView::NotGiven(_) => style.fg(Color::Rgb(245, 160, 90)),
            CellView::Prn(_) => style.fg(Color::Rgb(129, 199, 245)),
            CellView::DiscontinuedOrigin(_) => style.fg(Color::Red).add_modifier(Modifier::BOLD),
            CellView::Blocked { .. } => style.fg(Color::Rgb(110, 60, 60)),
        }
    }

    /// First day column to draw so the cursor stays visible in `width` columns.
    fn first_visible_day(&self, width: u16) -> u8 {
        let visible = visible_days(width);
        if visible >= GRID_DAYS || self.day <= visible {
            1
        } else {
            (self.day + 1 - visible).min(GRID_DAYS + 1 - visible)
        }
    }

    fn render_grid(&self, frame: &mut Frame, area: Rect) {
        let first = self.first_visible_day(area.width);
        let visible = visible_days(area.width);
        let last = (first + visible - 1).min(GRID_DAYS);
        let days: Vec<u8> = (first..=last).collect();

        let mut header = vec![Cell::from("Medication / hour")];
        header.extend(days.iter().map(|day| {
            let style = if *day == self.day {
                Style::default().fg(FOCUS).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(TEXT)
            };
            Cell::from(format!("{day:>2}")).style(style)
        }));
        let header = Row::new(header)
            .style(Style::default().bg(HEADER_ROW).add_modifier(Modifier::BOLD))
            .height(1);

        let rows = self.grid.rows.iter().enumerate().map(|(index, row)| {
            let hour = row.item.hour.map(format_hour).unwrap_or_default();
            let mut cells = vec![Cell::from(format!("{} {hour}", row.item.display_name()))];
            cells.extend(days.iter().map(|day| {
                let view = row.cell(*day).cloned().unwrap_or(CellView::Inactive);
                let mut style = Self::cell_style(&view);
                if index == self.row && *day == self.day {
                    style = style.bg(FOCUS).fg(BACKGROUND);
                }
                Cell::from(view.label().to_string()).style(style)
            }));
            Row::new(cells)
        });

        let mut widths = vec![Constraint::Length(NAME_WIDTH)];
        widths.extend(days.iter().map(|_| Constraint::Length(DAY_WIDTH - 1)));

        let title = format!(
            "{} · {} · MRN {}",
            self.grid.form.patient.name, self.grid.form.month, self.grid.form.patient.record_number
        );
        let table = Table::new(rows, widths)
            .header(header)
            .block(panel(&title))
            .row_highlight_style(Style::default().bg(HIGHLIGHT))
            .highlight_symbol("► ");
        let mut state = TableState::default();
        if !self.grid.rows.is_empty() {
            state.select(Some(self.row));
        }
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn render_details(&self, frame: &mut Frame, area: Rect) {
        let details = &self.grid.form.details;
        let mut lines = vec![Line::from(vec![
            Span::styled("Diagnosis: ", Style::default().fg(MUTED)),
            Span::styled(details.diagnosis.clone().unwrap_or_default(), Style::default().fg(TEXT)),
            Span::styled("   Allergies: ", Style::default().fg(MUTED)),
            Span::styled(details.allergies.clone().unwrap_or_default(), Style::default().fg(TEXT)),
        ])];
        if let Some(row) = self.current_row() {
            let mut parts = vec![Span::styled(
                row.item.display_name(),
                Style::default().fg(FOCUS).add_modifier(Modifier::BOLD),
            )];
            if let Some(schedule) = row.item.medication() {
                let stop = schedule
                    .stop_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "open".to_string());
                parts.push(Span::styled(
                    format!("  {}  {} → {stop}", schedule.route, schedule.start_date),
                    Style::default().fg(TEXT),
                ));
            }
            if let Some(parameter) = &row.item.parameter {
                parts.push(Span::styled(format!("  [{parameter}]"), Style::default().fg(MUTED)));
            }
            if let Some(mark) = row.mark(self.day).and_then(|m| m.note.clone()) {
                parts.push(Span::styled(format!("  note: {mark}"), Style::default().fg(MUTED)));
            }
            lines.push(Line::from(parts));
        }
        let mut vitals = vec![Span::styled(
            format!("Vitals day {}: ", self.day),
            Style::default().fg(MUTED),
        )];
        let measured: Vec<String> = self
            .reading(self.day)
            .map(|values| {
                VitalSign::ALL
                    .iter()
                    .filter_map(|&sign| Some(format!("{} {}", sign.label(), values.value(sign)?)))
                    .collect()
            })
            .unwrap_or_default();
        vitals.push(Span::styled(
            if measured.is_empty() {
                "none recorded".to_string()
            } else {
                measured.join(" · ")
            },
            Style::default().fg(TEXT),
        ));
        lines.push(Line::from(vitals));
        let legend: Vec<String> = self
            .grid
            .legend
            .iter()
            .map(|entry| format!("{} {}", entry.code, entry.description))
            .collect();
        lines.push(Line::from(Span::styled(
            legend.join(" · "),
            Style::default().fg(MUTED),
        )));
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER))
            .style(Style::default().bg(PANEL));
        frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
    }
}

fn visible_days(width: u16) -> u8 {
    let columns = (width.saturating_sub(NAME_WIDTH + 2) / DAY_WIDTH).clamp(1, u16::from(GRID_DAYS));
    columns as u8
}

fn date_field(input: &InputDialog, index: usize, field: &'static str) -> Result<Option<Date>, MarError> {
    input
        .optional(index)
        .map(|raw| {
            parse_date(&raw).map_err(|_| {
                MarError::from(ValidationError::InvalidValue { field, input: raw.clone() })
            })
        })
        .transpose()
}

impl Component for GridView {
    fn handle_input(&mut self, key: KeyEvent, editor: &Editor<'_>) -> Result<Option<Screen>> {
        if self.dialog.is_some() {
            self.handle_dialog(key, editor);
            return Ok(None);
        }
        if let Some(line_item_id) = self.pending_delete.take() {
            if key.code == KeyCode::Char('y') {
                let result = editor.delete_line_item(line_item_id);
                self.apply(editor, result, "Row deleted");
            } else {
                self.status.set_success("Cancelled");
            }
            return Ok(None);
        }

        let marks_cell = matches!(
            key.code,
            KeyCode::Enter | KeyCode::Delete | KeyCode::Backspace | KeyCode::Char(' ' | 'n' | 'p')
        );
        if marks_cell {
            if let Some(reason) = self.locked_reason() {
                self.status.set_error(reason);
                return Ok(None);
            }
        }

        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Up if shift => self.move_row(editor, -1),
            KeyCode::Down if shift => self.move_row(editor, 1),
            KeyCode::Up => self.row = self.row.saturating_sub(1),
            KeyCode::Down => {
                if self.row + 1 < self.grid.rows.len() {
                    self.row += 1;
                }
            }
            KeyCode::Left => self.day = self.day.saturating_sub(1).max(1),
            KeyCode::Right => self.day = (self.day + 1).min(GRID_DAYS),
            KeyCode::Home => self.day = 1,
            KeyCode::End => self.day = GRID_DAYS,
            KeyCode::Enter => self.open_dialog('c', editor),
            KeyCode::Char(c @ ('n' | 'p' | 's' | 'a' | 'v' | 'l' | 'g')) => self.open_dialog(c, editor),
            KeyCode::Char(' ') => self.edit_current(editor, CellCommand::Activate, "Updated"),
            KeyCode::Delete | KeyCode::Backspace => {
                self.edit_current(editor, CellCommand::Clear, "Cleared")
            }
            KeyCode::Char('r') => self.reinstate_current(editor),
            KeyCode::Char('x') => {
                let prompt = self.current_row().map(|row| {
                    let message = format!(
                        "Delete {} and all its marks? Press y to confirm.",
                        row.item.display_name()
                    );
                    (row.item.id, message)
                });
                if let Some((line_item_id, message)) = prompt {
                    self.status.set_error(message);
                    self.pending_delete = Some(line_item_id);
                }
            }
            KeyCode::Char('R') => {
                self.reload(editor);
                self.status.set_success("Grid reloaded");
            }
            KeyCode::Tab => return Ok(Some(Screen::PrnLog(self.form_id()))),
            KeyCode::Esc | KeyCode::Char('q') => return Ok(Some(Screen::FormList)),
            _ => {}
        }
        Ok(None)
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        frame.render_widget(Block::default().style(Style::default().bg(BACKGROUND)), area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(6),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .margin(1)
            .split(area);

        render_header(frame, layout[0], "ADMINISTRATION GRID");
        self.render_grid(frame, layout[1]);
        self.render_details(frame, layout[2]);
        self.status.render(frame, layout[3]);
        render_help(
            frame,
            layout[4],
            "←→↑↓: Move | Enter: Code | Space: Toggle | n: Not given | p: PRN | Del: Clear | r: Reinstate | \
             a: Add med | v: Add vitals | s: Schedule | Shift+↑↓: Reorder | x: Delete row | g: Vitals | \
             l: Legend | Tab: PRN log | Esc: Back",
        );

        if let Some((_, dialog)) = &self.dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.status.check_timeouts();
    }
}
