//! The PRN (as-needed) log of a form.

use crate::app::{Editor, Screen};
use crate::components::input::{DialogEvent, InputDialog};
use crate::components::{
    clamp_selection, panel, render_header, render_help, step_selection, Component, StatusLine,
    BACKGROUND, FOCUS, HEADER_ROW, HIGHLIGHT, MUTED, TEXT,
};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use mar_editor::engine::SignatureLegend;
use mar_editor::models::{parse_date, NewPrnRecord, PrnField, PrnRecord};
use mar_editor::{MarError, MarResult, ValidationError};
use ratatui::{prelude::*, widgets::*};
use std::time::Duration;
use time::OffsetDateTime;

const NEW_ENTRY_FIELDS: [&str; 8] = [
    "Date",
    "Hour",
    "Medication",
    "Reason",
    "Result",
    "Initials",
    "Staff signature",
    "Note",
];

enum PrnDialog {
    Add,
    Edit { record_id: i64, field: PrnField },
}

pub struct PrnLog {
    form_id: i64,
    records: Vec<PrnRecord>,
    signatures: SignatureLegend,
    state: TableState,
    column: usize,
    dialog: Option<(PrnDialog, InputDialog)>,
    pending_delete: Option<i64>,
    status: StatusLine,
}

impl PrnLog {
    pub fn new(form_id: i64, timeout: Duration) -> Self {
        Self {
            form_id,
            records: Vec::new(),
            signatures: SignatureLegend::default(),
            state: TableState::default(),
            column: 0,
            dialog: None,
            pending_delete: None,
            status: StatusLine::new(timeout),
        }
    }

    pub fn fetch_records(&mut self, editor: &Editor<'_>) {
        let fetched = editor
            .prn_records(self.form_id)
            .and_then(|records| Ok((records, editor.signature_legend(self.form_id)?)));
        match fetched {
            Ok((records, signatures)) => {
                self.records = records;
                self.signatures = signatures;
                clamp_selection(&mut self.state, self.records.len());
            }
            Err(e) => self.status.report(&e),
        }
    }

    fn selected(&self) -> Option<&PrnRecord> {
        self.state.selected().and_then(|i| self.records.get(i))
    }

    fn field(&self) -> PrnField {
        PrnField::ALL[self.column.min(PrnField::ALL.len() - 1)]
    }

    fn open_edit(&mut self) {
        let field = self.field();
        let Some(record) = self.selected() else {
            return;
        };
        let label = NEW_ENTRY_FIELDS[self.column];
        let dialog = InputDialog::new(format!("PRN #{} · {field}", record.entry_number), &[label])
            .with_value(0, record.value(field).unwrap_or_default());
        self.dialog = Some((
            PrnDialog::Edit {
                record_id: record.id,
                field,
            },
            dialog,
        ));
    }

    fn open_add(&mut self) {
        let today = OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .date();
        let dialog = InputDialog::new("Log PRN dose", &NEW_ENTRY_FIELDS).with_value(0, today.to_string());
        self.dialog = Some((PrnDialog::Add, dialog));
    }

    fn submit(&mut self, editor: &Editor<'_>, kind: &PrnDialog, input: &InputDialog) -> MarResult<()> {
        let (record, outcome) = match *kind {
            PrnDialog::Add => {
                let raw = input.value(0).trim().to_string();
                let date = parse_date(&raw).map_err(|_| {
                    MarError::from(ValidationError::InvalidValue {
                        field: "date",
                        input: raw.clone(),
                    })
                })?;
                editor.add_prn_record(NewPrnRecord {
                    form_id: self.form_id,
                    date,
                    hour: input.optional(1),
                    medication: input.value(2).to_string(),
                    reason: input.value(3).to_string(),
                    result: input.optional(4),
                    initials: input.optional(5),
                    staff_signature: input.optional(6),
                    note: input.optional(7),
                })?
            }
            PrnDialog::Edit { record_id, field } => {
                editor.edit_prn_field(record_id, field, input.value(0))?
            }
        };
        if let Some(warning) = outcome.warning {
            self.status.set_error(warning);
        } else {
            self.status
                .set_success(format!("PRN entry #{} saved", record.entry_number));
        }
        self.fetch_records(editor);
        if let Some(index) = self.records.iter().position(|r| r.id == record.id) {
            self.state.select(Some(index));
        }
        Ok(())
    }

    fn handle_dialog(&mut self, key: KeyEvent, editor: &Editor<'_>) {
        let Some((_, input)) = &mut self.dialog else {
            return;
        };
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
                        self.fetch_records(editor);
                    }
                }
            }
        }
    }
}

impl Component for PrnLog {
    fn handle_input(&mut self, key: KeyEvent, editor: &Editor<'_>) -> Result<Option<Screen>> {
        if self.dialog.is_some() {
            self.handle_dialog(key, editor);
            return Ok(None);
        }
        if let Some(record_id) = self.pending_delete.take() {
            if key.code == KeyCode::Char('y') {
                match editor.delete_prn_record(record_id) {
                    Ok(_) => {
                        self.status.set_success("PRN entry deleted");
                        self.fetch_records(editor);
                    }
                    Err(e) => self.status.report(&e),
                }
            } else {
                self.status.set_success("Cancelled");
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Up => step_selection(&mut self.state, self.records.len(), -1),
            KeyCode::Down => step_selection(&mut self.state, self.records.len(), 1),
            KeyCode::Left => self.column = self.column.saturating_sub(1),
            KeyCode::Right => self.column = (self.column + 1).min(PrnField::ALL.len() - 1),
            KeyCode::Enter => self.open_edit(),
            KeyCode::Char('a') => self.open_add(),
            KeyCode::Char('x') => {
                let prompt = self
                    .selected()
                    .map(|record| (record.id, record.entry_number));
                if let Some((record_id, entry_number)) = prompt {
                    self.status.set_error(format!(
                        "Delete PRN entry #{entry_number}? Press y to confirm."
                    ));
                    self.pending_delete = Some(record_id);
                }
            }
            KeyCode::Esc | KeyCode::Tab | KeyCode::Char('q') => {
                return Ok(Some(Screen::Grid(self.form_id)))
            }
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
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .margin(1)
            .split(area);

        render_header(frame, layout[0], "PRN LOG");

        let mut header = vec![Cell::from("#")];
        header.extend(NEW_ENTRY_FIELDS.iter().enumerate().map(|(index, label)| {
            let style = if index == self.column {
                Style::default().fg(FOCUS).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(TEXT)
            };
            Cell::from(*label).style(style)
        }));
        let header = Row::new(header)
            .style(Style::default().bg(HEADER_ROW).add_modifier(Modifier::BOLD))
            .height(1);

        let selected = self.state.selected();
        let rows = self.records.iter().enumerate().map(|(index, record)| {
            let mut cells = vec![Cell::from(record.entry_number.to_string())];
            cells.extend(PrnField::ALL.iter().enumerate().map(|(column, field)| {
                let text = record.value(*field).unwrap_or_default();
                let style = if Some(index) == selected && column == self.column {
                    Style::default().fg(BACKGROUND).bg(FOCUS)
                } else {
                    Style::default().fg(TEXT)
                };
                Cell::from(text).style(style)
            }));
            Row::new(cells)
        });

        let table = Table::new(
            rows,
            [
                Constraint::Length(4),
                Constraint::Length(11),
                Constraint::Length(6),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
                Constraint::Percentage(14),
                Constraint::Length(8),
                Constraint::Percentage(14),
                Constraint::Percentage(14),
            ],
        )
        .header(header)
        .block(panel("As-needed doses"))
        .row_highlight_style(Style::default().bg(HIGHLIGHT))
        .highlight_symbol("► ");
        frame.render_stateful_widget(table, layout[1], &mut self.state.clone());

        let signatures: Vec<String> = self
            .signatures
            .entries()
            .map(|(initials, signature)| format!("{initials} = {signature}"))
            .collect();
        let legend = Paragraph::new(if signatures.is_empty() {
            "No signatures recorded".to_string()
        } else {
            signatures.join(" · ")
        })
        .style(Style::default().fg(MUTED))
        .block(panel("Signature legend"));
        frame.render_widget(legend, layout[2]);

        self.status.render(frame, layout[3]);
        render_help(
            frame,
            layout[4],
            "↑↓: Entry | ←→: Field | Enter: Edit field | a: Log dose | x: Delete | Esc/Tab: Back to grid",
        );

        if let Some((_, dialog)) = &self.dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.status.check_timeouts();
    }
}
