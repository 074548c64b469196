//! The list of MAR forms and the dialogs that create and describe them.

use crate::app::{Editor, Screen};
use crate::components::input::{DialogEvent, InputDialog};
use crate::components::{
    clamp_selection, panel, render_header, render_help, step_selection, Component, StatusLine,
    BACKGROUND, HEADER_ROW, HIGHLIGHT, MUTED, TEXT,
};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use mar_editor::engine::FormCreation;
use mar_editor::models::{parse_date, ClinicalDetails, Form, NewForm, PatientSnapshot, ReportingMonth};
use mar_editor::{MarError, ValidationError};
use ratatui::{prelude::*, widgets::*};
use std::time::Duration;

const NEW_FORM_FIELDS: [&str; 9] = [
    "Patient ID",
    "Name",
    "Record number",
    "Month (YYYY-MM)",
    "Date of birth",
    "Sex",
    "Diagnosis",
    "Allergies",
    "Physician",
];

const DETAIL_FIELDS: [&str; 6] = [
    "Diagnosis",
    "Diet",
    "Allergies",
    "Physician",
    "Facility",
    "Comments",
];

enum Dialog {
    NewForm(InputDialog),
    Details { form_id: i64, dialog: InputDialog },
}

/// What a pending `y` confirms.
enum Pending {
    Duplicate(NewForm),
    Delete(i64),
}

pub struct FormList {
    forms: Vec<Form>,
    state: TableState,
    dialog: Option<Dialog>,
    pending: Option<Pending>,
    pub status: StatusLine,
}

impl FormList {
    pub fn new(timeout: Duration) -> Self {
        Self {
            forms: Vec::new(),
            state: TableState::default(),
            dialog: None,
            pending: None,
            status: StatusLine::new(timeout),
        }
    }

    pub fn fetch_forms(&mut self, editor: &Editor<'_>) {
        match editor.forms() {
            Ok(forms) => {
                self.forms = forms;
                clamp_selection(&mut self.state, self.forms.len());
            }
            Err(e) => self.status.report(&e),
        }
    }

    fn selected(&self) -> Option<&Form> {
        self.state.selected().and_then(|i| self.forms.get(i))
    }

    fn create(&mut self, editor: &Editor<'_>, draft: &NewForm, confirm: bool) {
        match editor.create_form(draft, confirm) {
            Ok(FormCreation::Created(form)) => {
                self.status
                    .set_success(format!("Created {} for {}", form.month, form.patient.name));
                self.fetch_forms(editor);
                if let Some(index) = self.forms.iter().position(|f| f.id == form.id) {
                    self.state.select(Some(index));
                }
            }
            Ok(FormCreation::DuplicateExists(existing)) => {
                self.status.set_error(format!(
                    "{} already has a form for {}. Press y to create another.",
                    existing.patient.name, existing.month
                ));
                self.pending = Some(Pending::Duplicate(draft.clone()));
            }
            Err(e) => self.status.report(&e),
        }
    }

    fn handle_dialog(&mut self, key: KeyEvent, editor: &Editor<'_>) {
        let Some(dialog) = &mut self.dialog else {
            return;
        };
        let input = match dialog {
            Dialog::NewForm(input) | Dialog::Details { dialog: input, .. } => input,
        };
        match input.handle_key(key) {
            DialogEvent::Pending => {}
            DialogEvent::Cancel => self.dialog = None,
            DialogEvent::Submit => {
                let Some(dialog) = self.dialog.take() else {
                    return;
                };
                let result = match &dialog {
                    Dialog::NewForm(input) => new_form_from(input).map(|draft| {
                        self.create(editor, &draft, false);
                    }),
                    Dialog::Details { form_id, dialog } => editor
                        .update_form_details(*form_id, &details_from(dialog))
                        .map(|form| {
                            self.status
                                .set_success(format!("Updated details for {}", form.patient.name));
                            self.fetch_forms(editor);
                        }),
                };
                if let Err(e) = result {
                    self.status.report(&e);
                    self.dialog = Some(dialog);
                }
            }
        }
    }

    fn details_dialog(form: &Form) -> Dialog {
        let details = &form.details;
        let values = [
            &details.diagnosis,
            &details.diet,
            &details.allergies,
            &details.physician,
            &details.facility,
            &details.comments,
        ];
        let dialog = values.into_iter().enumerate().fold(
            InputDialog::new(format!("Details: {}", form.patient.name), &DETAIL_FIELDS),
            |dialog, (index, value)| dialog.with_value(index, value.clone().unwrap_or_default()),
        );
        Dialog::Details {
            form_id: form.id,
            dialog,
        }
    }
}

fn new_form_from(input: &InputDialog) -> Result<NewForm, MarError> {
    let month: ReportingMonth = input.value(3).parse()?;
    let date_of_birth = input
        .optional(4)
        .map(|raw| {
            parse_date(&raw).map_err(|_| ValidationError::InvalidValue {
                field: "date of birth",
                input: raw.clone(),
            })
        })
        .transpose()?;
    Ok(NewForm {
        patient: PatientSnapshot {
            patient_id: input.value(0).trim().to_string(),
            name: input.value(1).trim().to_string(),
            record_number: input.value(2).trim().to_string(),
            date_of_birth,
            sex: input.optional(5),
        },
        month,
        details: ClinicalDetails {
            diagnosis: input.optional(6),
            allergies: input.optional(7),
            physician: input.optional(8),
            ..Default::default()
        },
    })
}

fn details_from(input: &InputDialog) -> ClinicalDetails {
    ClinicalDetails {
        diagnosis: input.optional(0),
        diet: input.optional(1),
        allergies: input.optional(2),
        physician: input.optional(3),
        facility: input.optional(4),
        comments: input.optional(5),
    }
}

impl Component for FormList {
    fn handle_input(&mut self, key: KeyEvent, editor: &Editor<'_>) -> Result<Option<Screen>> {
        if self.dialog.is_some() {
            self.handle_dialog(key, editor);
            return Ok(None);
        }
        if let Some(pending) = self.pending.take() {
            if key.code == KeyCode::Char('y') {
                match pending {
                    Pending::Duplicate(draft) => self.create(editor, &draft, true),
                    Pending::Delete(form_id) => match editor.delete_form(form_id) {
                        Ok(()) => {
                            self.status.set_success("Form deleted");
                            self.fetch_forms(editor);
                        }
                        Err(e) => self.status.report(&e),
                    },
                }
            } else {
                self.status.set_success("Cancelled");
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Up => step_selection(&mut self.state, self.forms.len(), -1),
            KeyCode::Down => step_selection(&mut self.state, self.forms.len(), 1),
            KeyCode::Enter => {
                if let Some(form) = self.selected() {
                    return Ok(Some(Screen::Grid(form.id)));
                }
            }
            KeyCode::Char('n') => {
                self.dialog = Some(Dialog::NewForm(InputDialog::new("New MAR form", &NEW_FORM_FIELDS)));
            }
            KeyCode::Char('e') => {
                if let Some(form) = self.selected() {
                    self.dialog = Some(Self::details_dialog(form));
                }
            }
            KeyCode::Char('r') => {
                self.fetch_forms(editor);
                self.status.set_success("Forms refreshed");
            }
            KeyCode::Delete => {
                let prompt = self.selected().map(|form| {
                    let message = format!(
                        "Delete the {} form of {}? Press y to confirm.",
                        form.month, form.patient.name
                    );
                    (form.id, message)
                });
                if let Some((form_id, message)) = prompt {
                    self.status.set_error(message);
                    self.pending = Some(Pending::Delete(form_id));
                }
            }
            KeyCode::Char('q') | KeyCode::Esc => return Ok(Some(Screen::Quit)),
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
                Constraint::Min(10),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .margin(1)
            .split(area);

        render_header(frame, layout[0], "MEDICATION ADMINISTRATION RECORDS");

        let header = Row::new(["Month", "Patient", "Record #", "Diagnosis", "Physician"])
            .style(Style::default().fg(TEXT).bg(HEADER_ROW).add_modifier(Modifier::BOLD))
            .height(1);
        let rows = self.forms.iter().map(|form| {
            Row::new(vec![
                form.month.to_string(),
                form.patient.name.clone(),
                form.patient.record_number.clone(),
                form.details.diagnosis.clone().unwrap_or_default(),
                form.details.physician.clone().unwrap_or_default(),
            ])
            .style(Style::default().fg(TEXT))
        });
        let table = Table::new(
            rows,
            [
                Constraint::Length(9),
                Constraint::Percentage(30),
                Constraint::Length(12),
                Constraint::Percentage(30),
                Constraint::Percentage(25),
            ],
        )
        .header(header)
        .block(panel("Forms"))
        .row_highlight_style(Style::default().bg(HIGHLIGHT).add_modifier(Modifier::BOLD))
        .highlight_symbol("► ");
        frame.render_stateful_widget(table, layout[1], &mut self.state.clone());

        if self.forms.is_empty() {
            let empty = Paragraph::new("No forms yet. Press n to create one.")
                .style(Style::default().fg(MUTED))
                .alignment(Alignment::Center);
            let inner = panel("Forms").inner(layout[1]);
            frame.render_widget(empty, Rect { y: inner.y + 2, height: 1, ..inner });
        }

        self.status.render(frame, layout[2]);
        render_help(
            frame,
            layout[3],
            "↑↓: Select | Enter: Open grid | n: New form | e: Details | Del: Delete | r: Refresh | q: Quit",
        );

        if let Some(Dialog::NewForm(dialog) | Dialog::Details { dialog, .. }) = &self.dialog {
            dialog.render(frame);
        }
    }

    fn tick(&mut self) {
        self.status.check_timeouts();
    }
}
