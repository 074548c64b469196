//! A modal dialog with one or more labelled text fields.

use crate::components::{BORDER, FOCUS, HEADER_ROW, MUTED, TEXT};
use crate::tui::Frame;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{prelude::*, widgets::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogEvent {
    Submit,
    Cancel,
    Pending,
}

pub struct InputDialog {
    title: String,
    labels: Vec<&'static str>,
    values: Vec<String>,
    focus_index: usize,
}

impl InputDialog {
    pub fn new(title: impl Into<String>, labels: &[&'static str]) -> Self {
        Self {
            title: title.into(),
            labels: labels.to_vec(),
            values: vec![String::new(); labels.len()],
            focus_index: 0,
        }
    }

    /// Pre-fills a field.
    pub fn with_value(mut self, index: usize, value: impl Into<String>) -> Self {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
        self
    }

    pub fn set_value(&mut self, index: usize, value: impl Into<String>) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
    }

    pub fn focused(&self) -> usize {
        self.focus_index
    }

    pub fn value(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or_default()
    }

    /// The value of a field, `None` when blank.
    pub fn optional(&self, index: usize) -> Option<String> {
        let value = self.value(index).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogEvent {
        let fields = self.labels.len().max(1);
        match key.code {
            KeyCode::Esc => return DialogEvent::Cancel,
            KeyCode::Enter => return DialogEvent::Submit,
            KeyCode::Tab | KeyCode::Down => self.focus_index = (self.focus_index + 1) % fields,
            KeyCode::BackTab | KeyCode::Up => {
                self.focus_index = (self.focus_index + fields - 1) % fields
            }
            KeyCode::Backspace => {
                if let Some(value) = self.values.get_mut(self.focus_index) {
                    value.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(value) = self.values.get_mut(self.focus_index) {
                    value.push(c);
                }
            }
            _ => {}
        }
        DialogEvent::Pending
    }

    pub fn render(&self, frame: &mut Frame) {
        let height = self.labels.len() as u16 + 4;
        let area = centered(frame.area(), 64, height);
        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(format!(" {} ", self.title))
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER))
            .style(Style::default().bg(HEADER_ROW));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines: Vec<Line> = self
            .labels
            .iter()
            .zip(&self.values)
            .enumerate()
            .map(|(index, (label, value))| {
                let focused = index == self.focus_index;
                let label_style = if focused {
                    Style::default().fg(FOCUS).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(MUTED)
                };
                let cursor = if focused { "▏" } else { "" };
                Line::from(vec![
                    Span::styled(format!("{label:>16}: "), label_style),
                    Span::styled(format!("{value}{cursor}"), Style::default().fg(TEXT)),
                ])
            })
            .collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab: Next field | Enter: Save | Esc: Cancel",
            Style::default().fg(MUTED),
        )));
        frame.render_widget(Paragraph::new(lines), inner);
    }
}

/// A `width` x `height` rectangle in the middle of `area`.
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
