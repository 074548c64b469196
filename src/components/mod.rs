use crate::app::{Editor, Screen};
use crate::tui::Frame;
use anyhow::Result;
use crossterm::event::KeyEvent;
use mar_editor::MarError;
use ratatui::{prelude::*, widgets::*};
use std::time::{Duration, Instant};
use tracing::error;

pub mod forms;
pub mod grid;
pub mod input;
pub mod prn;

pub const BACKGROUND: Color = Color::Rgb(16, 16, 28);
pub const PANEL: Color = Color::Rgb(22, 22, 35);
pub const HEADER_ROW: Color = Color::Rgb(26, 26, 36);
pub const BORDER: Color = Color::Rgb(75, 75, 120);
pub const TEXT: Color = Color::Rgb(230, 230, 250);
pub const MUTED: Color = Color::Rgb(140, 140, 170);
pub const HIGHLIGHT: Color = Color::Rgb(40, 40, 65);
pub const FOCUS: Color = Color::Rgb(250, 250, 110);

pub trait Component {
    fn handle_input(&mut self, key: KeyEvent, editor: &Editor<'_>) -> Result<Option<Screen>>;
    fn render(&self, frame: &mut Frame);
    /// Called on every tick so timed messages can expire.
    fn tick(&mut self);
}

/// Error and success messages that clear themselves after a timeout.
pub struct StatusLine {
    error_message: Option<String>,
    error_timer: Option<Instant>,
    success_message: Option<String>,
    success_timer: Option<Instant>,
    timeout: Duration,
}

impl StatusLine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            error_message: None,
            error_timer: None,
            success_message: None,
            success_timer: None,
            timeout,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.clear_success();
        self.error_message = Some(message.into());
        self.error_timer = Some(Instant::now());
    }

    pub fn set_success(&mut self, message: impl Into<String>) {
        self.clear_error();
        self.success_message = Some(message.into());
        self.success_timer = Some(Instant::now());
    }

    /// Shows an engine failure. Store failures are also logged.
    pub fn report(&mut self, err: &MarError) {
        if !err.is_validation() {
            error!(error = %err, "operation failed");
        }
        self.set_error(err.to_string());
    }

    fn clear_error(&mut self) {
        self.error_message = None;
        self.error_timer = None;
    }

    fn clear_success(&mut self) {
        self.success_message = None;
        self.success_timer = None;
    }

    pub fn check_timeouts(&mut self) {
        if self.error_timer.is_some_and(|t| t.elapsed() > self.timeout) {
            self.clear_error();
        }
        if self.success_timer.is_some_and(|t| t.elapsed() > self.timeout) {
            self.clear_success();
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let (text, style) = match (&self.error_message, &self.success_message) {
            (Some(error), _) => (
                error.as_str(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            (None, Some(success)) => (
                success.as_str(),
                Style::default()
                    .fg(Color::Rgb(140, 220, 140))
                    .add_modifier(Modifier::BOLD),
            ),
            (None, None) => return,
        };
        let paragraph = Paragraph::new(text)
            .style(style)
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
    }
}

/// Paints the background and a centered title with a bottom border.
pub fn render_header(frame: &mut Frame, area: Rect, title: &str) {
    let header = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER))
        .style(Style::default().bg(BACKGROUND));
    frame.render_widget(header, area);

    let title = Paragraph::new(title.to_string())
        .style(
            Style::default()
                .fg(TEXT)
                .add_modifier(Modifier::BOLD)
                .bg(BACKGROUND),
        )
        .alignment(Alignment::Center);
    frame.render_widget(title, area);
}

pub fn render_help(frame: &mut Frame, area: Rect, text: &str) {
    let help = Paragraph::new(text.to_string())
        .style(Style::default().fg(MUTED))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(help, area);
}

pub fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(format!(" {title} "))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .style(Style::default().bg(PANEL))
}

/// Moves a table selection by `delta` rows, wrapping around.
pub fn step_selection(state: &mut TableState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

/// Keeps a selection inside a list that may have shrunk.
pub fn clamp_selection(state: &mut TableState, len: usize) {
    if len == 0 {
        state.select(None);
    } else {
        let selection = state.selected().unwrap_or(0).min(len - 1);
        state.select(Some(selection));
    }
}
