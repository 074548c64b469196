//! Screen switching and the main loop of the terminal front end.

use crate::components::forms::FormList;
use crate::components::grid::GridView;
use crate::components::prn::PrnLog;
use crate::components::Component;
use crate::tui::{self, Frame, Tui};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use mar_editor::{MarEditor, SqliteStore};
use std::time::Duration;
use tracing::debug;

pub type Editor<'s> = MarEditor<'s, SqliteStore>;

/// The screen a component asks the app to show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    FormList,
    /// The administration grid of a form.
    Grid(i64),
    /// The PRN log of a form.
    PrnLog(i64),
    Quit,
}

pub struct App<'s> {
    editor: Editor<'s>,
    screen: Screen,
    timeout: Duration,
    pub should_quit: bool,
    form_list: FormList,
    grid: Option<GridView>,
    prn_log: Option<PrnLog>,
}

impl<'s> App<'s> {
    pub fn new(editor: Editor<'s>, timeout: Duration) -> Self {
        let mut form_list = FormList::new(timeout);
        form_list.fetch_forms(&editor);
        Self {
            editor,
            screen: Screen::FormList,
            timeout,
            should_quit: false,
            form_list,
            grid: None,
            prn_log: None,
        }
    }

    pub fn run(&mut self, tui: &mut Tui) -> Result<()> {
        while !self.should_quit {
            tui.draw(|frame| self.render(frame))?;
            self.handle_event(tui)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, tui: &mut Tui) -> Result<()> {
        match tui.next_event()? {
            tui::Event::Key(key) => {
                if key.code == KeyCode::Char('q') && key.modifiers == KeyModifiers::CONTROL {
                    self.should_quit = true;
                    return Ok(());
                }
                if let Some(next) = self.handle_key(key)? {
                    self.switch_to(next);
                }
            }
            tui::Event::Tick => self.tick(),
            tui::Event::Resize => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<Option<Screen>> {
        let editor = &self.editor;
        match self.screen {
            Screen::FormList => self.form_list.handle_input(key, editor),
            Screen::Grid(_) => match &mut self.grid {
                Some(grid) => grid.handle_input(key, editor),
                None => Ok(Some(Screen::FormList)),
            },
            Screen::PrnLog(_) => match &mut self.prn_log {
                Some(log) => log.handle_input(key, editor),
                None => Ok(Some(Screen::FormList)),
            },
            Screen::Quit => Ok(None),
        }
    }

    fn switch_to(&mut self, next: Screen) {
        debug!(?next, "switching screen");
        match next {
            Screen::FormList => {
                self.grid = None;
                self.prn_log = None;
                self.form_list.fetch_forms(&self.editor);
            }
            Screen::Grid(form_id) => {
                self.prn_log = None;
                let reusable = self.grid.as_ref().is_some_and(|g| g.form_id() == form_id);
                if reusable {
                    if let Some(grid) = &mut self.grid {
                        grid.reload(&self.editor);
                    }
                } else {
                    match GridView::open(&self.editor, form_id, self.timeout) {
                        Ok(grid) => self.grid = Some(grid),
                        Err(e) => {
                            self.form_list.status.report(&e);
                            self.screen = Screen::FormList;
                            return;
                        }
                    }
                }
            }
            Screen::PrnLog(form_id) => {
                let mut log = PrnLog::new(form_id, self.timeout);
                log.fetch_records(&self.editor);
                self.prn_log = Some(log);
            }
            Screen::Quit => {
                self.should_quit = true;
                return;
            }
        }
        self.screen = next;
    }

    fn tick(&mut self) {
        self.form_list.tick();
        if let Some(grid) = &mut self.grid {
            grid.tick();
        }
        if let Some(log) = &mut self.prn_log {
            log.tick();
        }
    }

    fn render(&self, frame: &mut Frame) {
        match self.screen {
            Screen::Grid(_) => match &self.grid {
                Some(grid) => grid.render(frame),
                None => self.form_list.render(frame),
            },
            Screen::PrnLog(_) => match &self.prn_log {
                Some(log) => log.render(frame),
                None => self.form_list.render(frame),
            },
            Screen::FormList | Screen::Quit => self.form_list.render(frame),
        }
    }
}
