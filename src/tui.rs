use anyhow::Result;
use crossterm::{
    event::{self, KeyEvent, KeyEventKind},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Duration};

#[derive(Debug, Clone)]
pub enum Event {
    Key(KeyEvent),
    Resize,
    Tick,
}

pub type Frame<'a> = ratatui::Frame<'a>;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    framerate: f64,
}

impl Tui {
    pub fn new(terminal: Terminal<CrosstermBackend<io::Stdout>>, framerate: f64) -> Self {
        Self {
            terminal,
            framerate: if framerate > 0.0 { framerate } else { 30.0 },
        }
    }

    pub fn init(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        self.set_min_size(100, 32)?;
        Ok(())
    }

    pub fn set_min_size(&self, width: u16, height: u16) -> Result<()> {
        let (current_width, current_height) = terminal::size()?;
        if current_width < width || current_height < height {
            io::stdout().execute(terminal::SetSize(
                current_width.max(width),
                current_height.max(height),
            ))?;
        }
        Ok(())
    }

    pub fn exit(&mut self) -> Result<()> {
        self.terminal.show_cursor()?;
        terminal::disable_raw_mode()?;
        crossterm::execute!(io::stdout(), LeaveAlternateScreen)?;
        Ok(())
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> Result<()> {
        self.terminal.draw(render)?;
        Ok(())
    }

    /// Waits one frame for input. Key releases are dropped so each press is
    /// seen once on every platform.
    pub fn next_event(&self) -> Result<Event> {
        let timeout = Duration::from_secs_f64(1.0 / self.framerate);
        if !event::poll(timeout)? {
            return Ok(Event::Tick);
        }
        Ok(match event::read()? {
            event::Event::Key(key) if key.kind == KeyEventKind::Press => Event::Key(key),
            event::Event::Resize(..) => Event::Resize,
            _ => Event::Tick,
        })
    }
}
