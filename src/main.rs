mod app;
mod components;
mod tui;

use anyhow::{Context, Result};
use app::App;
use crossterm::terminal::{self, LeaveAlternateScreen};
use mar_editor::{config, logging, MarEditor, SqliteStore};
use ratatui::prelude::{CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tui::Tui;

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load(config_path.as_deref()).context("failed to load configuration")?;
    logging::init(&config.logging)?;
    info!(database = %config.database.path.display(), "starting MAR editor");

    let store = SqliteStore::open(&config.database.path).context("failed to open database")?;
    let mut editor = MarEditor::new(&store, config.grid.clone());
    if !config.ui.clinician_id.trim().is_empty() {
        editor = editor.with_clinician(config.ui.clinician_id.trim());
    }

    let _guard = CleanupGuard;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    let mut tui = Tui::new(terminal, config.ui.framerate);
    tui.init()?;

    let timeout = Duration::from_secs(config.ui.message_timeout_secs);
    let mut app = App::new(editor, timeout);
    let res = app.run(&mut tui);

    tui.exit()?;

    if let Err(e) = res {
        error!(error = %e, "application error");
        eprintln!("Application Error: {e}");
    }
    info!("MAR editor closed");
    Ok(())
}

struct CleanupGuard;

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), LeaveAlternateScreen);
    }
}
