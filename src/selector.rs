use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stderr};
use tracing::debug;

use crate::app::{PickerApp, PickerCommand, PickerHeader, PickerRow};
use crate::input;

type PickerTerminal = Terminal<CrosstermBackend<Stderr>>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Selection {
    /// Index into the rows handed to `select`.
    Chosen(usize),
    Cancelled,
    NoCandidates,
}

pub trait Selector {
    /// `captured_at` is when the rows were listed from the cluster.
    async fn select(
        &mut self,
        rows: Vec<PickerRow>,
        captured_at: DateTime<Local>,
    ) -> Result<Selection>;
}

/// Full-screen fuzzy picker. Draws on stderr so stdout stays clean for
/// anything piped out of the session.
#[derive(Debug, Clone, Default)]
pub struct TerminalSelector {
    header: Option<PickerHeader>,
}

impl TerminalSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: PickerHeader) -> Self {
        self.header = Some(header);
        self
    }

    fn picker(&self, rows: Vec<PickerRow>, captured_at: DateTime<Local>) -> PickerApp {
        let app = PickerApp::new(rows);
        match self.header.clone() {
            Some(header) => app.with_header(PickerHeader {
                captured_at: captured_at.format("%H:%M:%S").to_string(),
                ..header
            }),
            None => app,
        }
    }
}

impl Selector for TerminalSelector {
    async fn select(
        &mut self,
        rows: Vec<PickerRow>,
        captured_at: DateTime<Local>,
    ) -> Result<Selection> {
        if rows.is_empty() {
            return Ok(Selection::NoCandidates);
        }

        let mut app = self.picker(rows, captured_at);

        let mut terminal = init_terminal()?;
        let pick_result = pick_loop(&mut terminal, &mut app).await;
        let restore_result = restore_terminal(&mut terminal);

        match (pick_result, restore_result) {
            (Err(pick_error), Err(restore_error)) => Err(anyhow::anyhow!(
                "{pick_error:#}\nterminal restore error: {restore_error:#}"
            )),
            (Err(error), _) => Err(error),
            (_, Err(error)) => Err(error),
            (Ok(selection), Ok(())) => Ok(selection),
        }
    }
}

fn init_terminal() -> Result<PickerTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stderr = io::stderr();
    if let Err(error) = execute!(stderr, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(error).context("failed to enter alternate screen");
    }
    let backend = CrosstermBackend::new(stderr);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut PickerTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn pick_loop(terminal: &mut PickerTerminal, app: &mut PickerApp) -> Result<Selection> {
    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| crate::ui::render(frame, app))
            .context("failed to render picker frame")?;

        match reader.next().await {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                let Some(action) = input::map_key(key) else {
                    continue;
                };
                debug!("picker action={action:?}");
                match app.apply_action(action) {
                    PickerCommand::Confirm(index) => return Ok(Selection::Chosen(index)),
                    PickerCommand::Cancel => return Ok(Selection::Cancelled),
                    PickerCommand::None => {}
                }
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => return Err(error).context("terminal event error"),
            None => {
                debug!("terminal event stream closed");
                return Ok(Selection::Cancelled);
            }
        }
    }
}
