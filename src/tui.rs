use std::io::{self, Stderr};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEvent, KeyEventKind, MouseEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::error;

use helix_outreach::{DiagnosticTarget, ExchangeEvent};

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

/// Drives the "Generating sequence..." ellipsis
const TICK_RATE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
    /// Progress of a background chat/sequence exchange
    Exchange(ExchangeEvent),
    /// Formatted outcome of a connection test
    Diagnostic(DiagnosticTarget, String),
    /// Result of the start-up health check
    Health(bool),
}

impl AppEvent {
    /// Terminal input worth forwarding to the UI loop
    fn from_terminal(event: Event) -> Option<Self> {
        match event {
            // Key release/repeat reports would double every keystroke on some terminals
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
            Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
            Event::Resize(w, h) => Some(AppEvent::Resize(w, h)),
            _ => None,
        }
    }
}

/// Single queue the UI loop drains: terminal input, ticks, and whatever
/// background tasks report through [`EventHandler::sender`].
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_input_reader(tx.clone());
        spawn_ticker(tx.clone(), TICK_RATE);
        Self { rx, tx }
    }

    pub fn sender(&self) -> UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

fn spawn_input_reader(tx: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut input = EventStream::new();
        while let Some(read) = input.next().await {
            let Some(event) = read.ok().and_then(AppEvent::from_terminal) else {
                continue;
            };
            if tx.send(event).is_err() {
                return;
            }
        }
    });
}

fn spawn_ticker(tx: UnboundedSender<AppEvent>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if tx.send(AppEvent::Tick).is_err() {
                return;
            }
        }
    });
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stderr()))?)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), DisableMouseCapture, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Whether a panic on this thread takes the UI down with it.
///
/// The UI loop runs on the main thread. Background tasks run on runtime
/// workers, and their panics are turned into events by their supervisors.
fn owns_terminal(thread_name: Option<&str>) -> bool {
    thread_name == Some("main")
}

/// Restore the terminal before a UI panic is reported.
///
/// Panics on worker threads leave the terminal alone and go to the log, since
/// printing to stderr would scribble over the running UI.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if owns_terminal(std::thread::current().name()) {
            let _ = restore();
            default_hook(panic_info);
        } else {
            error!(panic = %panic_info, "background task panicked");
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};

    #[test]
    fn test_only_main_thread_owns_terminal() {
        assert!(owns_terminal(Some("main")));
        assert!(!owns_terminal(Some("tokio-runtime-worker")));
        assert!(!owns_terminal(None));
    }

    #[test]
    fn test_worker_thread_is_not_terminal_owner() {
        let owner = std::thread::Builder::new()
            .name("tokio-runtime-worker".to_string())
            .spawn(|| owns_terminal(std::thread::current().name()))
            .unwrap()
            .join()
            .unwrap();
        assert!(!owner);
    }

    #[test]
    fn test_only_key_presses_are_forwarded() {
        let press = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert!(matches!(
            AppEvent::from_terminal(Event::Key(press)),
            Some(AppEvent::Key(_))
        ));

        let release = KeyEvent {
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
            ..press
        };
        assert!(AppEvent::from_terminal(Event::Key(release)).is_none());
        assert!(AppEvent::from_terminal(Event::FocusGained).is_none());
        assert!(matches!(
            AppEvent::from_terminal(Event::Resize(80, 24)),
            Some(AppEvent::Resize(80, 24))
        ));
    }

    #[tokio::test]
    async fn test_ticker_sends_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_ticker(tx, Duration::from_millis(5));
        assert!(matches!(rx.recv().await, Some(AppEvent::Tick)));
        assert!(matches!(rx.recv().await, Some(AppEvent::Tick)));
    }
}
