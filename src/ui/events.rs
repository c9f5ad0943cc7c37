use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Quit,
    Render,

    // Session
    Connect,
    Start,
    Retry,
    Export,
    ClearNotes,

    // Note entry
    Input(char),
    Backspace,
    Submit,
}

/// Raw terminal input, mapped to AppEvents by the app depending on mode
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    Key(KeyEvent),
    Resize,
}

pub struct EventHandler {
    event_sender: mpsc::UnboundedSender<TerminalEvent>,
    event_receiver: mpsc::UnboundedReceiver<TerminalEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        Self {
            event_sender,
            event_receiver,
        }
    }

    /// Poll crossterm on a blocking thread until the receiver goes away
    pub fn spawn_reader(&self) {
        let sender = self.event_sender.clone();
        tokio::task::spawn_blocking(move || {
            while !sender.is_closed() {
                match event::poll(Duration::from_millis(50)) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        warn!("Terminal poll failed: {}", e);
                        break;
                    }
                }

                let forwarded = match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => sender.send(TerminalEvent::Key(key)),
                    Ok(Event::Resize(_, _)) => sender.send(TerminalEvent::Resize),
                    Ok(_) => Ok(()),
                    Err(e) => {
                        warn!("Terminal read failed: {}", e);
                        break;
                    }
                };
                if forwarded.is_err() {
                    break;
                }
            }
        });
    }

    pub async fn next_event(&mut self) -> Option<TerminalEvent> {
        self.event_receiver.recv().await
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// While a note is being written every printable key is text; otherwise keys are commands
pub fn key_to_app_event(key: KeyEvent, note_entry: bool) -> Option<AppEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(AppEvent::Quit);
    }

    if note_entry {
        return match key.code {
            KeyCode::Esc => Some(AppEvent::Quit),
            KeyCode::Enter => Some(AppEvent::Submit),
            KeyCode::Backspace => Some(AppEvent::Backspace),
            KeyCode::Char(c) => Some(AppEvent::Input(c)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(AppEvent::Quit),
        KeyCode::Char('c') => Some(AppEvent::Connect),
        KeyCode::Char('s') => Some(AppEvent::Start),
        KeyCode::Char('r') => Some(AppEvent::Retry),
        KeyCode::Char('e') => Some(AppEvent::Export),
        KeyCode::Char('x') => Some(AppEvent::ClearNotes),
        _ => None,
    }
}
