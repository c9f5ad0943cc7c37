use super::events::{key_to_app_event, TerminalEvent};
use super::{AppEvent, EventHandler, TerminalManager};
use crate::export::{ExportOutcome, ExportPrompt};
use crate::session::{CountdownTick, Phase, SessionController, SessionSnapshot};
use crate::spotify::{DeviceBackend, DeviceEvent, DeviceManager, DeviceStatus, PlaybackGateway};
use anyhow::Result;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Everything the event loop can wake up for
enum LoopEvent {
    Terminal(TerminalEvent),
    Tick(CountdownTick),
    Device(DeviceEvent),
}

/// What one frame needs, copied out so drawing doesn't borrow the app
struct Screen {
    snapshot: SessionSnapshot,
    device: DeviceStatus,
    note: String,
    status: String,
    window_seconds: u32,
}

pub struct ReviewApp<G, B> {
    terminal: TerminalManager,
    gateway: G,
    controller: SessionController<G>,
    ticks: mpsc::UnboundedReceiver<CountdownTick>,
    devices: DeviceManager,
    device_backend: Arc<B>,
    exporter: ExportPrompt,
    window_seconds: u32,

    // UI state
    note: String,
    status: String,
    confirm_quit: bool,
    should_quit: bool,
}

impl<G, B> ReviewApp<G, B>
where
    G: PlaybackGateway + Clone,
    B: DeviceBackend + 'static,
{
    pub fn new(
        gateway: G,
        device_backend: Arc<B>,
        controller: (SessionController<G>, mpsc::UnboundedReceiver<CountdownTick>),
        devices: DeviceManager,
        exporter: ExportPrompt,
        window_seconds: u32,
    ) -> Result<Self> {
        let terminal = TerminalManager::new()?;
        let (controller, ticks) = controller;

        Ok(Self {
            terminal,
            gateway,
            controller,
            ticks,
            devices,
            device_backend,
            exporter,
            window_seconds,
            note: String::new(),
            status: String::new(),
            confirm_quit: false,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut input = EventHandler::new();
        input.spawn_reader();

        self.connect_device().await;

        while !self.should_quit {
            let screen = self.screen();
            self.terminal.draw(|f| Self::render_ui(f, &screen))?;

            let event = tokio::select! {
                Some(event) = input.next_event() => LoopEvent::Terminal(event),
                Some(tick) = self.ticks.recv() => LoopEvent::Tick(tick),
                Some(event) = self.devices.next_event() => LoopEvent::Device(event),
                else => break,
            };

            match event {
                LoopEvent::Terminal(TerminalEvent::Key(key)) => {
                    let note_entry = self.controller.phase() == Phase::AwaitingNote;
                    if let Some(app_event) = key_to_app_event(key, note_entry) {
                        self.handle_event(app_event).await?;
                    }
                }
                LoopEvent::Terminal(TerminalEvent::Resize) => self.handle_event(AppEvent::Render).await?,
                LoopEvent::Tick(tick) => {
                    self.controller.on_tick(tick).await;
                }
                LoopEvent::Device(event) => {
                    self.devices.apply(event);
                }
            }
        }

        self.controller.shutdown().await;
        info!("Leaving review screen");
        Ok(())
    }

    async fn handle_event(&mut self, event: AppEvent) -> Result<()> {
        if !matches!(event, AppEvent::Export | AppEvent::Render) {
            self.exporter.reset();
        }
        if !matches!(event, AppEvent::Quit | AppEvent::Render) {
            self.confirm_quit = false;
        }

        match event {
            AppEvent::Quit => {
                if self.controller.has_unexported_notes() && !self.confirm_quit {
                    self.confirm_quit = true;
                    self.status = "Notes not exported yet. Quit again to discard them.".to_string();
                } else {
                    self.should_quit = true;
                }
            }
            AppEvent::Render => {}
            AppEvent::Connect => {
                self.connect_device().await;
            }
            AppEvent::Start => {
                self.note.clear();
                self.status = match self.controller.start().await {
                    Ok(()) => String::new(),
                    Err(e) => e.to_string(),
                };
            }
            AppEvent::Retry => {
                self.status = match self.controller.retry().await {
                    Ok(()) => String::new(),
                    Err(e) => e.to_string(),
                };
            }
            AppEvent::Export => {
                self.export();
            }
            AppEvent::ClearNotes => {
                self.status = match self.controller.clear_notes() {
                    Ok(()) => "Notes cleared".to_string(),
                    Err(e) => e.to_string(),
                };
            }
            AppEvent::Input(c) => {
                self.note.push(c);
            }
            AppEvent::Backspace => {
                self.note.pop();
            }
            AppEvent::Submit => {
                let note = std::mem::take(&mut self.note);
                self.status = match self.controller.advance(&note).await {
                    Ok(Phase::Finished) => "All tracks reviewed. Press e to export.".to_string(),
                    Ok(_) => String::new(),
                    Err(e) => e.to_string(),
                };
            }
        }

        Ok(())
    }

    async fn connect_device(&mut self) {
        let auth = self.gateway.fetch_status().await;
        if !auth.authenticated {
            self.status = "Not logged in. Run `halftime login`, then press c.".to_string();
            return;
        }

        self.status = match self.devices.connect(auth.token(), self.device_backend.clone()) {
            Ok(()) => "Logged in".to_string(),
            Err(e) => e.to_string(),
        };
    }

    fn export(&mut self) {
        self.status = match self.exporter.request(self.controller.notes()) {
            Ok(ExportOutcome::NeedsConfirmation) => {
                "No notes yet to download. Press e again to export anyway.".to_string()
            }
            Ok(ExportOutcome::Exported(receipt)) => {
                self.controller.mark_exported();
                format!("Saved {} notes to {}", receipt.rows, receipt.path.display())
            }
            Err(e) => format!("Export failed: {:#}", e),
        };
    }

    fn screen(&self) -> Screen {
        Screen {
            snapshot: self.controller.snapshot(),
            device: self.devices.status(),
            note: self.note.clone(),
            status: self.status.clone(),
            window_seconds: self.window_seconds,
        }
    }

    fn render_ui(f: &mut Frame, screen: &Screen) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(4), // Progress + device
                Constraint::Length(5), // Now reviewing
                Constraint::Min(3),    // Note
                Constraint::Length(3), // Status
                Constraint::Length(1), // Keys
            ])
            .split(f.area());

        Self::render_header(f, chunks[0]);
        Self::render_progress(f, chunks[1], screen);
        Self::render_track(f, chunks[2], screen);
        Self::render_note(f, chunks[3], screen);
        Self::render_status(f, chunks[4], screen);
        Self::render_keys(f, chunks[5], screen.snapshot.state.phase);
    }

    fn render_header(f: &mut Frame, area: Rect) {
        let title = Paragraph::new("halftime - track review")
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL));

        f.render_widget(title, area);
    }

    fn render_progress(f: &mut Frame, area: Rect, screen: &Screen) {
        let device_style = match &screen.device {
            DeviceStatus::Ready(_) => Style::default().fg(Color::Green),
            DeviceStatus::Errored(_) => Style::default().fg(Color::Red),
            _ => Style::default().fg(Color::Yellow),
        };

        let lines = vec![
            Line::from(screen.snapshot.progress_text()),
            Line::styled(screen.device.describe(), device_style),
        ];
        let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Session"));
        f.render_widget(widget, area);
    }

    fn render_track(f: &mut Frame, area: Rect, screen: &Screen) {
        let block = Block::default().borders(Borders::ALL).title("Now reviewing");
        let state = screen.snapshot.state;

        if state.phase != Phase::AwaitingNote {
            f.render_widget(Paragraph::new("").block(block), area);
            return;
        }

        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(0)])
            .split(inner);

        let title = screen.snapshot.title.clone().unwrap_or_default();
        f.render_widget(
            Paragraph::new(title).style(Style::default().add_modifier(Modifier::BOLD)),
            rows[0],
        );

        let ratio = if screen.window_seconds == 0 {
            0.0
        } else {
            f64::from(state.remaining_seconds) / f64::from(screen.window_seconds)
        };
        let label = if state.remaining_seconds == 0 {
            "paused - take your time".to_string()
        } else {
            format!("{}s", state.remaining_seconds)
        };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(ratio.clamp(0.0, 1.0))
            .label(label);
        f.render_widget(gauge, rows[1]);
    }

    fn render_note(f: &mut Frame, area: Rect, screen: &Screen) {
        let editing = screen.snapshot.state.phase == Phase::AwaitingNote;
        let border_style = if editing {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let text = if editing {
            format!("{}_", screen.note)
        } else {
            format!("{} notes recorded", screen.snapshot.notes_recorded)
        };

        let widget = Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).border_style(border_style).title("Note"));
        f.render_widget(widget, area);
    }

    fn render_status(f: &mut Frame, area: Rect, screen: &Screen) {
        let (text, style) = match &screen.snapshot.last_error {
            Some(error) if screen.snapshot.state.phase == Phase::Preparing => {
                (format!("{} - press r to retry or s to restart", error), Style::default().fg(Color::Red))
            }
            _ => (screen.status.clone(), Style::default()),
        };

        let widget = Paragraph::new(text)
            .style(style)
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(widget, area);
    }

    fn render_keys(f: &mut Frame, area: Rect, phase: Phase) {
        let help = match phase {
            Phase::AwaitingNote => "type your note · Enter next track · Esc quit",
            Phase::Preparing => "r retry · s restart · q quit",
            Phase::Idle | Phase::Finished => "c connect · s start · e export · x clear notes · q quit",
        };
        f.render_widget(Paragraph::new(help).style(Style::default().fg(Color::DarkGray)), area);
    }
}
