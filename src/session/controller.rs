use super::countdown::{Countdown, CountdownTick};
use super::{NoteLog, Phase, SessionError, SessionSnapshot, SessionState};
use crate::spotify::{DeviceHandle, DeviceStatus, PlaybackGateway};
use crate::tracks::TrackList;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Drives one review session: play each track from its midpoint, wait for a
/// note, move on. Sole owner of the notes and the session state; reads the
/// device only through the watch receiver handed in at construction.
pub struct SessionController<G> {
    gateway: G,
    device: watch::Receiver<DeviceStatus>,
    tracks: TrackList,
    notes: NoteLog,
    position: usize,
    phase: Phase,
    remaining_seconds: u32,
    window_seconds: u32,
    countdown: Countdown,
    current_title: Option<String>,
    last_error: Option<String>,
    unexported: bool,
}

impl<G: PlaybackGateway> SessionController<G> {
    /// Returns the controller and the tick stream its countdown feeds.
    /// The caller routes each tick back into `on_tick`.
    pub fn new(
        gateway: G,
        device: watch::Receiver<DeviceStatus>,
        window_seconds: u32,
    ) -> (Self, mpsc::UnboundedReceiver<CountdownTick>) {
        let (countdown, ticks) = Countdown::new(Duration::from_secs(1));

        let controller = Self {
            gateway,
            device,
            tracks: TrackList::default(),
            notes: NoteLog::new(),
            position: 0,
            phase: Phase::Idle,
            remaining_seconds: 0,
            window_seconds: window_seconds.max(1),
            countdown,
            current_title: None,
            last_error: None,
            unexported: false,
        };
        (controller, ticks)
    }

    /// Replace the review list. Not allowed while a track is playing.
    pub fn load(&mut self, tracks: TrackList) -> Result<(), SessionError> {
        if self.phase == Phase::AwaitingNote {
            return Err(SessionError::Busy);
        }

        info!("Loaded {} tracks for review", tracks.len());
        self.countdown.disarm();
        self.tracks = tracks;
        self.position = 0;
        self.phase = Phase::Idle;
        self.remaining_seconds = 0;
        self.current_title = None;
        self.last_error = None;
        Ok(())
    }

    pub fn can_start(&self) -> bool {
        !self.tracks.is_empty() && self.device_handle().is_some() && self.phase != Phase::AwaitingNote
    }

    /// Begin a fresh session from the first track. Clears earlier notes.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.phase == Phase::AwaitingNote {
            return self.fail(SessionError::Busy);
        }
        if self.tracks.is_empty() {
            return self.fail(SessionError::NoTracks);
        }
        if self.device_handle().is_none() {
            return self.fail(SessionError::DeviceNotReady);
        }

        info!("Starting review of {} tracks", self.tracks.len());
        self.countdown.disarm();
        self.notes.clear();
        self.unexported = false;
        self.position = 0;
        self.phase = Phase::Preparing;
        self.last_error = None;

        self.prepare_current().await
    }

    /// Try the current track again after a play failure, keeping notes so far
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Preparing {
            return Err(SessionError::NotPreparing);
        }
        self.prepare_current().await
    }

    /// Record the note for the current track and move to the next one.
    /// Works whether or not the listening window has run out.
    pub async fn advance(&mut self, note: &str) -> Result<Phase, SessionError> {
        if self.phase != Phase::AwaitingNote {
            return Err(SessionError::NotAwaitingNote);
        }

        self.countdown.disarm();

        let Some(track) = self.tracks.get(self.position).cloned() else {
            return Err(SessionError::NotAwaitingNote);
        };
        debug!("Note for {}: {:?}", track, note.trim());
        self.notes.push(track, note.trim());
        self.unexported = true;
        self.position += 1;

        if self.position >= self.tracks.len() {
            self.phase = Phase::Finished;
            self.remaining_seconds = 0;
            self.current_title = None;
            info!("Review finished: {} notes", self.notes.len());
            self.pause_playback().await;
            return Ok(Phase::Finished);
        }

        self.phase = Phase::Preparing;
        self.prepare_current().await?;
        Ok(self.phase)
    }

    /// Handle one countdown tick. Returns false for ticks that no longer apply.
    pub async fn on_tick(&mut self, tick: CountdownTick) -> bool {
        if self.phase != Phase::AwaitingNote || !self.countdown.accepts(tick) {
            debug!("Dropping stale countdown tick");
            return false;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            // window is over; the note can still be written
            self.countdown.disarm();
            info!("Listening window elapsed, pausing");
            self.pause_playback().await;
        }
        true
    }

    /// Forget recorded notes. Only between sessions.
    pub fn clear_notes(&mut self) -> Result<(), SessionError> {
        if matches!(self.phase, Phase::Preparing | Phase::AwaitingNote) {
            return Err(SessionError::Busy);
        }
        self.notes.clear();
        self.unexported = false;
        Ok(())
    }

    /// True once a note has been recorded that no export has covered yet
    pub fn has_unexported_notes(&self) -> bool {
        self.unexported
    }

    pub fn mark_exported(&mut self) {
        self.unexported = false;
    }

    /// Leave without losing the device's state: stop the countdown and pause
    /// whatever is still playing.
    pub async fn shutdown(&mut self) {
        self.countdown.disarm();

        let playing = match self.phase {
            Phase::Preparing => true,
            Phase::AwaitingNote => self.remaining_seconds > 0,
            Phase::Idle | Phase::Finished => false,
        };
        if playing {
            info!("Pausing playback before leaving");
            self.pause_playback().await;
        }
    }

    pub fn notes(&self) -> &NoteLog {
        &self.notes
    }

    pub fn tracks(&self) -> &TrackList {
        &self.tracks
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_armed(&self) -> bool {
        self.countdown.is_armed()
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            position: self.position,
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            device_ready: self.device_handle().is_some(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            total: self.tracks.len(),
            notes_recorded: self.notes.len(),
            title: self.current_title.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn device_handle(&self) -> Option<DeviceHandle> {
        self.device.borrow().handle().cloned()
    }

    /// Fetch metadata, play from the midpoint, arm the countdown.
    /// On a play failure the phase stays Preparing and nothing moves.
    async fn prepare_current(&mut self) -> Result<(), SessionError> {
        self.countdown.disarm();

        let Some(track) = self.tracks.get(self.position).cloned() else {
            return Err(SessionError::NotPreparing);
        };
        let Some(device) = self.device_handle() else {
            return self.fail(SessionError::DeviceNotReady);
        };

        debug!("Preparing {}/{}: {}", self.position + 1, self.tracks.len(), track);
        let meta = self.gateway.fetch_metadata(&track).await;
        let offset = meta.start_offset_ms();

        if let Err(e) = self.gateway.play(&device, &track, offset).await {
            warn!("Could not start {}: {}", track, e);
            return self.fail(e.into());
        }

        self.current_title = Some(meta.title);
        self.remaining_seconds = self.window_seconds;
        self.phase = Phase::AwaitingNote;
        self.last_error = None;
        self.countdown.arm();
        info!("Reviewing {}/{} from {} ms", self.position + 1, self.tracks.len(), offset);
        Ok(())
    }

    async fn pause_playback(&self) {
        match self.device_handle() {
            Some(device) => self.gateway.pause(&device).await,
            None => debug!("No ready device to pause"),
        }
    }

    fn fail<T>(&mut self, error: SessionError) -> Result<T, SessionError> {
        self.last_error = Some(error.to_string());
        Err(error)
    }
}
