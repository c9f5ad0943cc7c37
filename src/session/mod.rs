// Review sessions - the part that actually runs the show
// One controller owns the track list, the notes, the countdown and the phase

pub mod controller; // the state machine
pub mod countdown;  // cancelable one-second ticker

pub use controller::SessionController;
pub use countdown::{Countdown, CountdownTick};

use crate::spotify::PlaybackError;
use crate::tracks::TrackIdentifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    AwaitingNote,
    Finished,
}

/// What the user wrote about one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub track: TrackIdentifier,
    pub text: String,
}

/// Notes in review order, one per completed track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLog {
    notes: Vec<Note>,
}

impl NoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, track: TrackIdentifier, text: impl Into<String>) {
        self.notes.push(Note {
            track,
            text: text.into(),
        });
    }

    pub(crate) fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Note> {
        self.notes.iter()
    }

    pub fn as_slice(&self) -> &[Note] {
        &self.notes
    }
}

impl FromIterator<Note> for NoteLog {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        Self {
            notes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a NoteLog {
    type Item = &'a Note;
    type IntoIter = std::slice::Iter<'a, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

/// The controller's mutable record.
/// `position == total` only once the phase is Finished (for a non-empty list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub position: usize,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub device_ready: bool,
}

/// Read-only view handed to the UI each frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub total: usize,
    pub notes_recorded: usize,
    pub title: Option<String>,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn progress_text(&self) -> String {
        let total = self.total;
        match self.state.phase {
            Phase::Idle if total == 0 => "No tracks loaded".to_string(),
            Phase::Idle => format!("Loaded {} URIs", total),
            Phase::Preparing => format!("Preparing {}/{}…", self.state.position + 1, total),
            Phase::AwaitingNote => format!("Track {}/{}", self.state.position + 1, total),
            Phase::Finished => format!("Done: {}/{}", total, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Load a track list before starting")]
    NoTracks,

    #[error("Connect a playback device before starting")]
    DeviceNotReady,

    #[error("A review session is in progress")]
    Busy,

    #[error("No track is waiting for a note")]
    NotAwaitingNote,

    #[error("Nothing to retry")]
    NotPreparing,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(phase: Phase, position: usize, total: usize) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState {
                position,
                phase,
                remaining_seconds: 0,
                device_ready: true,
            },
            total,
            notes_recorded: 0,
            title: None,
            last_error: None,
        }
    }

    #[test]
    fn test_progress_text() {
        assert_eq!(snapshot(Phase::Idle, 0, 0).progress_text(), "No tracks loaded");
        assert_eq!(snapshot(Phase::Idle, 0, 4).progress_text(), "Loaded 4 URIs");
        assert_eq!(snapshot(Phase::Preparing, 2, 4).progress_text(), "Preparing 3/4…");
        assert_eq!(snapshot(Phase::AwaitingNote, 2, 4).progress_text(), "Track 3/4");
        assert_eq!(snapshot(Phase::Finished, 4, 4).progress_text(), "Done: 4/4");
    }

    #[test]
    fn test_note_log_keeps_order() {
        let a = TrackIdentifier::from_token("a").unwrap();
        let b = TrackIdentifier::from_token("b").unwrap();

        let mut log = NoteLog::new();
        log.push(b.clone(), "second thoughts first");
        log.push(a.clone(), "");

        let tracks: Vec<_> = log.iter().map(|n| n.track.clone()).collect();
        assert_eq!(tracks, vec![b, a]);
        assert_eq!(log.as_slice()[1].text, "");

        log.clear();
        assert!(log.is_empty());
    }
}
