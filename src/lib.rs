// halftime library - guided track review sessions
// Load a list of tracks, hear each from its midpoint, write a note, export

pub mod config;  // settings and defaults
pub mod export;  // notes -> CSV
pub mod session; // the review state machine + countdown
pub mod spotify; // playback gateway and device readiness
pub mod tracks;  // identifier parsing

#[cfg(feature = "tui")]
pub mod ui; // terminal review screen

// Export the stuff the binary actually uses
pub use config::Config;
pub use export::{ExportManager, ExportOutcome, ExportPrompt, ExportReceipt};
pub use session::{Note, NoteLog, Phase, SessionController, SessionError, SessionSnapshot};
pub use spotify::{DeviceManager, DeviceStatus, HttpGateway, PlaybackGateway, WebApiDeviceBackend};
pub use tracks::{IdentifierParser, TrackIdentifier, TrackList};
