// Spotify integration - everything that talks to the playback backend
// The session controller only ever sees the PlaybackGateway trait

pub mod client;  // HTTP gateway against the notes backend
pub mod connect; // Web API device discovery (stands in for the browser SDK)
pub mod device;  // device readiness state machine

pub use client::HttpGateway;
pub use connect::WebApiDeviceBackend;
pub use device::{DeviceBackend, DeviceError, DeviceEvent, DeviceManager, DeviceStatus};

use crate::tracks::TrackIdentifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Duration assumed when metadata can't be fetched
pub const FALLBACK_DURATION_MS: u64 = 30_000;

/// The playback endpoint a ready device exposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    id: String,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl AuthStatus {
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Token for device initialisation, only when actually authenticated
    pub fn token(&self) -> Option<&str> {
        if self.authenticated {
            self.access_token.as_deref().filter(|t| !t.is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub duration_ms: u64,
    pub title: String,
}

impl TrackMetadata {
    /// Stand-in used whenever the metadata lookup fails
    pub fn fallback(track: &TrackIdentifier, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            title: track.to_string(),
        }
    }

    /// Playback starts halfway through the track
    pub fn start_offset_ms(&self) -> u64 {
        self.duration_ms / 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("Play error: {0}")]
    Transport(String),

    #[error("Play error: {message}")]
    Rejected { status: u16, message: String },
}

impl PlaybackError {
    pub fn message(&self) -> &str {
        match self {
            PlaybackError::Transport(message) => message,
            PlaybackError::Rejected { message, .. } => message,
        }
    }
}

/// Requests the session controller needs from the outside world.
///
/// Failure policy lives in the implementation: status and metadata lookups
/// never fail (they degrade to "not authenticated" and a fallback), pause is
/// fire-and-forget, and only `play` reports an error.
#[async_trait]
pub trait PlaybackGateway: Send + Sync {
    async fn fetch_status(&self) -> AuthStatus;

    async fn fetch_metadata(&self, track: &TrackIdentifier) -> TrackMetadata;

    async fn play(
        &self,
        device: &DeviceHandle,
        track: &TrackIdentifier,
        position_ms: u64,
    ) -> Result<(), PlaybackError>;

    async fn pause(&self, device: &DeviceHandle);
}

#[async_trait]
impl<T: PlaybackGateway + ?Sized> PlaybackGateway for Arc<T> {
    async fn fetch_status(&self) -> AuthStatus {
        (**self).fetch_status().await
    }

    async fn fetch_metadata(&self, track: &TrackIdentifier) -> TrackMetadata {
        (**self).fetch_metadata(track).await
    }

    async fn play(
        &self,
        device: &DeviceHandle,
        track: &TrackIdentifier,
        position_ms: u64,
    ) -> Result<(), PlaybackError> {
        (**self).play(device, track, position_ms).await
    }

    async fn pause(&self, device: &DeviceHandle) {
        (**self).pause(device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_offset_is_half_rounded_down() {
        let meta = TrackMetadata { duration_ms: 215_001, title: "x".to_string() };
        assert_eq!(meta.start_offset_ms(), 107_500);

        let track = TrackIdentifier::from_token("abc").unwrap();
        let fallback = TrackMetadata::fallback(&track, FALLBACK_DURATION_MS);
        assert_eq!(fallback.duration_ms, 30_000);
        assert_eq!(fallback.start_offset_ms(), 15_000);
        assert_eq!(fallback.title, "spotify:track:abc");
    }

    #[test]
    fn test_token_requires_authentication() {
        let status = AuthStatus { authenticated: false, access_token: Some("t".to_string()) };
        assert_eq!(status.token(), None);

        let status = AuthStatus { authenticated: true, access_token: Some("t".to_string()) };
        assert_eq!(status.token(), Some("t"));

        let status = AuthStatus { authenticated: true, access_token: Some(String::new()) };
        assert_eq!(status.token(), None);
    }
}
