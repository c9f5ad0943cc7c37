use super::{AuthStatus, DeviceHandle, PlaybackError, PlaybackGateway, TrackMetadata};
use crate::config::GatewayConfig;
use crate::tracks::TrackIdentifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gateway backed by the notes backend's HTTP proxy endpoints
pub struct HttpGateway {
    client: reqwest::Client,
    api_base: String,
    status_url: String,
    fallback_duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct PlayRequest<'a> {
    device_id: &'a str,
    uris: [&'a str; 1],
    position_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    // the backend sends `null` as readily as it omits the field
    #[serde(default)]
    artists: Option<Vec<ArtistRef>>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    #[serde(default)]
    name: Option<String>,
}

impl TrackResponse {
    fn into_metadata(self, track: &TrackIdentifier) -> TrackMetadata {
        let artists: Vec<String> = self
            .artists
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name.filter(|n| !n.is_empty()))
            .collect();

        let title = match self.name.filter(|n| !n.is_empty()) {
            Some(name) if !artists.is_empty() => format!("{} — {}", name, artists.join(", ")),
            Some(name) => name,
            None => track.to_string(),
        };

        TrackMetadata {
            duration_ms: self.duration_ms.unwrap_or(0),
            title,
        }
    }
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig, fallback_duration_ms: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie).context("Session cookie is not a valid header value")?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            api_base: format!("{}{}", base, config.api_prefix.trim_end_matches('/')),
            status_url: format!("{}{}", base, config.status_path),
            fallback_duration_ms,
        })
    }

    async fn try_fetch_metadata(&self, track: &TrackIdentifier) -> Result<TrackMetadata> {
        let url = format!("{}/track/{}", self.api_base, track.token());
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: TrackResponse = response.json().await?;
        Ok(body.into_metadata(track))
    }

    async fn try_fetch_status(&self) -> Result<AuthStatus> {
        let response = self.client.get(&self.status_url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PlaybackGateway for HttpGateway {
    #[tracing::instrument(skip(self))]
    async fn fetch_status(&self) -> AuthStatus {
        match self.try_fetch_status().await {
            Ok(status) => status,
            Err(e) => {
                debug!("Status check failed, treating as logged out: {}", e);
                AuthStatus::unauthenticated()
            }
        }
    }

    #[tracing::instrument(skip(self, track), fields(track = %track))]
    async fn fetch_metadata(&self, track: &TrackIdentifier) -> TrackMetadata {
        match self.try_fetch_metadata(track).await {
            Ok(meta) => {
                debug!("Metadata: {} ({} ms)", meta.title, meta.duration_ms);
                meta
            }
            Err(e) => {
                warn!("Metadata lookup failed, using {} ms fallback: {}", self.fallback_duration_ms, e);
                TrackMetadata::fallback(track, self.fallback_duration_ms)
            }
        }
    }

    #[tracing::instrument(skip(self, device, track), fields(device = %device.id(), track = %track))]
    async fn play(
        &self,
        device: &DeviceHandle,
        track: &TrackIdentifier,
        position_ms: u64,
    ) -> Result<(), PlaybackError> {
        let body = PlayRequest {
            device_id: device.id(),
            uris: [track.as_str()],
            position_ms,
        };

        let response = self
            .client
            .put(format!("{}/play", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlaybackError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Playing from {} ms", position_ms);
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = if text.trim().is_empty() {
            status.to_string()
        } else {
            text
        };
        Err(PlaybackError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    #[tracing::instrument(skip(self, device), fields(device = %device.id()))]
    async fn pause(&self, device: &DeviceHandle) {
        let result = self
            .client
            .put(format!("{}/pause", self.api_base))
            .query(&[("device_id", device.id())])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => debug!("Paused"),
            Ok(response) => warn!("Pause rejected with {}", response.status()),
            Err(e) => warn!("Pause request failed: {}", e),
        }
    }
}
