// Device discovery through the Spotify Web API
// A terminal has no embedded player, so we bind to an existing Connect device
// (desktop app, phone, speaker) and keep polling to notice when it goes away.

use super::device::{DeviceBackend, DeviceEvent};
use crate::config::DeviceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct WebApiDeviceBackend {
    client: reqwest::Client,
    api_base: String,
    device_name: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<ConnectDevice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConnectDevice {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Why a poll failed, mapped onto the device error callbacks
#[derive(Debug)]
enum PollFailure {
    Unauthorized(String),
    Forbidden(String),
    Other(String),
}

impl WebApiDeviceBackend {
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            device_name: config.name.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    async fn list_devices(&self, token: &str) -> Result<Vec<ConnectDevice>, PollFailure> {
        let response = self
            .client
            .get(format!("{}/me/player/devices", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PollFailure::Other(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let list: DeviceList = response
                .json()
                .await
                .map_err(|e| PollFailure::Other(format!("Unreadable device list: {}", e)))?;
            return Ok(list.devices);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| if body.is_empty() { status.to_string() } else { body });

        Err(match status {
            StatusCode::UNAUTHORIZED => PollFailure::Unauthorized(message),
            StatusCode::FORBIDDEN => PollFailure::Forbidden(message),
            _ => PollFailure::Other(message),
        })
    }

    /// Named device if configured, else the active one, else the first usable one
    fn choose<'a>(&self, devices: &'a [ConnectDevice]) -> Option<&'a str> {
        let usable = || devices.iter().filter(|d| d.id.is_some());

        let chosen = match &self.device_name {
            Some(name) => usable().find(|d| d.name.eq_ignore_ascii_case(name)),
            None => usable().find(|d| d.is_active).or_else(|| usable().next()),
        };
        chosen.and_then(|d| d.id.as_deref())
    }
}

#[async_trait]
impl DeviceBackend for WebApiDeviceBackend {
    async fn run(&self, token: String, events: mpsc::UnboundedSender<DeviceEvent>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut ready: Option<String> = None;
        let mut ever_ready = false;

        loop {
            ticker.tick().await;
            if events.is_closed() {
                return;
            }

            let devices = match self.list_devices(&token).await {
                Ok(devices) => devices,
                Err(PollFailure::Unauthorized(message)) => {
                    let _ = events.send(DeviceEvent::AuthenticationError { message });
                    return;
                }
                Err(PollFailure::Forbidden(message)) => {
                    let _ = events.send(DeviceEvent::AccountError { message });
                    return;
                }
                Err(PollFailure::Other(message)) if !ever_ready => {
                    let _ = events.send(DeviceEvent::InitializationError { message });
                    return;
                }
                Err(PollFailure::Other(message)) => {
                    warn!("Device poll failed, will retry: {}", message);
                    continue;
                }
            };

            debug!("Device poll found {} devices", devices.len());
            let chosen = self.choose(&devices).map(str::to_string);

            match (chosen, ready.take()) {
                (Some(id), Some(current)) if id == current => ready = Some(current),
                (Some(id), _) => {
                    info!("Binding to playback device {}", id);
                    let _ = events.send(DeviceEvent::Ready { device_id: id.clone() });
                    ready = Some(id);
                    ever_ready = true;
                }
                (None, Some(current)) => {
                    let _ = events.send(DeviceEvent::NotReady { device_id: current });
                }
                (None, None) if !ever_ready => {
                    let message = match &self.device_name {
                        Some(name) => format!("No playback device named '{}' is available", name),
                        None => "No playback device is available - open Spotify on a device first".to_string(),
                    };
                    let _ = events.send(DeviceEvent::InitializationError { message });
                    return;
                }
                (None, None) => {}
            }
        }
    }
}
