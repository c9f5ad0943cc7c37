use super::DeviceHandle;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Readiness callbacks from the playback device, as tagged events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    InitializationError { message: String },
    AuthenticationError { message: String },
    AccountError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Please log in first.")]
    MissingToken,

    #[error("Init error: {0}")]
    Initialization(String),

    #[error("Auth error: {0}")]
    Authentication(String),

    #[error("Account error (Premium required): {0}")]
    Account(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connecting,
    Ready(DeviceHandle),
    Errored(DeviceError),
}

impl DeviceStatus {
    pub fn handle(&self) -> Option<&DeviceHandle> {
        match self {
            DeviceStatus::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle().is_some()
    }

    /// One-line description for the status area
    pub fn describe(&self) -> String {
        match self {
            DeviceStatus::Disconnected => "Player not connected".to_string(),
            DeviceStatus::Connecting => "Connecting player…".to_string(),
            DeviceStatus::Ready(handle) => format!("Player ready. Device: {}", handle.id()),
            DeviceStatus::Errored(error) => error.to_string(),
        }
    }

    /// Pure transition function. `None` means the event doesn't apply here.
    pub fn on_event(&self, event: &DeviceEvent) -> Option<DeviceStatus> {
        let live = matches!(self, DeviceStatus::Connecting | DeviceStatus::Ready(_));
        if !live {
            return None;
        }

        match event {
            DeviceEvent::Ready { device_id } => {
                if self.handle().map(|h| h.id()) == Some(device_id.as_str()) {
                    None
                } else {
                    Some(DeviceStatus::Ready(DeviceHandle::new(device_id.clone())))
                }
            }
            DeviceEvent::NotReady { device_id } => match self {
                DeviceStatus::Ready(handle) if handle.id() == device_id => Some(DeviceStatus::Connecting),
                _ => None,
            },
            DeviceEvent::InitializationError { message } => {
                Some(DeviceStatus::Errored(DeviceError::Initialization(message.clone())))
            }
            DeviceEvent::AuthenticationError { message } => {
                Some(DeviceStatus::Errored(DeviceError::Authentication(message.clone())))
            }
            DeviceEvent::AccountError { message } => {
                Some(DeviceStatus::Errored(DeviceError::Account(message.clone())))
            }
        }
    }
}

/// Something that can bring up a playback device and report on it
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Runs until the device is gone for good; every state change is sent as an event
    async fn run(&self, token: String, events: mpsc::UnboundedSender<DeviceEvent>);
}

/// Owns the one playback device. The only writer of device state;
/// everyone else reads it through `subscribe()`.
///
/// Each connect gets its own event channel, so nothing an earlier backend
/// queued can reach the state machine after a reconnect.
pub struct DeviceManager {
    status: watch::Sender<DeviceStatus>,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
    events_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    backend_task: Option<JoinHandle<()>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        let (status, _) = watch::channel(DeviceStatus::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            status,
            events_tx,
            events_rx,
            backend_task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.borrow().clone()
    }

    /// Sender for the current connection; goes dead on the next connect
    pub fn event_sender(&self) -> mpsc::UnboundedSender<DeviceEvent> {
        self.events_tx.clone()
    }

    /// Next event from the current connection's backend, to be fed into `apply`.
    /// Cancel safe, so it can sit in a `select!`.
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        self.events_rx.recv().await
    }

    /// Start connecting. Needs a token; without one nothing changes.
    pub fn connect<B>(&mut self, token: Option<&str>, backend: Arc<B>) -> Result<(), DeviceError>
    where
        B: DeviceBackend + 'static,
    {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            warn!("Device connect requested without an access token");
            return Err(DeviceError::MissingToken);
        };

        self.stop_backend();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;
        self.status.send_replace(DeviceStatus::Connecting);
        info!("Connecting playback device");

        let token = token.to_string();
        let events = self.events_tx.clone();
        self.backend_task = Some(tokio::spawn(async move {
            backend.run(token, events).await;
        }));

        Ok(())
    }

    /// Feed one device event through the state machine. Returns true if state changed.
    pub fn apply(&mut self, event: DeviceEvent) -> bool {
        let current = self.status();
        let Some(next) = current.on_event(&event) else {
            debug!("Ignoring {:?} while {:?}", event, current);
            return false;
        };

        match &next {
            DeviceStatus::Ready(handle) => info!("Player ready. Device: {}", handle.id()),
            DeviceStatus::Connecting => warn!("Player not ready, waiting for it to come back"),
            DeviceStatus::Errored(error) => {
                warn!("Device error: {}", error);
                self.stop_backend();
            }
            DeviceStatus::Disconnected => {}
        }

        self.status.send_replace(next);
        true
    }

    pub fn disconnect(&mut self) {
        self.stop_backend();
        self.status.send_replace(DeviceStatus::Disconnected);
    }

    fn stop_backend(&mut self) {
        if let Some(task) = self.backend_task.take() {
            task.abort();
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.stop_backend();
    }
}
