//! Core types for tracking connected devices

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::WireMessage;

/// Outbound message queue depth per connection
const SEND_QUEUE_DEPTH: usize = 32;

/// Which physical machine under an owner is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSlot {
    Laptop,
    Desktop,
}

impl DeviceSlot {
    /// Parse a spoken device name, tolerating case and surrounding whitespace
    ///
    /// Returns `None` for empty or unrecognized input (the voice platform
    /// sends an empty string when no computer was named).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "laptop" => Some(Self::Laptop),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Laptop => write!(f, "laptop"),
            Self::Desktop => write!(f, "desktop"),
        }
    }
}

/// Registry key: one machine under one owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    /// Opaque account identifier; validated by the credential store, not here
    pub owner: String,
    pub slot: DeviceSlot,
}

impl DeviceKey {
    #[must_use]
    pub fn new(owner: impl Into<String>, slot: DeviceSlot) -> Self {
        Self {
            owner: owner.into(),
            slot,
        }
    }
}

/// Error returned when a handle's writer task has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

impl fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection closed")
    }
}

impl std::error::Error for ConnectionClosed {}

/// One live device connection
///
/// Created when a device's handshake succeeds and destroyed when the
/// transport closes. Credentials are resolved once at connection-open and
/// cached here; messages are never re-authenticated. The handle is cheap to
/// clone — clones share the same outbound queue.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    /// Unique id for this connection, distinguishing it from any earlier or
    /// later connection for the same key
    pub conn_id: Uuid,
    pub key: DeviceKey,
    /// Peer address, used to answer location queries
    pub remote_ip: Option<IpAddr>,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    tx: mpsc::Sender<WireMessage>,
}

impl DeviceHandle {
    /// Create a handle and the receiving end of its outbound queue
    ///
    /// The caller owns the receiver and drains it into the transport; once
    /// the receiver is dropped, `send` fails with [`ConnectionClosed`].
    #[must_use]
    pub fn new(key: DeviceKey, remote_ip: Option<IpAddr>) -> (Self, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let handle = Self {
            conn_id: Uuid::new_v4(),
            key,
            remote_ip,
            connected_at: chrono::Utc::now(),
            tx,
        };
        (handle, rx)
    }

    /// Queue an outbound message for the device
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionClosed`] if the underlying transport has shut down.
    pub async fn send(&self, message: WireMessage) -> Result<(), ConnectionClosed> {
        self.tx.send(message).await.map_err(|_| ConnectionClosed)
    }
}
