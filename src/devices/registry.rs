//! Registry of currently reachable devices
//!
//! Maps (owner, device slot) to exactly one live connection handle. The
//! registry is the only state shared across all connections and webhook
//! calls; it is in-memory only, and a gateway restart forces every device
//! to reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{DeviceHandle, DeviceKey};

/// Shared registry state, one critical section per operation
pub type SharedDeviceRegistry = Arc<Mutex<DeviceRegistry>>;

/// Registry of connected devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceKey, DeviceHandle>,
}

impl DeviceRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, overwriting any existing handle for its key
    ///
    /// Always succeeds. Returns the displaced handle, if any; the old
    /// transport is not closed by the replacement, it simply becomes
    /// unreachable through the registry.
    pub fn register(&mut self, handle: DeviceHandle) -> Option<DeviceHandle> {
        self.devices.insert(handle.key.clone(), handle)
    }

    /// Look up the live handle for a key; `None` means the device is offline
    #[must_use]
    pub fn lookup(&self, key: &DeviceKey) -> Option<DeviceHandle> {
        self.devices.get(key).cloned()
    }

    /// Remove the entry for `key`, but only if the registered connection is
    /// the one identified by `conn_id`
    ///
    /// A close event for a connection that has since been replaced must not
    /// evict its replacement. Returns whether an entry was removed.
    pub fn unregister(&mut self, key: &DeviceKey, conn_id: Uuid) -> bool {
        match self.devices.get(key) {
            Some(current) if current.conn_id == conn_id => {
                self.devices.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Reverse lookup: which key a connection is registered under, if any
    ///
    /// Used by close paths that only know their own connection. Full scan;
    /// the table is small (one entry per online device).
    #[must_use]
    pub fn find_key(&self, conn_id: Uuid) -> Option<DeviceKey> {
        self.devices
            .values()
            .find(|h| h.conn_id == conn_id)
            .map(|h| h.key.clone())
    }

    /// Number of online devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are online
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
