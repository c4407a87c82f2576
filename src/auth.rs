//! Credential lookup for webhook callers and connecting devices
//!
//! Backed by the user table in the config file. Device credentials are
//! checked once per connection-open and cached on the resulting handle;
//! nothing here is consulted per message.

use std::collections::HashMap;

use crate::config::UserConfig;
use crate::devices::DeviceSlot;

/// Credential table keyed by owner id
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, UserConfig>,
}

impl CredentialStore {
    /// Build the store from the configured user table
    #[must_use]
    pub fn from_config(users: &[UserConfig]) -> Self {
        let users = users
            .iter()
            .map(|u| (u.id.clone(), u.clone()))
            .collect();
        Self { users }
    }

    /// Resolve a voice-platform access token to its owner
    #[must_use]
    pub fn owner_for_access_token(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        self.users
            .values()
            .find(|u| u.access_token == token)
            .map(|u| u.id.clone())
    }

    /// Check a device's connection credentials, returning which slot the
    /// presented token belongs to
    #[must_use]
    pub fn authenticate_device(&self, owner: &str, token: &str) -> Option<DeviceSlot> {
        let user = self.users.get(owner)?;
        if token.is_empty() {
            return None;
        }
        if user.laptop_token.as_deref() == Some(token) {
            Some(DeviceSlot::Laptop)
        } else if user.desktop_token.as_deref() == Some(token) {
            Some(DeviceSlot::Desktop)
        } else {
            None
        }
    }

    /// Stored wake-on-LAN MAC address for a device, if configured
    #[must_use]
    pub fn wol_mac(&self, owner: &str, slot: DeviceSlot) -> Option<String> {
        let user = self.users.get(owner)?;
        match slot {
            DeviceSlot::Laptop => user.laptop_mac.clone(),
            DeviceSlot::Desktop => user.desktop_mac.clone(),
        }
    }
}
