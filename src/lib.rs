//! Homelink - relay gateway for controlling remote machines from a voice
//! assistant
//!
//! Machines behind NAT or firewalls cannot be reached directly, so each one
//! runs an agent that keeps an outbound WebSocket open to the gateway. The
//! voice platform's webhook addresses a machine by (owner, device slot),
//! and the gateway forwards the command or query over the live connection,
//! blocking the webhook response until the machine answers or a timeout
//! fires.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   webhook    ┌─────────────────────────────┐
//! │  Voice platform  ├─────────────►│       Homelink gateway       │
//! └──────────────────┘              │  registry  │  correlator     │
//!                                   └──────▲──────────────▲────────┘
//!                                          │ ws           │ ws
//!                                   ┌──────┴─────┐  ┌─────┴──────┐
//!                                   │   laptop   │  │  desktop   │
//!                                   │   agent    │  │   agent    │
//!                                   └────────────┘  └────────────┘
//! ```
//!
//! The registry is in-memory only; a gateway restart forces every device to
//! reconnect.

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod devices;
pub mod error;
pub mod geo;
pub mod protocol;
pub mod wake;

pub use auth::CredentialStore;
pub use config::{AgentConfig, ServerConfig, UserConfig};
pub use devices::{
    Correlator, DeviceHandle, DeviceKey, DeviceRegistry, DeviceSlot, Outcome, Request,
    SharedDeviceRegistry,
};
pub use error::{Error, Result};
pub use geo::{GeoLocator, HttpGeoLocator, Location, NullGeoLocator};
pub use protocol::{CommandBody, QueryBody, ReplyBody, WireMessage};
pub use wake::{magic_packet, UdpWolSender, WolSender};
