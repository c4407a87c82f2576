//! Device connection tracking and request/response correlation

pub mod correlator;
pub mod registry;
pub mod types;

pub use correlator::{Correlator, Outcome, Request};
pub use registry::{DeviceRegistry, SharedDeviceRegistry};
pub use types::{ConnectionClosed, DeviceHandle, DeviceKey, DeviceSlot};
