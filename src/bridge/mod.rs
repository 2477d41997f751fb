//! Bridged-device registry: device factory and persistent mapping store.
//!
//! The factory allocates and releases the bounded pool of dynamic endpoint
//! slots; the store keeps the endpoint-to-external-device mapping durable so
//! endpoints come back with the same ids after a restart.

pub mod persist;
pub mod registry;

pub use persist::{BridgeStore, BridgedDeviceInfo};
pub use registry::{BridgeRegistry, BridgedDevice, DeviceTypeCallback, DeviceTypeMapping};
