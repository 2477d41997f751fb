//! Zigbee Matter Bridge library.
//!
//! Exposes Zigbee devices to Matter controllers as dynamically created
//! bridged endpoints: a bounded device factory, a persistent endpoint
//! mapping store, and the lookup index the protocol adapter dispatches
//! through.

pub mod bridge;
pub mod config;
pub mod error;
pub mod input;
pub mod matter;
pub mod zigbee;

pub use error::{BridgeError, Result};
pub use zigbee::{BridgeCommand, ZigbeeBridge, run_bridge_worker};
