pub mod data_model;
pub mod device_types;

pub use data_model::{Endpoint, EndpointId, Node, NodeLimits};
pub use device_types::{BridgedDeviceKind, DeviceType, DeviceTypeId};
