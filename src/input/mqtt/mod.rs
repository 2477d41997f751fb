//! MQTT input source (zigbee2mqtt).

pub mod client;
pub mod integration;

pub use client::{MqttClient, MqttMessage};
pub use integration::{ZigbeeMqttIntegration, parse_bridge_event};
