//! zigbee2mqtt integration: turns bridge events into bridge commands.
//!
//! Subscribes to `<base_topic>/bridge/event` and translates device lifecycle
//! events (join, interview, announce, leave) into [`BridgeCommand`]s sent to
//! the bridge worker. MQTT internals stay out of main.rs.

use super::client::{MqttClient, MqttMessage};
use crate::config::MqttConfig;
use crate::matter::device_types::BridgedDeviceKind;
use crate::zigbee::BridgeCommand;
use crate::zigbee::table::UNKNOWN_SHORT_ADDR;
use log::{info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One `<base>/bridge/event` payload.
#[derive(Debug, Deserialize)]
struct BridgeEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: BridgeEventData,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeEventData {
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    ieee_address: Option<String>,
    #[serde(default)]
    network_address: Option<u16>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    definition: Option<DeviceDefinition>,
}

#[derive(Debug, Deserialize)]
struct DeviceDefinition {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    exposes: Vec<Expose>,
}

#[derive(Debug, Deserialize)]
struct Expose {
    #[serde(rename = "type", default)]
    expose_type: Option<String>,
    #[serde(default)]
    property: Option<String>,
}

/// Pick the functional kind a device's exposes list maps to.
///
/// Actuators win over sensors so a light with an inner temperature reading
/// still shows up as a light.
fn classify_exposes(exposes: &[Expose]) -> Option<BridgedDeviceKind> {
    let has_type = |t: &str| exposes.iter().any(|e| e.expose_type.as_deref() == Some(t));
    let has_property = |p: &str| exposes.iter().any(|e| e.property.as_deref() == Some(p));

    if has_type("light") {
        Some(BridgedDeviceKind::OnOffLight)
    } else if has_type("switch") || has_property("state") {
        Some(BridgedDeviceKind::OnOffPlugInUnit)
    } else if has_property("contact") {
        Some(BridgedDeviceKind::ContactSensor)
    } else if has_property("occupancy") {
        Some(BridgedDeviceKind::OccupancySensor)
    } else if has_property("temperature") {
        Some(BridgedDeviceKind::TemperatureSensor)
    } else if has_property("humidity") {
        Some(BridgedDeviceKind::HumiditySensor)
    } else {
        None
    }
}

/// Parse one bridge-event payload into a command, if it is one we act on.
pub fn parse_bridge_event(payload: &str) -> Option<BridgeCommand> {
    let event = match serde_json::from_str::<BridgeEvent>(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse bridge event: {}", e);
            return None;
        }
    };

    let ieee_address = event.data.ieee_address.clone()?;

    match event.event_type.as_str() {
        "device_joined" => Some(BridgeCommand::DeviceJoined {
            ieee_address,
            network_address: event.data.network_address.unwrap_or(UNKNOWN_SHORT_ADDR),
        }),
        "device_interview" => {
            if event.data.status.as_deref() != Some("successful") {
                return None;
            }
            let definition = event.data.definition.as_ref()?;
            match classify_exposes(&definition.exposes) {
                Some(kind) => Some(BridgeCommand::DeviceInterviewed { ieee_address, kind }),
                None => {
                    warn!(
                        "No matching device kind for {} (model {:?})",
                        event.data.friendly_name.as_deref().unwrap_or(&ieee_address),
                        definition.model
                    );
                    None
                }
            }
        }
        "device_announce" => {
            // Without a network address there is nothing to refresh
            event
                .data
                .network_address
                .map(|network_address| BridgeCommand::DeviceAnnounced {
                    ieee_address,
                    network_address,
                })
        }
        "device_leave" => Some(BridgeCommand::DeviceLeft { ieee_address }),
        _ => None,
    }
}

/// The zigbee2mqtt integration task.
pub struct ZigbeeMqttIntegration {
    config: MqttConfig,
    commands: mpsc::Sender<BridgeCommand>,
}

impl ZigbeeMqttIntegration {
    pub fn new(config: MqttConfig, commands: mpsc::Sender<BridgeCommand>) -> Self {
        Self { config, commands }
    }

    /// Start the integration.
    ///
    /// Spawns a background task that connects to the broker, subscribes to
    /// the bridge event topic, and forwards commands to the bridge worker.
    /// Returns a JoinHandle that can be used to abort the task on shutdown.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        info!(
            "[MQTT] Connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let mqtt_client = MqttClient::new(&self.config);
        let subscribe_client = mqtt_client.client();

        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let (connected_tx, connected_rx) = oneshot::channel();

        // Start the event loop first so it can establish the connection
        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(msg_tx, connected_tx).await;
        });

        match tokio::time::timeout(Duration::from_secs(10), connected_rx).await {
            Ok(Ok(())) => {
                info!("[MQTT] Connection established, subscribing to bridge events");
            }
            Ok(Err(_)) => {
                warn!("[MQTT] Connection signal channel dropped");
                return;
            }
            Err(_) => {
                warn!("[MQTT] Connection timeout after 10 seconds");
                mqtt_loop.abort();
                return;
            }
        }

        let event_topic = format!("{}/bridge/event", self.config.base_topic);
        if let Err(e) = subscribe_client
            .subscribe(&event_topic, rumqttc::QoS::AtMostOnce)
            .await
        {
            warn!("[MQTT] Failed to subscribe to {}: {:?}", event_topic, e);
            mqtt_loop.abort();
            return;
        }

        info!("[MQTT] Integration started on topic {}", event_topic);

        while let Some(msg) = msg_rx.recv().await {
            if msg.topic != event_topic {
                continue;
            }
            if let Some(command) = parse_bridge_event(&msg.payload)
                && self.commands.send(command).await.is_err()
            {
                warn!("[MQTT] Bridge command channel closed");
                break;
            }
        }

        mqtt_loop.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_joined() {
        let payload = r#"{"type":"device_joined","data":{"friendly_name":"0x00124b0011223344","ieee_address":"0x00124b0011223344","network_address":4660}}"#;
        assert_eq!(
            parse_bridge_event(payload),
            Some(BridgeCommand::DeviceJoined {
                ieee_address: "0x00124b0011223344".to_string(),
                network_address: 0x1234,
            })
        );
    }

    #[test]
    fn test_parse_joined_without_address_uses_unknown() {
        let payload =
            r#"{"type":"device_joined","data":{"ieee_address":"0xaa"}}"#;
        assert_eq!(
            parse_bridge_event(payload),
            Some(BridgeCommand::DeviceJoined {
                ieee_address: "0xaa".to_string(),
                network_address: UNKNOWN_SHORT_ADDR,
            })
        );
    }

    #[test]
    fn test_parse_successful_interview() {
        let payload = r#"{
            "type": "device_interview",
            "data": {
                "friendly_name": "door",
                "ieee_address": "0xaa",
                "status": "successful",
                "definition": {
                    "model": "MCCGQ11LM",
                    "exposes": [
                        {"type": "binary", "property": "contact"},
                        {"type": "numeric", "property": "battery"}
                    ]
                }
            }
        }"#;
        assert_eq!(
            parse_bridge_event(payload),
            Some(BridgeCommand::DeviceInterviewed {
                ieee_address: "0xaa".to_string(),
                kind: BridgedDeviceKind::ContactSensor,
            })
        );
    }

    #[test]
    fn test_parse_failed_interview_is_dropped() {
        let payload = r#"{"type":"device_interview","data":{"ieee_address":"0xaa","status":"failed"}}"#;
        assert_eq!(parse_bridge_event(payload), None);
    }

    #[test]
    fn test_light_wins_over_sensor_exposes() {
        let payload = r#"{
            "type": "device_interview",
            "data": {
                "ieee_address": "0xaa",
                "status": "successful",
                "definition": {
                    "exposes": [
                        {"type": "numeric", "property": "temperature"},
                        {"type": "light"}
                    ]
                }
            }
        }"#;
        assert_eq!(
            parse_bridge_event(payload),
            Some(BridgeCommand::DeviceInterviewed {
                ieee_address: "0xaa".to_string(),
                kind: BridgedDeviceKind::OnOffLight,
            })
        );
    }

    #[test]
    fn test_parse_device_leave() {
        let payload = r#"{"type":"device_leave","data":{"ieee_address":"0xaa"}}"#;
        assert_eq!(
            parse_bridge_event(payload),
            Some(BridgeCommand::DeviceLeft {
                ieee_address: "0xaa".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_announce_requires_address() {
        let with = r#"{"type":"device_announce","data":{"ieee_address":"0xaa","network_address":17}}"#;
        assert_eq!(
            parse_bridge_event(with),
            Some(BridgeCommand::DeviceAnnounced {
                ieee_address: "0xaa".to_string(),
                network_address: 17,
            })
        );
        let without = r#"{"type":"device_announce","data":{"ieee_address":"0xaa"}}"#;
        assert_eq!(parse_bridge_event(without), None);
    }

    #[test]
    fn test_unknown_event_and_garbage_are_dropped() {
        assert_eq!(
            parse_bridge_event(r#"{"type":"pairing","data":{"ieee_address":"0xaa"}}"#),
            None
        );
        assert_eq!(parse_bridge_event("not json"), None);
    }
}
