use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on endpoints the data-model core will hold, fixed endpoints
/// included. Mirrors the build-time limit of the embedded data model.
pub const MAX_DYNAMIC_ENDPOINT_COUNT: usize = 16;

/// Number of aggregator endpoints created at node construction. Bridged
/// devices hang off an aggregator in the device topology.
pub const AGGREGATOR_ENDPOINT_COUNT: usize = 1;

/// Slots left for bridged devices: one endpoint is the root, N are
/// aggregators, the rest is the bridged-device pool.
pub const MAX_BRIDGED_DEVICE_COUNT: usize =
    MAX_DYNAMIC_ENDPOINT_COUNT - 1 - AGGREGATOR_ENDPOINT_COUNT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name shown in log banners and the bridge's own device records.
    pub device_name: String,
    /// Where the persisted device records live. `None` resolves to
    /// `~/.config/zigbee-matter-bridge`.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// zigbee2mqtt base topic (usually "zigbee2mqtt").
    pub base_topic: String,
}

/// Directory under the home dir for persisted state.
const DATA_DIR: &str = ".config/zigbee-matter-bridge";

impl BridgeConfig {
    /// Resolve the data directory, falling back to the home-dir default.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DATA_DIR)
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig {
                device_name: "Zigbee Matter Bridge".to_string(),
                data_dir: None,
            },
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "zigbee-matter-bridge".to_string(),
                username: None,
                password: None,
                base_topic: "zigbee2mqtt".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("DEVICE_NAME") {
            config.bridge.device_name = name;
        }
        if let Ok(dir) = std::env::var("BRIDGE_DATA_DIR") {
            config.bridge.data_dir = Some(PathBuf::from(dir));
        }

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(topic) = std::env::var("ZIGBEE2MQTT_BASE_TOPIC") {
            config.mqtt.base_topic = topic;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_bound_leaves_room_for_fixed_endpoints() {
        assert_eq!(
            MAX_BRIDGED_DEVICE_COUNT + 1 + AGGREGATOR_ENDPOINT_COUNT,
            MAX_DYNAMIC_ENDPOINT_COUNT
        );
        assert!(MAX_BRIDGED_DEVICE_COUNT > 0);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert!(config.bridge.data_dir.is_none());
    }

    #[test]
    fn test_resolved_data_dir_prefers_explicit_dir() {
        let config = BridgeConfig {
            device_name: "test".to_string(),
            data_dir: Some(PathBuf::from("/var/lib/bridge")),
        };
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/var/lib/bridge"));
    }
}
