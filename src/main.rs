use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use zigbee_matter_bridge::config::Config;
use zigbee_matter_bridge::input::mqtt::ZigbeeMqttIntegration;
use zigbee_matter_bridge::{ZigbeeBridge, run_bridge_worker};

/// Bridge Zigbee devices into Matter as dynamic bridged endpoints.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory for persisted bridge state
    #[arg(long, env = "BRIDGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER_HOST")]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_BROKER_PORT")]
    broker_port: Option<u16>,

    /// zigbee2mqtt base topic
    #[arg(long, env = "ZIGBEE2MQTT_BASE_TOPIC")]
    base_topic: Option<String>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    init_logger();
    info!("Starting Zigbee Matter Bridge");

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(dir) = args.data_dir {
        config.bridge.data_dir = Some(dir);
    }
    if let Some(host) = args.broker_host {
        config.mqtt.broker_host = host;
    }
    if let Some(port) = args.broker_port {
        config.mqtt.broker_port = port;
    }
    if let Some(topic) = args.base_topic {
        config.mqtt.base_topic = topic;
    }

    let data_dir = config.bridge.resolved_data_dir();
    info!("Configuration loaded:");
    info!("  Device Name: {}", config.bridge.device_name);
    info!("  Data Dir: {:?}", data_dir);
    info!(
        "  MQTT Broker: {}:{}",
        config.mqtt.broker_host, config.mqtt.broker_port
    );
    info!("  Base Topic: {}", config.mqtt.base_topic);

    // Open the bridge and replay persisted devices before any adapter
    // events can arrive
    let bridge = match ZigbeeBridge::new(&data_dir) {
        Ok(bridge) => bridge,
        Err(e) => {
            log::error!("Failed to open bridge state: {}", e);
            std::process::exit(1);
        }
    };
    info!("{} bridged device(s) restored", bridge.device_count());

    // All mutation runs on this one worker; adapters only send commands
    let (command_tx, command_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(run_bridge_worker(bridge, command_rx, cancel.clone()));

    let integration = ZigbeeMqttIntegration::new(config.mqtt.clone(), command_tx).start();

    info!("Zigbee Matter Bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            log::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Shutdown: stop the adapter first so no new commands arrive, then
    // stop the worker
    integration.abort();
    cancel.cancel();
    let _ = worker.await;

    info!("Zigbee Matter Bridge stopped");
}
