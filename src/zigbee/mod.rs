//! Zigbee bridge glue: composes the node, the device factory, the lookup
//! table and the identity annex into the API the protocol adapter drives.
//!
//! All mutation funnels through [`ZigbeeBridge::apply`] on a single worker
//! task; adapter callbacks running on other tasks send [`BridgeCommand`]s
//! over a channel instead of touching the bridge directly.

pub mod persist;
pub mod table;

use std::path::Path;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::BridgeStore;
use crate::bridge::registry::{
    BridgeRegistry, BridgedDevice, DeviceTypeCallback, DeviceTypeMapping,
};
use crate::error::{BridgeError, Result};
use crate::matter::device_types::{BridgedDeviceKind, DeviceTypeId};
use crate::matter::{EndpointId, Node, NodeLimits};
use persist::{ZigbeeIdentity, ZigbeeStore};
use table::{UNKNOWN_SHORT_ADDR, ZigbeeDeviceRecord, ZigbeeDeviceTable};

/// File names under the data dir.
const BRIDGE_RECORDS_FILE: &str = "bridged_devices.json";
const ZIGBEE_IDENTITIES_FILE: &str = "zigbee_identities.json";

/// Kind assigned at join time, before the interview refines it.
const DEFAULT_KIND: BridgedDeviceKind = BridgedDeviceKind::OnOffPlugInUnit;

/// The stock resolver: maps persisted device type ids to the kinds this
/// bridge knows how to expose.
pub fn default_device_type_resolver() -> DeviceTypeCallback {
    Box::new(|id| {
        BridgedDeviceKind::from_device_type_id(id).map(|kind| DeviceTypeMapping {
            device_type: kind.device_type(),
            clusters: vec![kind.functional_cluster()],
        })
    })
}

/// Work marshalled onto the bridge worker from adapter tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// A device joined (or rejoined) the network.
    DeviceJoined {
        ieee_address: String,
        network_address: u16,
    },
    /// The interview finished and pinned down what the device is.
    DeviceInterviewed {
        ieee_address: String,
        kind: BridgedDeviceKind,
    },
    /// A known device re-announced itself, usually with a fresh short
    /// address.
    DeviceAnnounced {
        ieee_address: String,
        network_address: u16,
    },
    /// A device left the network.
    DeviceLeft { ieee_address: String },
    /// Wipe all bridged devices and their persisted records.
    FactoryReset,
}

/// The bridge: node, registry, lookup table, identity annex.
pub struct ZigbeeBridge {
    node: Node,
    registry: BridgeRegistry,
    table: ZigbeeDeviceTable,
    identities: ZigbeeStore,
    aggregator_id: EndpointId,
}

impl ZigbeeBridge {
    /// Open (or create) a bridge over `data_dir` with the default pool
    /// limits, replaying any persisted devices.
    pub fn new(data_dir: &Path) -> Result<Self> {
        Self::with_limits(data_dir, NodeLimits::default())
    }

    /// Same as [`Self::new`] with explicit limits (tests, bring-up).
    pub fn with_limits(data_dir: &Path, limits: NodeLimits) -> Result<Self> {
        let mut node = Node::new(limits);
        let aggregator_id = node.first_aggregator_id().ok_or(BridgeError::InvalidArgument(
            "bridge requires at least one aggregator endpoint",
        ))?;

        let capacity = limits.max_bridged_devices();
        let store = BridgeStore::new(data_dir.join(BRIDGE_RECORDS_FILE), capacity);
        let mut registry = BridgeRegistry::new(store, capacity);
        registry.initialize(&mut node, default_device_type_resolver())?;

        let mut bridge = Self {
            node,
            registry,
            table: ZigbeeDeviceTable::new(),
            identities: ZigbeeStore::new(data_dir.join(ZIGBEE_IDENTITIES_FILE)),
            aggregator_id,
        };
        bridge.resume_all();
        Ok(bridge)
    }

    /// Replay every persisted record. Per-record failure is logged and
    /// skipped; a bad record never takes the whole bridge down at boot.
    fn resume_all(&mut self) {
        for endpoint_id in self.registry.persisted_endpoint_ids() {
            match self.registry.resume_device(&mut self.node, endpoint_id) {
                Ok(_) => {
                    let zigbee_endpoint_id = self
                        .identities
                        .identity(endpoint_id)
                        .map(|i| i.zigbee_endpoint_id)
                        .unwrap_or(0);
                    // Short address is unknown until the device re-announces.
                    if let Err(e) = self.table.insert(ZigbeeDeviceRecord {
                        matter_endpoint_id: endpoint_id,
                        zigbee_endpoint_id,
                        zigbee_shortaddr: UNKNOWN_SHORT_ADDR,
                    }) {
                        warn!("Failed to index resumed endpoint {}: {}", endpoint_id, e);
                    }
                }
                Err(e) => {
                    warn!("Failed to resume bridged endpoint {}: {}", endpoint_id, e);
                }
            }
        }
        if !self.table.is_empty() {
            info!("Resumed {} bridged device(s)", self.table.len());
        }
    }

    /// Bridge a newly discovered Zigbee device and return its Matter
    /// endpoint id.
    ///
    /// Persistence failures degrade: the device stays usable for this
    /// session and simply will not be restored after a reboot.
    pub fn create_zigbee_device(
        &mut self,
        ieee_address: &str,
        zigbee_endpoint_id: u8,
        zigbee_shortaddr: u16,
        device_type_id: DeviceTypeId,
    ) -> Result<EndpointId> {
        let endpoint_id =
            self.registry
                .create_device(&mut self.node, self.aggregator_id, device_type_id)?;

        if let Err(e) = self.registry.persist_device(endpoint_id) {
            warn!(
                "Failed to persist endpoint {}; it will not survive a reboot: {}",
                endpoint_id, e
            );
        }
        if let Err(e) = self.identities.upsert(ZigbeeIdentity {
            device_endpoint_id: endpoint_id,
            ieee_address: ieee_address.to_string(),
            zigbee_endpoint_id,
        }) {
            warn!(
                "Failed to persist zigbee identity for endpoint {}: {}",
                endpoint_id, e
            );
        }
        self.table.insert(ZigbeeDeviceRecord {
            matter_endpoint_id: endpoint_id,
            zigbee_endpoint_id,
            zigbee_shortaddr,
        })?;

        info!(
            "Bridged zigbee device {} (short 0x{:04X}) as endpoint {}",
            ieee_address, zigbee_shortaddr, endpoint_id
        );
        Ok(endpoint_id)
    }

    /// Refresh the network identity of a bridged device after a rejoin.
    pub fn associate(
        &mut self,
        endpoint_id: EndpointId,
        zigbee_endpoint_id: u8,
        zigbee_shortaddr: u16,
    ) -> Result<()> {
        self.table
            .set_short_addr(endpoint_id, zigbee_endpoint_id, zigbee_shortaddr)?;
        if let Some(mut identity) = self.identities.identity(endpoint_id) {
            identity.zigbee_endpoint_id = zigbee_endpoint_id;
            if let Err(e) = self.identities.upsert(identity) {
                warn!(
                    "Failed to refresh zigbee identity for endpoint {}: {}",
                    endpoint_id, e
                );
            }
        }
        Ok(())
    }

    /// Narrow the device type once the interview pinned it down.
    pub fn refine_device_type(
        &mut self,
        endpoint_id: EndpointId,
        device_type_id: DeviceTypeId,
    ) -> Result<()> {
        self.registry
            .set_device_type(&mut self.node, endpoint_id, device_type_id)
    }

    /// Unbridge a device: unlink the lookup record, drop the persisted
    /// identity, delete the endpoint.
    pub fn remove_zigbee_device(&mut self, endpoint_id: EndpointId) -> Result<()> {
        if self.registry.device(endpoint_id).is_none() {
            return Err(BridgeError::EndpointNotFound(endpoint_id));
        }
        if let Err(e) = self.table.remove(endpoint_id) {
            warn!("Endpoint {} was not in the lookup table: {}", endpoint_id, e);
        }
        if let Err(e) = self.identities.remove(endpoint_id) {
            warn!(
                "Failed to drop zigbee identity for endpoint {}: {}",
                endpoint_id, e
            );
        }
        self.registry.remove_device(&mut self.node, endpoint_id)
    }

    /// Destroy all bridged devices and erase every persisted record.
    pub fn factory_reset(&mut self) -> Result<()> {
        self.table.clear();
        self.identities.erase_all()?;
        self.registry.factory_reset(&mut self.node)
    }

    /// Apply one marshalled command. Errors are resolved here (declined,
    /// degraded, or logged); nothing propagates out of the worker loop.
    pub fn apply(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::DeviceJoined {
                ieee_address,
                network_address,
            } => match self.endpoint_id_by_ieee(&ieee_address) {
                Some(endpoint_id) => {
                    let zigbee_endpoint_id = self
                        .table
                        .record_by_endpoint_id(endpoint_id)
                        .map(|r| r.zigbee_endpoint_id)
                        .unwrap_or(1);
                    info!(
                        "Device {} rejoined with short 0x{:04X} (endpoint {})",
                        ieee_address, network_address, endpoint_id
                    );
                    if let Err(e) =
                        self.associate(endpoint_id, zigbee_endpoint_id, network_address)
                    {
                        warn!("Failed to re-associate {}: {}", ieee_address, e);
                    }
                }
                None => match self.create_zigbee_device(
                    &ieee_address,
                    1,
                    network_address,
                    DEFAULT_KIND.device_type_id(),
                ) {
                    Ok(_) => {}
                    Err(BridgeError::PoolExhausted(capacity)) => {
                        warn!(
                            "Declining bridged device {}: all {} endpoint slots in use",
                            ieee_address, capacity
                        );
                    }
                    Err(e) => {
                        warn!("Failed to bridge device {}: {}", ieee_address, e);
                    }
                },
            },
            BridgeCommand::DeviceInterviewed { ieee_address, kind } => {
                match self.endpoint_id_by_ieee(&ieee_address) {
                    Some(endpoint_id) => {
                        if let Err(e) = self.refine_device_type(endpoint_id, kind.device_type_id())
                        {
                            warn!("Failed to retype {} to {}: {}", ieee_address, kind, e);
                        }
                    }
                    None => warn!("Interview result for unbridged device {}", ieee_address),
                }
            }
            BridgeCommand::DeviceAnnounced {
                ieee_address,
                network_address,
            } => match self.endpoint_id_by_ieee(&ieee_address) {
                Some(endpoint_id) => {
                    let zigbee_endpoint_id = self
                        .table
                        .record_by_endpoint_id(endpoint_id)
                        .map(|r| r.zigbee_endpoint_id)
                        .unwrap_or(1);
                    if let Err(e) =
                        self.associate(endpoint_id, zigbee_endpoint_id, network_address)
                    {
                        warn!("Failed to re-associate {}: {}", ieee_address, e);
                    }
                }
                None => warn!("Announce from unbridged device {}", ieee_address),
            },
            BridgeCommand::DeviceLeft { ieee_address } => {
                match self.endpoint_id_by_ieee(&ieee_address) {
                    Some(endpoint_id) => {
                        if let Err(e) = self.remove_zigbee_device(endpoint_id) {
                            warn!("Failed to unbridge {}: {}", ieee_address, e);
                        }
                    }
                    None => warn!("Leave from unbridged device {}", ieee_address),
                }
            }
            BridgeCommand::FactoryReset => {
                if let Err(e) = self.factory_reset() {
                    warn!("Factory reset failed: {}", e);
                }
            }
        }
    }

    pub fn endpoint_id_by_ieee(&self, ieee_address: &str) -> Option<EndpointId> {
        self.identities.endpoint_id_by_ieee(ieee_address)
    }

    pub fn endpoint_id_by_shortaddr(&self, shortaddr: u16) -> Option<EndpointId> {
        self.table.endpoint_id_by_shortaddr(shortaddr)
    }

    pub fn shortaddr_by_endpoint_id(&self, endpoint_id: EndpointId) -> Option<u16> {
        self.table.shortaddr_by_endpoint_id(endpoint_id)
    }

    pub fn device(&self, endpoint_id: EndpointId) -> Option<&BridgedDevice> {
        self.registry.device(endpoint_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &BridgedDevice> {
        self.registry.devices()
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

/// Drain bridge commands on a single task until the channel closes or the
/// token fires. This is the only place the bridge is mutated.
pub async fn run_bridge_worker(
    mut bridge: ZigbeeBridge,
    mut commands: mpsc::Receiver<BridgeCommand>,
    cancel: CancellationToken,
) {
    info!(
        "Bridge worker started with {} bridged device(s)",
        bridge.device_count()
    );
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => bridge.apply(command),
                None => break,
            },
        }
    }
    info!("Bridge worker stopped");
}
