//! Device factory for bridged Matter endpoints.
//!
//! The registry owns a fixed-capacity arena of device slots and wraps the
//! data-model core's endpoint creation with bridged-node semantics: every
//! endpoint it creates is deletable, carries the bridged-node device type
//! next to its functional type, and is tracked by a durable record in the
//! [`BridgeStore`].
//!
//! All mutating operations run on the single bridge worker; the `&mut self`
//! receivers make that discipline a compile-time fact.

use log::{info, warn};

use crate::bridge::persist::{BridgeStore, BridgedDeviceInfo};
use crate::error::{BridgeError, Result};
use crate::matter::device_types::{
    CLUSTER_BRIDGED_DEVICE_BASIC_INFORMATION, CLUSTER_DESCRIPTOR, ClusterId,
    DEV_TYPE_BRIDGED_NODE, DeviceType, DeviceTypeId,
};
use crate::matter::{Endpoint, EndpointId, Node};

/// What a device type id resolves to: the functional device type plus the
/// clusters it requires.
#[derive(Debug, Clone)]
pub struct DeviceTypeMapping {
    pub device_type: DeviceType,
    pub clusters: Vec<ClusterId>,
}

/// Maps a persisted `device_type_id` to the concrete cluster set stamped on
/// the endpoint at create/resume/retype time. Wired once via
/// [`BridgeRegistry::initialize`].
pub type DeviceTypeCallback = Box<dyn Fn(DeviceTypeId) -> Option<DeviceTypeMapping> + Send>;

/// One live bridged device, held in its arena slot.
#[derive(Debug, Clone)]
pub struct BridgedDevice {
    endpoint_id: EndpointId,
    info: BridgedDeviceInfo,
}

impl BridgedDevice {
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    pub fn info(&self) -> &BridgedDeviceInfo {
        &self.info
    }
}

/// The bridged-device registry: arena, free list, store, and the device-type
/// resolver.
pub struct BridgeRegistry {
    slots: Vec<Option<BridgedDevice>>,
    free: Vec<usize>,
    store: BridgeStore,
    resolver: Option<DeviceTypeCallback>,
}

impl BridgeRegistry {
    /// Build a registry over `store` with room for `capacity` devices.
    pub fn new(store: BridgeStore, capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
            store,
            resolver: None,
        }
    }

    /// One-time setup: wire the device-type resolver and restore the
    /// endpoint-id watermark so fresh creations never collide with resumed
    /// ids.
    pub fn initialize(&mut self, node: &mut Node, resolver: DeviceTypeCallback) -> Result<()> {
        if self.resolver.is_some() {
            return Err(BridgeError::InvalidArgument(
                "bridge registry already initialized",
            ));
        }
        if let Some(next) = self.store.next_endpoint_id() {
            node.restore_min_unused_endpoint_id(next);
        }
        self.resolver = Some(resolver);
        Ok(())
    }

    /// Create a bridged endpoint under `parent` and return its id.
    ///
    /// Does not persist the device record; that is the caller's explicit
    /// next step via [`Self::persist_device`]. The id watermark is persisted
    /// here best-effort so a reboot cannot reissue the id either way.
    pub fn create_device(
        &mut self,
        node: &mut Node,
        parent: EndpointId,
        device_type_id: DeviceTypeId,
    ) -> Result<EndpointId> {
        let mapping = self.resolve(device_type_id)?;
        let slot = self
            .free
            .pop()
            .ok_or(BridgeError::PoolExhausted(self.slots.len()))?;

        let endpoint_id = match node.create_endpoint(parent, true) {
            Ok(id) => id,
            Err(e) => {
                // Release the half-built slot; nothing else was touched.
                self.free.push(slot);
                return Err(e);
            }
        };
        if let Some(endpoint) = node.endpoint_mut(endpoint_id) {
            Self::stamp_endpoint(endpoint, &mapping);
        }

        if let Err(e) = self.store.set_next_endpoint_id(node.min_unused_endpoint_id()) {
            warn!("Failed to persist endpoint id watermark: {}", e);
        }

        self.slots[slot] = Some(BridgedDevice {
            endpoint_id,
            info: BridgedDeviceInfo {
                parent_endpoint_id: parent,
                device_endpoint_id: endpoint_id,
                device_type_id,
            },
        });
        info!(
            "Created bridged endpoint {} (device type 0x{:04X}) under {}",
            endpoint_id, device_type_id, parent
        );
        Ok(endpoint_id)
    }

    /// Write the durable record for a live device.
    pub fn persist_device(&self, endpoint_id: EndpointId) -> Result<()> {
        let device = self
            .device(endpoint_id)
            .ok_or(BridgeError::EndpointNotFound(endpoint_id))?;
        self.store.store_device_info(device.info)
    }

    /// Recreate a device from its persisted record during startup replay.
    ///
    /// Replay order does not matter: each record binds its own endpoint id,
    /// so any permutation of the persisted set produces the same mapping.
    /// Replaying an id that is already live fails without side effects.
    pub fn resume_device(
        &mut self,
        node: &mut Node,
        device_endpoint_id: EndpointId,
    ) -> Result<EndpointId> {
        let info = self
            .store
            .device_info(device_endpoint_id)
            .ok_or(BridgeError::UnknownEndpointId(device_endpoint_id))?;
        if self.device(device_endpoint_id).is_some() {
            return Err(BridgeError::EndpointExists(device_endpoint_id));
        }
        let mapping = self.resolve(info.device_type_id)?;
        let slot = self
            .free
            .pop()
            .ok_or(BridgeError::PoolExhausted(self.slots.len()))?;

        if let Err(e) =
            node.resume_endpoint(device_endpoint_id, info.parent_endpoint_id, true)
        {
            self.free.push(slot);
            return Err(e);
        }
        if let Some(endpoint) = node.endpoint_mut(device_endpoint_id) {
            Self::stamp_endpoint(endpoint, &mapping);
        }

        self.slots[slot] = Some(BridgedDevice {
            endpoint_id: device_endpoint_id,
            info,
        });
        info!(
            "Resumed bridged endpoint {} (device type 0x{:04X})",
            device_endpoint_id, info.device_type_id
        );
        Ok(device_endpoint_id)
    }

    /// Remove a bridged device: delete the endpoint, erase the record, free
    /// the slot.
    ///
    /// Core deletion and record erasure are best-effort; the local slot is
    /// always released so the registry never leaks capacity.
    pub fn remove_device(&mut self, node: &mut Node, endpoint_id: EndpointId) -> Result<()> {
        let slot = self
            .slot_of(endpoint_id)
            .ok_or(BridgeError::EndpointNotFound(endpoint_id))?;

        if let Err(e) = node.destroy_endpoint(endpoint_id) {
            warn!(
                "Core deletion of endpoint {} failed ({}); releasing local record anyway",
                endpoint_id, e
            );
        }
        if let Err(e) = self.store.erase_device_info(endpoint_id) {
            warn!(
                "Failed to erase persisted record for endpoint {}: {}",
                endpoint_id, e
            );
        }

        self.slots[slot] = None;
        self.free.push(slot);
        info!("Removed bridged endpoint {}", endpoint_id);
        Ok(())
    }

    /// Change the functional device type of a live endpoint in place.
    ///
    /// Used when initial discovery under-specified the type and a later
    /// probe refined it. The persisted record is refreshed best-effort so a
    /// reboot does not resurrect the stale type.
    pub fn set_device_type(
        &mut self,
        node: &mut Node,
        endpoint_id: EndpointId,
        device_type_id: DeviceTypeId,
    ) -> Result<()> {
        let mapping = self.resolve(device_type_id)?;
        let slot = self
            .slot_of(endpoint_id)
            .ok_or(BridgeError::EndpointNotFound(endpoint_id))?;
        let endpoint = node
            .endpoint_mut(endpoint_id)
            .ok_or(BridgeError::EndpointNotFound(endpoint_id))?;

        Self::stamp_endpoint(endpoint, &mapping);
        let mut refreshed = None;
        if let Some(device) = self.slots[slot].as_mut() {
            device.info.device_type_id = device_type_id;
            refreshed = Some(device.info);
        }

        if let Some(info) = refreshed
            && self.store.device_info(endpoint_id).is_some()
            && let Err(e) = self.store.store_device_info(info)
        {
            warn!(
                "Failed to refresh persisted record for endpoint {}: {}",
                endpoint_id, e
            );
        }
        info!(
            "Retyped bridged endpoint {} to device type 0x{:04X}",
            endpoint_id, device_type_id
        );
        Ok(())
    }

    /// Destroy all bridged devices and erase every persisted record.
    pub fn factory_reset(&mut self, node: &mut Node) -> Result<()> {
        let live: Vec<EndpointId> = self.devices().map(|d| d.endpoint_id).collect();
        for endpoint_id in live {
            if let Err(e) = node.destroy_endpoint(endpoint_id) {
                warn!(
                    "Core deletion of endpoint {} failed during factory reset: {}",
                    endpoint_id, e
                );
            }
        }
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.store.erase_all()?;
        node.reset_min_unused_endpoint_id();
        info!("Factory reset: all bridged devices destroyed");
        Ok(())
    }

    /// Endpoint ids with a persisted record, for startup replay.
    pub fn persisted_endpoint_ids(&self) -> Vec<EndpointId> {
        self.store.bridged_endpoint_ids()
    }

    pub fn device(&self, endpoint_id: EndpointId) -> Option<&BridgedDevice> {
        self.slots
            .iter()
            .flatten()
            .find(|d| d.endpoint_id == endpoint_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &BridgedDevice> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn resolve(&self, device_type_id: DeviceTypeId) -> Result<DeviceTypeMapping> {
        let resolver = self.resolver.as_ref().ok_or(BridgeError::NotInitialized)?;
        resolver(device_type_id).ok_or(BridgeError::UnknownDeviceType(device_type_id))
    }

    fn slot_of(&self, endpoint_id: EndpointId) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|d| d.endpoint_id == endpoint_id)
        })
    }

    fn stamp_endpoint(endpoint: &mut Endpoint, mapping: &DeviceTypeMapping) {
        endpoint.set_device_types(vec![DEV_TYPE_BRIDGED_NODE, mapping.device_type]);
        let mut clusters = vec![CLUSTER_DESCRIPTOR, CLUSTER_BRIDGED_DEVICE_BASIC_INFORMATION];
        clusters.extend_from_slice(&mapping.clusters);
        endpoint.set_clusters(clusters);
    }
}
