//! Lookup index between Matter endpoints and Zigbee network addresses.
//!
//! The Matter endpoint id is the stable identity; the short address is the
//! mutable runtime key, refreshed when a device rejoins the network. The
//! table is a small Vec scanned linearly; the pool bound keeps N in the
//! low double digits.

use crate::error::{BridgeError, Result};
use crate::matter::EndpointId;

/// Network address of a device that has not re-announced since the bridge
/// restarted. Lookups never match it.
pub const UNKNOWN_SHORT_ADDR: u16 = 0xFFFE;

/// One bridged Zigbee device in the runtime index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZigbeeDeviceRecord {
    /// The bridged Matter endpoint; stable across rejoins and reboots.
    pub matter_endpoint_id: EndpointId,
    /// Endpoint id on the remote Zigbee device.
    pub zigbee_endpoint_id: u8,
    /// Zigbee network short address; may change on rejoin.
    pub zigbee_shortaddr: u16,
}

/// The bidirectional endpoint/short-address index.
#[derive(Debug, Default)]
pub struct ZigbeeDeviceTable {
    records: Vec<ZigbeeDeviceRecord>,
}

impl ZigbeeDeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. The Matter endpoint id must not already be indexed.
    pub fn insert(&mut self, record: ZigbeeDeviceRecord) -> Result<()> {
        if self
            .record_by_endpoint_id(record.matter_endpoint_id)
            .is_some()
        {
            return Err(BridgeError::EndpointExists(record.matter_endpoint_id));
        }
        self.records.push(record);
        Ok(())
    }

    /// Unlink the record for a Matter endpoint.
    pub fn remove(&mut self, matter_endpoint_id: EndpointId) -> Result<()> {
        let before = self.records.len();
        self.records
            .retain(|r| r.matter_endpoint_id != matter_endpoint_id);
        if self.records.len() == before {
            return Err(BridgeError::EndpointNotFound(matter_endpoint_id));
        }
        Ok(())
    }

    pub fn record_by_endpoint_id(
        &self,
        matter_endpoint_id: EndpointId,
    ) -> Option<&ZigbeeDeviceRecord> {
        self.records
            .iter()
            .find(|r| r.matter_endpoint_id == matter_endpoint_id)
    }

    pub fn record_by_shortaddr(&self, shortaddr: u16) -> Option<&ZigbeeDeviceRecord> {
        if shortaddr == UNKNOWN_SHORT_ADDR {
            return None;
        }
        self.records
            .iter()
            .find(|r| r.zigbee_shortaddr == shortaddr)
    }

    pub fn shortaddr_by_endpoint_id(&self, matter_endpoint_id: EndpointId) -> Option<u16> {
        self.record_by_endpoint_id(matter_endpoint_id)
            .map(|r| r.zigbee_shortaddr)
            .filter(|&addr| addr != UNKNOWN_SHORT_ADDR)
    }

    pub fn endpoint_id_by_shortaddr(&self, shortaddr: u16) -> Option<EndpointId> {
        self.record_by_shortaddr(shortaddr)
            .map(|r| r.matter_endpoint_id)
    }

    /// Refresh the network identity after a re-association.
    pub fn set_short_addr(
        &mut self,
        matter_endpoint_id: EndpointId,
        zigbee_endpoint_id: u8,
        shortaddr: u16,
    ) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.matter_endpoint_id == matter_endpoint_id)
            .ok_or(BridgeError::EndpointNotFound(matter_endpoint_id))?;
        record.zigbee_endpoint_id = zigbee_endpoint_id;
        record.zigbee_shortaddr = shortaddr;
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &ZigbeeDeviceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
