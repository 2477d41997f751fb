//! Persistent mapping store for bridged device records.
//!
//! Keeps the durable identity of every bridged endpoint (enough to recreate
//! the endpoint mapping after a restart without renumbering) plus the
//! endpoint-id allocation watermark. Records are keyed by
//! `device_endpoint_id` and written to a JSON file under the data dir.
//!
//! Loads are tolerant: a missing file is a first run, a corrupt file is
//! logged and treated as empty. Writes rewrite the whole file.

use std::fs;
use std::path::PathBuf;

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::matter::device_types::DeviceTypeId;
use crate::matter::EndpointId;

/// The durable identity of one bridged device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgedDeviceInfo {
    /// Endpoint the bridged endpoint was created under (an aggregator).
    pub parent_endpoint_id: EndpointId,
    /// The bridged endpoint's own id; the record key.
    pub device_endpoint_id: EndpointId,
    /// Functional device type the endpoint reports.
    pub device_type_id: DeviceTypeId,
}

/// Persisted store state.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct BridgeStoreState {
    /// Endpoint-id allocation watermark at the time of the last write.
    next_endpoint_id: Option<EndpointId>,
    records: Vec<BridgedDeviceInfo>,
}

impl BridgeStoreState {
    fn load(path: &PathBuf) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<BridgeStoreState>(&bytes) {
                Ok(state) => {
                    info!(
                        "Loaded {} bridged device record(s) from {:?}",
                        state.records.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("Failed to parse bridged device store: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No bridged device store found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("Failed to read bridged device store: {}", e);
                Self::default()
            }
        }
    }

    fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Store wrapper. The lock is interior-mutability plumbing only; callers
/// follow the single-writer discipline of the bridge worker.
pub struct BridgeStore {
    path: PathBuf,
    capacity: usize,
    state: RwLock<BridgeStoreState>,
}

impl BridgeStore {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        let state = BridgeStoreState::load(&path);
        Self {
            path,
            capacity,
            state: RwLock::new(state),
        }
    }

    /// All persisted endpoint ids, in record order.
    pub fn bridged_endpoint_ids(&self) -> Vec<EndpointId> {
        self.state
            .read()
            .records
            .iter()
            .map(|r| r.device_endpoint_id)
            .collect()
    }

    pub fn device_info(&self, endpoint_id: EndpointId) -> Option<BridgedDeviceInfo> {
        self.state
            .read()
            .records
            .iter()
            .find(|r| r.device_endpoint_id == endpoint_id)
            .copied()
    }

    /// Insert or update a record. Inserting past the pool bound is a caller
    /// bug: the factory's capacity check should have fired first.
    pub fn store_device_info(&self, info: BridgedDeviceInfo) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state
            .records
            .iter_mut()
            .find(|r| r.device_endpoint_id == info.device_endpoint_id)
        {
            if *existing == info {
                return Ok(());
            }
            *existing = info;
        } else {
            if state.records.len() >= self.capacity {
                error!(
                    "Refusing to persist endpoint {}: store already holds {} records",
                    info.device_endpoint_id, self.capacity
                );
                return Err(BridgeError::StoreCapacityExceeded(self.capacity));
            }
            state.records.push(info);
        }
        state.save(&self.path)
    }

    /// Remove one record. Success when the record was already absent.
    pub fn erase_device_info(&self, endpoint_id: EndpointId) -> Result<()> {
        let mut state = self.state.write();
        let before = state.records.len();
        state.records.retain(|r| r.device_endpoint_id != endpoint_id);
        if state.records.len() == before {
            return Ok(());
        }
        state.save(&self.path)
    }

    pub fn next_endpoint_id(&self) -> Option<EndpointId> {
        self.state.read().next_endpoint_id
    }

    pub fn set_next_endpoint_id(&self, id: EndpointId) -> Result<()> {
        let mut state = self.state.write();
        if state.next_endpoint_id == Some(id) {
            return Ok(());
        }
        state.next_endpoint_id = Some(id);
        state.save(&self.path)
    }

    /// Drop every record and the watermark (factory reset).
    pub fn erase_all(&self) -> Result<()> {
        let mut state = self.state.write();
        state.records.clear();
        state.next_endpoint_id = None;
        state.save(&self.path)
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT: AtomicU32 = AtomicU32::new(0);

    /// A unique scratch directory per call, under the OS temp dir.
    pub fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "zigbee-matter-bridge-{}-{}-{}",
            tag,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::temp_dir;
    use super::*;

    fn info(endpoint: EndpointId) -> BridgedDeviceInfo {
        BridgedDeviceInfo {
            parent_endpoint_id: 1,
            device_endpoint_id: endpoint,
            device_type_id: 0x0100,
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let store = BridgeStore::new(temp_dir("persist").join("records.json"), 4);
        assert!(store.is_empty());
        assert_eq!(store.next_endpoint_id(), None);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let path = temp_dir("persist").join("records.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = BridgeStore::new(path, 4);
        assert!(store.is_empty());
    }

    #[test]
    fn test_records_survive_reload() {
        let path = temp_dir("persist").join("records.json");
        {
            let store = BridgeStore::new(path.clone(), 4);
            store.store_device_info(info(2)).unwrap();
            store.store_device_info(info(3)).unwrap();
            store.set_next_endpoint_id(4).unwrap();
        }
        let store = BridgeStore::new(path, 4);
        assert_eq!(store.bridged_endpoint_ids(), vec![2, 3]);
        assert_eq!(store.device_info(2), Some(info(2)));
        assert_eq!(store.next_endpoint_id(), Some(4));
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let store = BridgeStore::new(temp_dir("persist").join("records.json"), 4);
        store.store_device_info(info(2)).unwrap();
        let mut retyped = info(2);
        retyped.device_type_id = 0x0302;
        store.store_device_info(retyped).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.device_info(2).unwrap().device_type_id, 0x0302);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let store = BridgeStore::new(temp_dir("persist").join("records.json"), 4);
        store.store_device_info(info(2)).unwrap();
        store.erase_device_info(2).unwrap();
        assert!(!store.bridged_endpoint_ids().contains(&2));
        // Absent record is still a success
        store.erase_device_info(2).unwrap();
        store.erase_device_info(99).unwrap();
    }

    #[test]
    fn test_capacity_bound_rejects_new_records_only() {
        let store = BridgeStore::new(temp_dir("persist").join("records.json"), 2);
        store.store_device_info(info(2)).unwrap();
        store.store_device_info(info(3)).unwrap();
        assert!(matches!(
            store.store_device_info(info(4)),
            Err(BridgeError::StoreCapacityExceeded(2))
        ));
        // Updating an existing record is still fine at the bound
        let mut retyped = info(3);
        retyped.device_type_id = 0x0107;
        store.store_device_info(retyped).unwrap();
    }

    #[test]
    fn test_erase_all_clears_records_and_watermark() {
        let path = temp_dir("persist").join("records.json");
        let store = BridgeStore::new(path.clone(), 4);
        store.store_device_info(info(2)).unwrap();
        store.set_next_endpoint_id(3).unwrap();
        store.erase_all().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_endpoint_id(), None);
        let reloaded = BridgeStore::new(path, 4);
        assert!(reloaded.is_empty());
    }
}
