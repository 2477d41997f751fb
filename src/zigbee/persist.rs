//! Adapter identity annex: which Zigbee device backs which endpoint.
//!
//! The core bridge record keeps only the Matter-side identity. A rejoining
//! Zigbee device shows up with a fresh short address but a stable IEEE
//! address, so the adapter persists `endpoint -> IEEE` separately and uses
//! it after a restart to re-attach announcing devices to their resumed
//! endpoints.

use std::fs;
use std::path::PathBuf;

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matter::EndpointId;

/// Persisted Zigbee identity of one bridged endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZigbeeIdentity {
    pub device_endpoint_id: EndpointId,
    /// IEEE (EUI-64) address string as reported by the network layer,
    /// e.g. "0x00124b0022334455".
    pub ieee_address: String,
    /// Endpoint id on the remote Zigbee device.
    pub zigbee_endpoint_id: u8,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ZigbeeStoreState {
    identities: Vec<ZigbeeIdentity>,
}

impl ZigbeeStoreState {
    fn load(path: &PathBuf) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<ZigbeeStoreState>(&bytes) {
                Ok(state) => {
                    info!(
                        "Loaded {} zigbee identity record(s) from {:?}",
                        state.identities.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("Failed to parse zigbee identity store: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                error!("Failed to read zigbee identity store: {}", e);
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

/// Store wrapper, same discipline as the bridge record store.
pub struct ZigbeeStore {
    path: PathBuf,
    state: RwLock<ZigbeeStoreState>,
}

impl ZigbeeStore {
    pub fn new(path: PathBuf) -> Self {
        let state = ZigbeeStoreState::load(&path);
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn upsert(&self, identity: ZigbeeIdentity) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state
            .identities
            .iter_mut()
            .find(|i| i.device_endpoint_id == identity.device_endpoint_id)
        {
            if *existing == identity {
                return Ok(());
            }
            *existing = identity;
        } else {
            state.identities.push(identity);
        }
        state.save(&self.path)
    }

    /// Remove the identity for an endpoint; absent is still success.
    pub fn remove(&self, device_endpoint_id: EndpointId) -> Result<()> {
        let mut state = self.state.write();
        let before = state.identities.len();
        state
            .identities
            .retain(|i| i.device_endpoint_id != device_endpoint_id);
        if state.identities.len() == before {
            return Ok(());
        }
        state.save(&self.path)
    }

    pub fn identity(&self, device_endpoint_id: EndpointId) -> Option<ZigbeeIdentity> {
        self.state
            .read()
            .identities
            .iter()
            .find(|i| i.device_endpoint_id == device_endpoint_id)
            .cloned()
    }

    pub fn endpoint_id_by_ieee(&self, ieee_address: &str) -> Option<EndpointId> {
        self.state
            .read()
            .identities
            .iter()
            .find(|i| i.ieee_address == ieee_address)
            .map(|i| i.device_endpoint_id)
    }

    pub fn erase_all(&self) -> Result<()> {
        let mut state = self.state.write();
        state.identities.clear();
        state.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::persist::test_util::temp_dir;

    fn identity(endpoint: EndpointId, ieee: &str) -> ZigbeeIdentity {
        ZigbeeIdentity {
            device_endpoint_id: endpoint,
            ieee_address: ieee.to_string(),
            zigbee_endpoint_id: 1,
        }
    }

    #[test]
    fn test_identities_survive_reload() {
        let path = temp_dir("zigbee-store").join("identities.json");
        {
            let store = ZigbeeStore::new(path.clone());
            store.upsert(identity(2, "0x00124b0011223344")).unwrap();
        }
        let store = ZigbeeStore::new(path);
        assert_eq!(store.endpoint_id_by_ieee("0x00124b0011223344"), Some(2));
        assert_eq!(
            store.identity(2).unwrap().ieee_address,
            "0x00124b0011223344"
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = ZigbeeStore::new(temp_dir("zigbee-store").join("identities.json"));
        store.upsert(identity(2, "0xaa")).unwrap();
        store.remove(2).unwrap();
        assert_eq!(store.identity(2), None);
        store.remove(2).unwrap();
    }

    #[test]
    fn test_upsert_replaces_by_endpoint() {
        let store = ZigbeeStore::new(temp_dir("zigbee-store").join("identities.json"));
        store.upsert(identity(2, "0xaa")).unwrap();
        store.upsert(identity(2, "0xbb")).unwrap();
        assert_eq!(store.endpoint_id_by_ieee("0xaa"), None);
        assert_eq!(store.endpoint_id_by_ieee("0xbb"), Some(2));
    }
}
