//! Node/endpoint data model driven by the bridge registry.
//!
//! Endpoint ids are handed out from a monotonically increasing watermark
//! (`min_unused_endpoint_id`), so an id is never reissued while the node
//! lives; previously-used ids come back only through [`Node::resume_endpoint`]
//! during startup replay. Dynamic endpoints are torn down through
//! [`Node::destroy_endpoint`], which is gated on the deletable flag set at
//! creation time.

use crate::error::{BridgeError, Result};
use crate::matter::device_types::{
    CLUSTER_DESCRIPTOR, ClusterId, DEV_TYPE_AGGREGATOR, DEV_TYPE_ROOT_NODE, DeviceType,
};
use log::error;

/// Matter endpoint identifier.
pub type EndpointId = u16;

/// One endpoint on the node. The node owns all of these; everyone else
/// refers to an endpoint by id.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    parent_id: Option<EndpointId>,
    device_types: Vec<DeviceType>,
    clusters: Vec<ClusterId>,
    deletable: bool,
}

impl Endpoint {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn parent_id(&self) -> Option<EndpointId> {
        self.parent_id
    }

    pub fn device_types(&self) -> &[DeviceType] {
        &self.device_types
    }

    pub fn clusters(&self) -> &[ClusterId] {
        &self.clusters
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    /// Replace the device types reported for this endpoint.
    pub fn set_device_types(&mut self, device_types: Vec<DeviceType>) {
        self.device_types = device_types;
    }

    /// Replace the cluster set of this endpoint.
    pub fn set_clusters(&mut self, clusters: Vec<ClusterId>) {
        self.clusters = clusters;
    }
}

/// Bounds for a [`Node`]. The defaults come from the compile-time pool
/// constants; tests shrink them to exercise exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct NodeLimits {
    /// Total endpoints the node will hold, fixed endpoints included.
    pub max_endpoint_count: usize,
    /// Aggregator endpoints created at construction.
    pub aggregator_count: usize,
}

impl Default for NodeLimits {
    fn default() -> Self {
        Self {
            max_endpoint_count: crate::config::MAX_DYNAMIC_ENDPOINT_COUNT,
            aggregator_count: crate::config::AGGREGATOR_ENDPOINT_COUNT,
        }
    }
}

impl NodeLimits {
    /// Endpoint slots left for bridged devices once the root and the
    /// aggregators are accounted for.
    pub fn max_bridged_devices(&self) -> usize {
        self.max_endpoint_count
            .saturating_sub(1 + self.aggregator_count)
    }
}

/// The node: root endpoint, aggregator endpoints, and the dynamic endpoints
/// created for bridged devices.
#[derive(Debug)]
pub struct Node {
    endpoints: Vec<Endpoint>,
    min_unused_endpoint_id: EndpointId,
    limits: NodeLimits,
}

impl Node {
    /// Build a node with the root endpoint (id 0) and the configured number
    /// of aggregator endpoints (ids 1..=N).
    pub fn new(limits: NodeLimits) -> Self {
        let mut node = Self {
            endpoints: Vec::with_capacity(limits.max_endpoint_count),
            min_unused_endpoint_id: 0,
            limits,
        };

        let root_id = node.min_unused_endpoint_id;
        node.min_unused_endpoint_id += 1;
        node.endpoints.push(Endpoint {
            id: root_id,
            parent_id: None,
            device_types: vec![DEV_TYPE_ROOT_NODE],
            clusters: vec![CLUSTER_DESCRIPTOR],
            deletable: false,
        });

        for _ in 0..limits.aggregator_count {
            let id = node.min_unused_endpoint_id;
            node.min_unused_endpoint_id += 1;
            node.endpoints.push(Endpoint {
                id,
                parent_id: Some(root_id),
                device_types: vec![DEV_TYPE_AGGREGATOR],
                clusters: vec![CLUSTER_DESCRIPTOR],
                deletable: false,
            });
        }

        node
    }

    pub fn limits(&self) -> NodeLimits {
        self.limits
    }

    /// Id of the first aggregator endpoint, if any were configured.
    pub fn first_aggregator_id(&self) -> Option<EndpointId> {
        (self.limits.aggregator_count > 0).then_some(1)
    }

    /// Create a new dynamic endpoint under `parent` and return its id.
    ///
    /// The id comes off the watermark, so it is unique for the life of the
    /// node even across create/destroy cycles.
    pub fn create_endpoint(&mut self, parent: EndpointId, deletable: bool) -> Result<EndpointId> {
        if self.endpoints.len() >= self.limits.max_endpoint_count {
            error!(
                "Endpoint count cannot exceed the configured maximum of {}",
                self.limits.max_endpoint_count
            );
            return Err(BridgeError::PoolExhausted(self.limits.max_endpoint_count));
        }
        if !self.contains(parent) {
            error!("Parent endpoint {} does not exist", parent);
            return Err(BridgeError::EndpointNotFound(parent));
        }

        let id = self.min_unused_endpoint_id;
        self.min_unused_endpoint_id += 1;
        self.endpoints.push(Endpoint {
            id,
            parent_id: Some(parent),
            device_types: Vec::new(),
            clusters: Vec::new(),
            deletable,
        });
        Ok(id)
    }

    /// Re-create an endpoint that existed before a restart, bound to its
    /// previously-used id.
    ///
    /// Rejects ids that are already on the node and ids the watermark never
    /// handed out.
    pub fn resume_endpoint(
        &mut self,
        id: EndpointId,
        parent: EndpointId,
        deletable: bool,
    ) -> Result<EndpointId> {
        if self.contains(id) {
            error!("Cannot resume endpoint {}: already added to the node", id);
            return Err(BridgeError::EndpointExists(id));
        }
        if id >= self.min_unused_endpoint_id {
            error!("Cannot resume endpoint {}: id was never allocated", id);
            return Err(BridgeError::UnknownEndpointId(id));
        }
        if self.endpoints.len() >= self.limits.max_endpoint_count {
            error!(
                "Endpoint count cannot exceed the configured maximum of {}",
                self.limits.max_endpoint_count
            );
            return Err(BridgeError::PoolExhausted(self.limits.max_endpoint_count));
        }
        if !self.contains(parent) {
            error!("Parent endpoint {} does not exist", parent);
            return Err(BridgeError::EndpointNotFound(parent));
        }

        self.endpoints.push(Endpoint {
            id,
            parent_id: Some(parent),
            device_types: Vec::new(),
            clusters: Vec::new(),
            deletable,
        });
        Ok(id)
    }

    /// Tear down a dynamic endpoint. Fixed endpoints are not deletable.
    pub fn destroy_endpoint(&mut self, id: EndpointId) -> Result<()> {
        let index = self
            .endpoints
            .iter()
            .position(|ep| ep.id == id)
            .ok_or(BridgeError::EndpointNotFound(id))?;
        if !self.endpoints[index].deletable {
            error!("Endpoint {} cannot be deleted: not marked deletable", id);
            return Err(BridgeError::NotDeletable(id));
        }
        self.endpoints.remove(index);
        Ok(())
    }

    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == id)
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|ep| ep.id == id)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.endpoints.iter().any(|ep| ep.id == id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn min_unused_endpoint_id(&self) -> EndpointId {
        self.min_unused_endpoint_id
    }

    /// Raise the watermark after a restart so fresh endpoints never collide
    /// with resumed ids. Lowering it is refused.
    pub fn restore_min_unused_endpoint_id(&mut self, id: EndpointId) {
        if id > self.min_unused_endpoint_id {
            self.min_unused_endpoint_id = id;
        }
    }

    /// Drop the watermark back to the first dynamic id. Only valid once all
    /// dynamic endpoints are gone (factory reset).
    pub fn reset_min_unused_endpoint_id(&mut self) {
        let first_dynamic = 1 + self.limits.aggregator_count as EndpointId;
        if self.endpoints.len() == 1 + self.limits.aggregator_count {
            self.min_unused_endpoint_id = first_dynamic;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_node() -> Node {
        Node::new(NodeLimits {
            max_endpoint_count: 4,
            aggregator_count: 1,
        })
    }

    #[test]
    fn test_new_node_has_root_and_aggregator() {
        let node = small_node();
        assert_eq!(node.endpoint_count(), 2);
        assert!(node.contains(0));
        assert!(node.contains(1));
        assert_eq!(node.first_aggregator_id(), Some(1));
        assert_eq!(node.min_unused_endpoint_id(), 2);
    }

    #[test]
    fn test_create_assigns_monotonic_ids() {
        let mut node = small_node();
        let a = node.create_endpoint(1, true).unwrap();
        let b = node.create_endpoint(1, true).unwrap();
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        assert_eq!(node.min_unused_endpoint_id(), 4);
    }

    #[test]
    fn test_create_enforces_endpoint_limit() {
        let mut node = small_node();
        node.create_endpoint(1, true).unwrap();
        node.create_endpoint(1, true).unwrap();
        assert!(matches!(
            node.create_endpoint(1, true),
            Err(BridgeError::PoolExhausted(4))
        ));
    }

    #[test]
    fn test_create_rejects_missing_parent() {
        let mut node = small_node();
        assert!(matches!(
            node.create_endpoint(9, true),
            Err(BridgeError::EndpointNotFound(9))
        ));
    }

    #[test]
    fn test_destroyed_id_is_not_reissued() {
        let mut node = small_node();
        let a = node.create_endpoint(1, true).unwrap();
        node.destroy_endpoint(a).unwrap();
        let b = node.create_endpoint(1, true).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_destroy_requires_deletable_flag() {
        let mut node = small_node();
        let a = node.create_endpoint(1, false).unwrap();
        assert!(matches!(
            node.destroy_endpoint(a),
            Err(BridgeError::NotDeletable(_))
        ));
        assert!(matches!(
            node.destroy_endpoint(0),
            Err(BridgeError::NotDeletable(0))
        ));
    }

    #[test]
    fn test_resume_rebinds_previously_used_id() {
        let mut node = small_node();
        let a = node.create_endpoint(1, true).unwrap();
        node.destroy_endpoint(a).unwrap();
        let resumed = node.resume_endpoint(a, 1, true).unwrap();
        assert_eq!(resumed, a);
        assert!(node.contains(a));
    }

    #[test]
    fn test_resume_rejects_live_or_unknown_ids() {
        let mut node = small_node();
        let a = node.create_endpoint(1, true).unwrap();
        assert!(matches!(
            node.resume_endpoint(a, 1, true),
            Err(BridgeError::EndpointExists(_))
        ));
        assert!(matches!(
            node.resume_endpoint(7, 1, true),
            Err(BridgeError::UnknownEndpointId(7))
        ));
    }

    #[test]
    fn test_restore_watermark_never_lowers() {
        let mut node = small_node();
        node.restore_min_unused_endpoint_id(10);
        assert_eq!(node.min_unused_endpoint_id(), 10);
        node.restore_min_unused_endpoint_id(5);
        assert_eq!(node.min_unused_endpoint_id(), 10);
    }

    #[test]
    fn test_reset_watermark_only_when_empty() {
        let mut node = small_node();
        let a = node.create_endpoint(1, true).unwrap();
        node.reset_min_unused_endpoint_id();
        assert_eq!(node.min_unused_endpoint_id(), 3);
        node.destroy_endpoint(a).unwrap();
        node.reset_min_unused_endpoint_id();
        assert_eq!(node.min_unused_endpoint_id(), 2);
    }
}
