//! Common test utilities for integration tests.
//!
//! Builds in-memory meshes of hosts that share one `MemoryTransport`.

#![allow(dead_code)]

use simdist_config::MigrationConfig;
use simdist_runtime::{ComponentEntity, Entity, HostId, HostNode, MemoryTransport, ObjectId};
use std::sync::Arc;

/// Short timeouts and backoff so failure paths finish quickly.
pub fn fast_config() -> MigrationConfig {
    MigrationConfig {
        rpc_timeout_ms: 200,
        notify_attempts: 2,
        notify_backoff_ms: 5,
        ..Default::default()
    }
}

pub fn component(model: &str) -> Arc<dyn Entity> {
    Arc::new(ComponentEntity::new(model))
}

pub fn oid(id: &str) -> ObjectId {
    ObjectId::new(id)
}

pub fn hid(id: &str) -> HostId {
    HostId::new(id)
}

/// Hosts wired together through one in-memory transport.
pub struct Mesh {
    pub transport: Arc<MemoryTransport>,
    pub nodes: Vec<Arc<HostNode>>,
}

impl Mesh {
    /// Hosts sharing one configuration.
    pub fn new(ids: &[&str]) -> Self {
        let configs: Vec<(&str, MigrationConfig)> =
            ids.iter().map(|id| (*id, fast_config())).collect();
        Self::with_configs(configs)
    }

    /// Hosts with individual configurations.
    pub fn with_configs(hosts: Vec<(&str, MigrationConfig)>) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        let nodes: Vec<Arc<HostNode>> = hosts
            .into_iter()
            .map(|(id, config)| Arc::new(HostNode::new(id, transport.clone(), config)))
            .collect();
        for node in &nodes {
            transport.register(node.clone());
        }
        Self { transport, nodes }
    }

    /// Add a pre-built node to the mesh.
    pub fn add(&mut self, node: Arc<HostNode>) {
        self.transport.register(node.clone());
        self.nodes.push(node);
    }

    pub fn node(&self, id: &str) -> &Arc<HostNode> {
        self.nodes
            .iter()
            .find(|n| n.id().as_str() == id)
            .unwrap_or_else(|| panic!("no host {}", id))
    }

    /// Create `object` on `owner` and point every other host at it.
    pub fn spawn(&self, object: &str, owner: &str) {
        for node in &self.nodes {
            if node.id().as_str() == owner {
                node.spawn_entity(object, component("test")).expect("spawn");
            } else {
                node.adopt_location(object, owner);
            }
        }
    }
}
