//! Initial object placement from a computed partition.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::entity::Entity;
use crate::error::RuntimeError;
use crate::node::HostNode;
use crate::types::HostId;
use simdist_core::Partition;

/// Instantiate every partitioned object on its assigned host.
///
/// The owner registers the entity built by `factory`; every other node
/// records a remote entry pointing at the owner. All assigned hosts must
/// be among `nodes`, checked before anything is registered. Returns the
/// number of objects placed.
pub fn place<F>(
    partition: &Partition,
    nodes: &[Arc<HostNode>],
    mut factory: F,
) -> Result<usize, RuntimeError>
where
    F: FnMut(&str) -> Arc<dyn Entity>,
{
    let by_id: HashMap<&HostId, &Arc<HostNode>> = nodes.iter().map(|n| (n.id(), n)).collect();
    for host in partition.hosts_used() {
        if !by_id.contains_key(&HostId::new(host)) {
            return Err(RuntimeError::UnknownHost(HostId::new(host)));
        }
    }

    let mut placed = 0;
    for (vertex, host) in partition.iter() {
        let owner = HostId::new(host);
        for node in nodes {
            if node.id() == &owner {
                node.spawn_entity(vertex, factory(vertex))?;
            } else {
                node.adopt_location(vertex, owner.clone());
            }
        }
        placed += 1;
    }

    info!(objects = placed, hosts = nodes.len(), "Placed objects");
    Ok(placed)
}
