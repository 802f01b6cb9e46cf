//! TCP transport integration tests
//!
//! Two hosts serve the RPC surface on loopback sockets and migrate an
//! object between them.

mod common;

use common::{component, fast_config, hid, oid};
use pretty_assertions::assert_eq;
use serde_json::json;
use simdist_runtime::{serve, HostNode, HostService, Location, RuntimeError, TcpTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Cluster {
    nodes: Vec<Arc<HostNode>>,
    servers: Vec<JoinHandle<Result<(), RuntimeError>>>,
}

impl Cluster {
    async fn start(ids: &[&str]) -> Self {
        let mut listeners = Vec::new();
        let mut peers = HashMap::new();
        for id in ids {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            peers.insert(hid(id), listener.local_addr().unwrap());
            listeners.push(listener);
        }

        let transport = Arc::new(TcpTransport::new(peers));
        let mut nodes = Vec::new();
        let mut servers = Vec::new();
        for (id, listener) in ids.iter().zip(listeners) {
            let node = Arc::new(HostNode::new(*id, transport.clone(), fast_config()));
            servers.push(tokio::spawn(serve(listener, node.clone())));
            nodes.push(node);
        }
        Self { nodes, servers }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for server in &self.servers {
            server.abort();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_migration_over_tcp() {
    let cluster = Cluster::start(&["H1", "H2"]).await;
    let (h1, h2) = (&cluster.nodes[0], &cluster.nodes[1]);
    h1.spawn_entity("C", component("plant")).unwrap();
    h2.adopt_location("C", "H1");

    let proxy = h2.proxy("C");
    proxy.set("level", json!(0.25)).await.unwrap();

    assert!(h1.migrate_to(vec![oid("C")], hid("H2")).await.unwrap());
    assert_eq!(h2.location(&oid("C")), Some(Location::Local));
    assert_eq!(h1.location(&oid("C")), Some(Location::Remote(hid("H2"))));
    assert_eq!(proxy.get("level").await.unwrap(), Some(json!(0.25)));

    // H1 now forwards calls for C to H2
    let via_h1 = h1.proxy("C");
    assert_eq!(via_h1.get("level").await.unwrap(), Some(json!(0.25)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_owner_errors_cross_the_wire() {
    let cluster = Cluster::start(&["H1", "H2"]).await;
    let h1 = &cluster.nodes[0];

    let err = h1
        .client()
        .location_of_object(&hid("H2"), oid("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn test_closed_port_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = Arc::new(TcpTransport::new(HashMap::from([(hid("H2"), addr)])));
    let h1 = HostNode::new("H1", transport, fast_config());
    h1.spawn_entity("C", component("plant")).unwrap();

    let report = h1.migrate(vec![oid("C")], hid("H2")).await.unwrap();
    assert!(!report.succeeded());
    assert!(matches!(report.failure, Some(RuntimeError::Transport { .. })));
    assert_eq!(h1.location(&oid("C")), Some(Location::Local));
}
