//! Migration protocol integration tests
//!
//! Runs hosts in one process over the in-memory transport:
//! - Atomic hand-off: a refused or failed transfer leaves the source as it was
//! - Lost acknowledgements: never two owners for one object
//! - Location propagation to communication partners
//! - Lazy redirects for hosts that missed an update
//! - Serialization of overlapping migrations
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package simdist-runtime --test migration
//! ```

mod common;

use async_trait::async_trait;
use common::{component, fast_config, hid, oid, Mesh};
use pretty_assertions::assert_eq;
use serde_json::json;
use simdist_config::MigrationConfig;
use simdist_runtime::{
    EntityCodec, HostId, HostNode, HostRequest, HostResponse, HostService, Location,
    MemoryTransport, MigrationPhase, PinnedEntity, RuntimeError, TcpTransport, Transport,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Scenario: object C moves from H1 to H2
// ============================================================================

#[tokio::test]
async fn test_proxy_follows_object_to_new_owner() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("C", "H1");
    let (h1, h2) = (mesh.node("H1"), mesh.node("H2"));

    let proxy = h2.proxy("C");
    assert_eq!(proxy.location(), Some(Location::Remote(hid("H1"))));
    proxy.set("pressure", json!(3.5)).await.unwrap();
    proxy.advance(10.0).await.unwrap();

    let report = h1.migrate(vec![oid("C")], hid("H2")).await.unwrap();
    assert!(report.succeeded());
    assert!(report.fully_propagated());

    assert_eq!(h2.location(&oid("C")), Some(Location::Local));
    assert_eq!(h1.location(&oid("C")), Some(Location::Remote(hid("H2"))));

    // state travelled with the object
    assert_eq!(proxy.get("pressure").await.unwrap(), Some(json!(3.5)));
    assert_eq!(proxy.time().await.unwrap(), 10.0);
}

#[tokio::test]
async fn test_location_of_object_over_rpc() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("C", "H1");
    let client = mesh.node("H2").client();

    let owner = client.location_of_object(&hid("H1"), oid("C")).await.unwrap();
    assert_eq!(owner, hid("H1"));
    let owner = client.location_of_object(&hid("H2"), oid("C")).await.unwrap();
    assert_eq!(owner, hid("H1"));

    let err = client
        .location_of_object(&hid("H1"), oid("nothing"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn test_migrate_to_requested_remotely() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("C", "H1");

    let moved = mesh
        .node("H2")
        .client()
        .migrate_to(&hid("H1"), vec![oid("C")], hid("H3"))
        .await
        .unwrap();
    assert!(moved);
    assert_eq!(mesh.node("H3").location(&oid("C")), Some(Location::Local));
}

// ============================================================================
// Atomicity: failed hand-off leaves the source unchanged
// ============================================================================

#[tokio::test]
async fn test_denied_migration_leaves_source_unchanged() {
    let mesh = Mesh::with_configs(vec![
        ("H1", fast_config()),
        (
            "H2",
            MigrationConfig {
                accept_migrations: false,
                ..fast_config()
            },
        ),
    ]);
    mesh.spawn("A", "H1");
    mesh.spawn("B", "H1");
    let (h1, h2) = (mesh.node("H1"), mesh.node("H2"));
    let source_before = h1.registry().snapshot();
    let destination_before = h2.registry().snapshot();

    let report = h1.migrate(vec![oid("A"), oid("B")], hid("H2")).await.unwrap();
    assert_eq!(report.phase, MigrationPhase::Aborted);
    assert!(matches!(
        report.failure,
        Some(RuntimeError::MigrationDenied { .. })
    ));

    assert_eq!(h1.registry().snapshot(), source_before);
    assert_eq!(h2.registry().snapshot(), destination_before);
    assert!(h1.entity(&oid("A")).is_some());
    assert!(!h1.migrate_to(vec![oid("A")], hid("H2")).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_destination_leaves_source_unchanged() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("A", "H1");
    let h1 = mesh.node("H1");
    let before = h1.registry().snapshot();

    mesh.transport.set_unreachable(&hid("H2"), true);
    let report = h1.migrate(vec![oid("A")], hid("H2")).await.unwrap();

    assert_eq!(report.phase, MigrationPhase::Aborted);
    assert!(matches!(report.failure, Some(RuntimeError::Transport { .. })));
    assert_eq!(h1.registry().snapshot(), before);
}

#[tokio::test]
async fn test_timeout_parks_object_until_resolved() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("A", "H1");
    let (h1, h2) = (mesh.node("H1"), mesh.node("H2"));

    mesh.transport
        .set_latency(&hid("H2"), Some(Duration::from_millis(500)));
    let report = h1.migrate(vec![oid("A")], hid("H2")).await.unwrap();
    match &report.failure {
        Some(RuntimeError::Transport { message, .. }) => assert!(message.contains("timed out")),
        other => panic!("unexpected {:?}", other),
    }
    // the batch may have landed, so H1 stops serving A
    assert_eq!(report.in_doubt, vec![oid("A")]);
    assert!(h1.entity(&oid("A")).is_none());
    assert_eq!(h1.location(&oid("A")), Some(Location::Remote(hid("H2"))));
    assert_eq!(h2.location(&oid("A")), Some(Location::Remote(hid("H1"))));
    assert_eq!(h1.resolve_in_doubt().await, 1);

    mesh.transport.heal(&hid("H2"));
    assert_eq!(h1.resolve_in_doubt().await, 0);
    assert_eq!(h1.location(&oid("A")), Some(Location::Local));
    assert!(h1.registry().in_doubt().is_empty());

    assert!(h1.migrate_to(vec![oid("A")], hid("H2")).await.unwrap());
    assert_eq!(h2.location(&oid("A")), Some(Location::Local));
}

#[tokio::test]
async fn test_unknown_peer_address_aborts_as_transport_failure() {
    let h1 = HostNode::new("H1", Arc::new(TcpTransport::default()), fast_config());
    h1.spawn_entity("A", component("test")).unwrap();
    let before = h1.registry().snapshot();

    let report = h1.migrate(vec![oid("A")], hid("H9")).await.unwrap();
    assert_eq!(report.phase, MigrationPhase::Aborted);
    match &report.failure {
        Some(err @ RuntimeError::Transport { host, .. }) => {
            assert_eq!(host, &hid("H9"));
            assert!(!err.maybe_delivered());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(report.in_doubt.is_empty());
    assert_eq!(h1.registry().snapshot(), before);
}

// ============================================================================
// Lost acknowledgements
// ============================================================================

/// Delivers `receive` in the background but answers only after `delay`,
/// optionally cutting the destination off once the batch has landed.
struct LateAck {
    inner: Arc<MemoryTransport>,
    delay: Duration,
    mute_after_delivery: bool,
}

#[async_trait]
impl Transport for LateAck {
    async fn call(
        &self,
        host: &HostId,
        request: HostRequest,
    ) -> Result<HostResponse, RuntimeError> {
        if !matches!(request, HostRequest::Receive { .. }) {
            return self.inner.call(host, request).await;
        }
        let (inner, target, mute) = (self.inner.clone(), host.clone(), self.mute_after_delivery);
        let delivery = tokio::spawn(async move {
            let response = inner.call(&target, request).await;
            if mute {
                inner.set_unreachable(&target, true);
            }
            response
        });
        tokio::time::sleep(self.delay).await;
        match delivery.await {
            Ok(response) => response,
            Err(e) => Err(RuntimeError::transport(host, e.to_string())),
        }
    }
}

/// H1 talks through a `LateAck` transport with a 100ms timeout, the other
/// hosts through the shared in-memory transport.
fn late_ack_mesh(
    hosts: &[&str],
    mute_after_delivery: bool,
) -> (Arc<MemoryTransport>, Vec<Arc<HostNode>>) {
    let memory = Arc::new(MemoryTransport::new());
    let late = Arc::new(LateAck {
        inner: memory.clone(),
        delay: Duration::from_millis(300),
        mute_after_delivery,
    });
    let h1 = Arc::new(HostNode::new(
        "H1",
        late,
        MigrationConfig {
            rpc_timeout_ms: 100,
            ..fast_config()
        },
    ));
    h1.spawn_entity("A", component("test")).unwrap();

    let mut nodes = vec![h1];
    for id in hosts {
        let node = Arc::new(HostNode::new(*id, memory.clone(), fast_config()));
        node.adopt_location("A", "H1");
        nodes.push(node);
    }
    for node in &nodes {
        memory.register(node.clone());
    }
    (memory, nodes)
}

fn local_owners(nodes: &[Arc<HostNode>], id: &str) -> Vec<HostId> {
    nodes
        .iter()
        .filter(|n| n.location(&oid(id)) == Some(Location::Local))
        .map(|n| n.id().clone())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_acknowledgement_commits_hand_off() {
    let (_memory, nodes) = late_ack_mesh(&["H2"], false);
    let (h1, h2) = (&nodes[0], &nodes[1]);

    let report = h1.migrate(vec![oid("A")], hid("H2")).await.unwrap();
    assert!(report.succeeded(), "{:?}", report.failure);
    assert!(report.in_doubt.is_empty());

    assert_eq!(local_owners(&nodes, "A"), vec![hid("H2")]);
    assert_eq!(h1.location(&oid("A")), Some(Location::Remote(hid("H2"))));
    assert!(h1.entity(&oid("A")).is_none());
    assert_eq!(h2.proxy("A").time().await.unwrap(), 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_destination_leaves_object_in_doubt() {
    let (memory, nodes) = late_ack_mesh(&["H2", "H3"], true);
    let (h1, h2, h3) = (&nodes[0], &nodes[1], &nodes[2]);

    let report = h1.migrate(vec![oid("A")], hid("H2")).await.unwrap();
    assert_eq!(report.phase, MigrationPhase::Aborted);
    assert_eq!(report.in_doubt, vec![oid("A")]);

    // H2 took the batch, H1 must not keep serving its copy
    assert_eq!(local_owners(&nodes, "A"), vec![hid("H2")]);
    assert_eq!(h1.registry().in_doubt(), vec![(oid("A"), hid("H2"))]);
    assert!(matches!(
        h1.migrate_to(vec![oid("A")], hid("H3")).await,
        Err(RuntimeError::NoLocalObject { .. })
    ));

    // H3 still believes H1 owns A; once H2 answers, the call settles it
    memory.heal(&hid("H2"));
    h3.proxy("A").set("seen", json!(true)).await.unwrap();
    assert_eq!(h1.location(&oid("A")), Some(Location::Remote(hid("H2"))));
    assert!(h1.registry().in_doubt().is_empty());
    assert_eq!(h2.proxy("A").get("seen").await.unwrap(), Some(json!(true)));
    assert_eq!(h1.resolve_in_doubt().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_owner_update_settles_in_doubt_object() {
    let (memory, nodes) = late_ack_mesh(&["H2"], true);
    let h1 = &nodes[0];

    let report = h1.migrate(vec![oid("A")], hid("H2")).await.unwrap();
    assert_eq!(report.in_doubt, vec![oid("A")]);

    memory.heal(&hid("H2"));
    h1.update_object_locations(vec![oid("A")], hid("H2"))
        .await
        .unwrap();
    assert!(h1.registry().in_doubt().is_empty());
    assert_eq!(h1.location(&oid("A")), Some(Location::Remote(hid("H2"))));
    assert_eq!(local_owners(&nodes, "A"), vec![hid("H2")]);
}

#[tokio::test]
async fn test_destination_without_decoder_refuses() {
    let mut mesh = Mesh::new(&["H1"]);
    let strict = HostNode::new("H2", mesh.transport.clone(), fast_config())
        .with_codec(EntityCodec::empty());
    mesh.add(Arc::new(strict));
    mesh.spawn("A", "H1");
    let before = mesh.node("H1").registry().snapshot();

    let ok = mesh
        .node("H1")
        .migrate_to(vec![oid("A")], hid("H2"))
        .await
        .unwrap();
    assert!(!ok);
    assert_eq!(mesh.node("H1").registry().snapshot(), before);
}

#[tokio::test]
async fn test_local_input_errors_are_typed() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("A", "H1");
    let h1 = mesh.node("H1");
    h1.spawn_entity("gpu", Arc::new(PinnedEntity::new(component("m"))))
        .unwrap();

    let err = h1
        .migrate_to(vec![oid("A"), oid("gpu")], hid("H2"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NonSerializable { .. }));

    // H2 does not own A, so it cannot give it away
    let err = mesh
        .node("H2")
        .migrate_to(vec![oid("A")], hid("H1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoLocalObject { .. }));

    assert_eq!(h1.local_ids(), vec![oid("A"), oid("gpu")]);
}

// ============================================================================
// Propagation and redirects
// ============================================================================

#[tokio::test]
async fn test_partners_learn_new_location() {
    let mesh = Mesh::new(&["H1", "H2", "H3", "H4"]);
    mesh.spawn("X", "H1");
    let (h1, h3, h4) = (mesh.node("H1"), mesh.node("H3"), mesh.node("H4"));

    // H3 becomes a communication partner of X; H4 never calls it
    h3.proxy("X").time().await.unwrap();

    let report = h1.migrate(vec![oid("X")], hid("H2")).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.notified, vec![hid("H2"), hid("H3")]);

    for host in ["H1", "H3"] {
        assert_eq!(
            mesh.node(host).location(&oid("X")),
            Some(Location::Remote(hid("H2"))),
            "{}",
            host
        );
    }
    assert_eq!(h4.location(&oid("X")), Some(Location::Remote(hid("H1"))));

    // H4 is stale and re-resolves through H1's redirect
    h4.proxy("X").set("seen", json!(true)).await.unwrap();
    assert_eq!(h4.location(&oid("X")), Some(Location::Remote(hid("H2"))));
}

#[tokio::test]
async fn test_object_partner_resolves_to_its_host() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("X", "H1");
    mesh.spawn("Y", "H3");

    // Y (on H3) calls X
    mesh.node("H3").proxy("X").with_caller("Y").time().await.unwrap();

    let report = mesh
        .node("H1")
        .migrate(vec![oid("X")], hid("H2"))
        .await
        .unwrap();
    assert_eq!(report.notified, vec![hid("H2"), hid("H3")]);
}

#[tokio::test]
async fn test_unreachable_partner_is_reported_not_fatal() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("X", "H1");
    let h3 = mesh.node("H3");
    h3.proxy("X").time().await.unwrap();

    mesh.transport.set_unreachable(&hid("H3"), true);
    let report = mesh
        .node("H1")
        .migrate(vec![oid("X")], hid("H2"))
        .await
        .unwrap();
    assert!(report.succeeded());
    assert!(!report.fully_propagated());
    assert_eq!(report.unreachable, vec![hid("H3")]);
    assert_eq!(h3.location(&oid("X")), Some(Location::Remote(hid("H1"))));

    mesh.transport.heal(&hid("H3"));
    assert_eq!(h3.proxy("X").time().await.unwrap(), 0.0);
    assert_eq!(h3.location(&oid("X")), Some(Location::Remote(hid("H2"))));
}

#[tokio::test]
async fn test_previous_owner_is_kept_up_to_date() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("X", "H1");

    assert!(mesh
        .node("H1")
        .migrate_to(vec![oid("X")], hid("H2"))
        .await
        .unwrap());
    assert!(mesh
        .node("H2")
        .migrate_to(vec![oid("X")], hid("H3"))
        .await
        .unwrap());

    for host in ["H1", "H2"] {
        assert_eq!(
            mesh.node(host).location(&oid("X")),
            Some(Location::Remote(hid("H3"))),
            "{}",
            host
        );
    }
    assert_eq!(mesh.node("H3").location(&oid("X")), Some(Location::Local));
}

#[tokio::test]
async fn test_repeated_location_updates_are_idempotent() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("X", "H1");
    let client = mesh.node("H1").client();

    client
        .update_object_locations(&hid("H3"), vec![oid("X"), oid("Z")], hid("H2"))
        .await
        .unwrap();
    let once = mesh.node("H3").registry().snapshot();
    client
        .update_object_locations(&hid("H3"), vec![oid("X"), oid("Z")], hid("H2"))
        .await
        .unwrap();
    assert_eq!(mesh.node("H3").registry().snapshot(), once);

    // the owner keeps its local entry
    mesh.node("H1")
        .update_object_locations(vec![oid("X")], hid("H3"))
        .await
        .unwrap();
    assert_eq!(mesh.node("H1").location(&oid("X")), Some(Location::Local));
}

#[tokio::test]
async fn test_redirect_limit() {
    let mesh = Mesh::with_configs(vec![
        (
            "H1",
            MigrationConfig {
                max_redirects: 0,
                ..fast_config()
            },
        ),
        ("H2", fast_config()),
        ("H3", fast_config()),
    ]);
    mesh.spawn("X", "H3");
    // H1 wrongly believes H2 owns X; H2 redirects to H3
    mesh.node("H1").adopt_location("X", "H2");

    let err = mesh.node("H1").proxy("X").time().await.unwrap_err();
    assert!(matches!(err, RuntimeError::StaleOwner { .. }));
}

#[tokio::test]
async fn test_remote_proxy_refuses_mediator() {
    let mesh = Mesh::new(&["H1", "H2"]);
    mesh.spawn("C", "H1");
    let err = mesh.node("H2").proxy("C").mediator().unwrap_err();
    assert!(matches!(err, RuntimeError::RemoteCallForbidden { .. }));

    // the owner still hands out the real mediator
    assert!(mesh.node("H1").entity(&oid("C")).is_some());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_migrations_are_serialized() {
    for _ in 0..20 {
        let mesh = Mesh::new(&["H1", "H2", "H3"]);
        mesh.spawn("X", "H1");
        mesh.spawn("Y", "H1");
        let h1 = mesh.node("H1").clone();

        let first = {
            let h1 = h1.clone();
            tokio::spawn(async move { h1.migrate_to(vec![oid("X")], hid("H2")).await })
        };
        let second = {
            let h1 = h1.clone();
            tokio::spawn(async move { h1.migrate_to(vec![oid("X"), oid("Y")], hid("H3")).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        let succeeded = results.iter().filter(|r| matches!(r, Ok(true))).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(RuntimeError::NoLocalObject { .. })))
            .count();
        assert_eq!((succeeded, refused), (1, 1));

        let owners: Vec<&str> = ["H1", "H2", "H3"]
            .into_iter()
            .filter(|h| mesh.node(h).location(&oid("X")) == Some(Location::Local))
            .collect();
        assert_eq!(owners.len(), 1, "X owned by {:?}", owners);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_migrations_run_in_parallel() {
    let mesh = Mesh::new(&["H1", "H2", "H3"]);
    mesh.spawn("X", "H1");
    mesh.spawn("Y", "H1");
    let h1 = mesh.node("H1").clone();

    let (a, b) = tokio::join!(
        h1.migrate_to(vec![oid("X")], hid("H2")),
        h1.migrate_to(vec![oid("Y")], hid("H3")),
    );
    assert!(a.unwrap());
    assert!(b.unwrap());
    assert_eq!(mesh.node("H2").local_ids(), vec![oid("X")]);
    assert_eq!(mesh.node("H3").local_ids(), vec![oid("Y")]);
    assert!(h1.local_ids().is_empty());
}
