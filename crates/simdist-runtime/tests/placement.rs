//! Placement integration tests
//!
//! Partitions a model graph, instantiates it across in-memory hosts and
//! moves an object afterwards.

mod common;

use common::{component, hid, oid, Mesh};
use pretty_assertions::assert_eq;
use simdist_config::PartitioningConfig;
use simdist_core::{LabeledGraph, PartitionerRegistry};
use simdist_runtime::{place, HostService, Location};

fn two_triangles() -> LabeledGraph {
    let mut g = LabeledGraph::default();
    for v in ["A", "B", "C", "D", "E", "F"] {
        g.add_vertex(v, 1.0, None).unwrap();
    }
    for (s, t) in [
        ("A", "B"),
        ("B", "C"),
        ("A", "C"),
        ("D", "E"),
        ("E", "F"),
        ("D", "F"),
        ("B", "D"),
    ] {
        g.add_edge(s, t, 1.0, None).unwrap();
    }
    g
}

fn two_hosts() -> LabeledGraph {
    let mut hw = LabeledGraph::default();
    hw.add_vertex("H1", 1.0, None).unwrap();
    hw.add_vertex("H2", 1.0, None).unwrap();
    hw.add_edge("H1", "H2", 1.0, None).unwrap();
    hw
}

#[tokio::test]
async fn test_partition_place_then_migrate() {
    let model = two_triangles();
    let partition = PartitionerRegistry::builtin()
        .partition(&PartitioningConfig::default(), "triangles", &model, &two_hosts())
        .unwrap();

    let mesh = Mesh::new(&["H1", "H2"]);
    let placed = place(&partition, &mesh.nodes, |_| component("triangles")).unwrap();
    assert_eq!(placed, 6);

    let (h1, h2) = (mesh.node("H1"), mesh.node("H2"));
    assert_eq!(h1.local_ids(), vec![oid("A"), oid("B"), oid("C")]);
    assert_eq!(h2.local_ids(), vec![oid("D"), oid("E"), oid("F")]);

    // before migration H2 reaches C on H1
    assert_eq!(h2.location(&oid("C")), Some(Location::Remote(hid("H1"))));
    h2.proxy("C").time().await.unwrap();

    assert!(h1.migrate_to(vec![oid("C")], hid("H2")).await.unwrap());
    assert_eq!(h2.location(&oid("C")), Some(Location::Local));
    assert_eq!(h1.location(&oid("C")), Some(Location::Remote(hid("H2"))));
}
