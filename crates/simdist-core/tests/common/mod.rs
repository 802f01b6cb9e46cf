//! Common test utilities for integration tests.
//!
//! Graph builders for the scenarios exercised across test files.

#![allow(dead_code)]

use simdist_core::LabeledGraph;

/// Build an undirected graph with unit vertex weights.
pub fn unit_graph(vertices: &[&str], edges: &[(&str, &str, f64)]) -> LabeledGraph {
    let mut g = LabeledGraph::default();
    for v in vertices {
        g.add_vertex(*v, 1.0, None).expect("vertex");
    }
    for (s, t, w) in edges {
        g.add_edge(s, t, *w, None).expect("edge");
    }
    g
}

/// Two triangles {A,B,C} and {D,E,F} joined by the single edge B-D.
pub fn two_triangles() -> LabeledGraph {
    unit_graph(
        &["A", "B", "C", "D", "E", "F"],
        &[
            ("A", "B", 1.0),
            ("B", "C", 1.0),
            ("A", "C", 1.0),
            ("D", "E", 1.0),
            ("E", "F", 1.0),
            ("D", "F", 1.0),
            ("B", "D", 1.0),
        ],
    )
}

/// Fully connected hosts with equal capacity and unit link cost.
pub fn equal_hosts(n: usize) -> LabeledGraph {
    let mut hw = LabeledGraph::default();
    let names: Vec<String> = (1..=n).map(|i| format!("H{}", i)).collect();
    for name in &names {
        hw.add_vertex(name.clone(), 1.0, None).expect("host");
    }
    for i in 0..n {
        for j in i + 1..n {
            hw.add_edge(&names[i], &names[j], 1.0, None).expect("link");
        }
    }
    hw
}

/// Deterministic pseudo-random graph with vertex weights 1 to 3.
pub fn pseudo_random_graph(n: usize, edges: usize, seed: u64) -> LabeledGraph {
    random_graph(n, edges, seed, 3)
}

/// Deterministic pseudo-random graph (linear congruential generator) with
/// integer vertex weights from 1 to `max_weight`.
pub fn random_graph(n: usize, edges: usize, seed: u64, max_weight: usize) -> LabeledGraph {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };

    let mut g = LabeledGraph::new(false, false);
    for i in 0..n {
        let weight = (next() % max_weight + 1) as f64;
        g.add_vertex(format!("v{}", i), weight, None).expect("vertex");
    }
    for _ in 0..edges {
        let a = next() % n;
        let b = next() % n;
        if a != b {
            let w = (next() % 5 + 1) as f64;
            g.add_edge(&format!("v{}", a), &format!("v{}", b), w, None)
                .expect("edge");
        }
    }
    g
}

/// Square grid with unit weights.
pub fn grid(side: usize) -> LabeledGraph {
    let mut g = LabeledGraph::default();
    let id = |r: usize, c: usize| format!("{}_{}", r, c);
    for r in 0..side {
        for c in 0..side {
            g.add_vertex(id(r, c), 1.0, None).expect("vertex");
        }
    }
    for r in 0..side {
        for c in 0..side {
            if c + 1 < side {
                g.add_edge(&id(r, c), &id(r, c + 1), 1.0, None).expect("edge");
            }
            if r + 1 < side {
                g.add_edge(&id(r, c), &id(r + 1, c), 1.0, None).expect("edge");
            }
        }
    }
    g
}
