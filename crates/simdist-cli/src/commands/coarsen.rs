//! Coarsen command - Show the coarsening hierarchy of a model graph

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use simdist_core::CoarseningEngine;

use super::{load_config, load_graph};
use crate::GlobalOptions;

/// Arguments for the coarsen command
#[derive(clap::Args, Debug)]
pub struct CoarsenArgs {
    /// Model graph description (JSON)
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Number of hosts the hierarchy is built for
    #[arg(long, default_value_t = 2)]
    hosts: usize,

    /// Stop once the graph has this many vertices per host
    #[arg(long)]
    vertices_per_host: Option<usize>,

    /// Maximum weight of a merged vertex
    #[arg(long)]
    max_vertex_weight: Option<f64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Summary of one level of the hierarchy
#[derive(Debug, Serialize)]
struct LevelInfo {
    level: usize,
    vertices: usize,
    edges: usize,
    total_weight: f64,
    max_vertex_weight: f64,
}

/// Execute the coarsen command
pub async fn execute(args: CoarsenArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, None)?;
    let mut coarsening = config.partitioning.coarsening.clone();
    if let Some(vph) = args.vertices_per_host {
        coarsening.vertices_per_host = vph;
    }

    let model = load_graph(&args.model, "model")?;
    let mut engine =
        CoarseningEngine::for_hosts(model, &coarsening, args.hosts, args.max_vertex_weight)
            .context("Model graph cannot be coarsened")?;
    let built = engine
        .coarsen_graph()
        .context("Coarsening failed")?;

    let levels: Vec<LevelInfo> = (0..engine.level_count())
        .filter_map(|level| {
            engine.graph_at_level(level).map(|g| LevelInfo {
                level,
                vertices: g.vertex_count(),
                edges: g.edge_count(),
                total_weight: g.total_vertex_weight(),
                max_vertex_weight: g.max_vertex_weight(),
            })
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&levels)?);
        return Ok(());
    }

    println!(
        "{:>5}  {:>8}  {:>8}  {:>12}  {:>10}",
        "level", "vertices", "edges", "total weight", "max weight"
    );
    for info in &levels {
        println!(
            "{:>5}  {:>8}  {:>8}  {:>12.2}  {:>10.2}",
            info.level, info.vertices, info.edges, info.total_weight, info.max_vertex_weight
        );
    }
    if !global.quiet {
        eprintln!("Built {} coarser level(s) for {} host(s)", built, args.hosts);
    }

    Ok(())
}
