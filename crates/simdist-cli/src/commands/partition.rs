//! Partition command - Map a model graph onto a hardware graph

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use simdist_config::{ConfigOverrides, PartitionerType};
use simdist_core::{Partition, PartitionStats, PartitionerRegistry};

use super::{load_config, load_graph, model_name, print_info};
use crate::GlobalOptions;

/// Arguments for the partition command
#[derive(clap::Args, Debug)]
pub struct PartitionArgs {
    /// Model graph description (JSON)
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Hardware graph description (JSON)
    #[arg(long = "hardware", short = 'H')]
    hardware: PathBuf,

    /// Algorithm to use instead of automatic selection
    #[arg(long, short = 'a')]
    algorithm: Option<String>,

    /// Partitioner family (single-level-only, multi-level-only, any-type)
    #[arg(long, value_parser = crate::parse_partitioner_type)]
    kind: Option<PartitionerType>,

    /// Allowed relative overload per host
    #[arg(long, short = 't')]
    tolerance: Option<f64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// JSON output of a partitioning run
#[derive(Debug, Serialize)]
struct PartitionOutput<'a> {
    model: String,
    algorithm: &'a str,
    assignment: &'a Partition,
    stats: PartitionStats,
}

/// Execute the partition command
pub async fn execute(args: PartitionArgs, global: GlobalOptions) -> Result<()> {
    let overrides = ConfigOverrides {
        algorithm: args.algorithm.clone(),
        kind: args.kind,
        balance_tolerance: args.tolerance,
        ..Default::default()
    };
    let config = load_config(&global, Some(&overrides))?;

    let model = load_graph(&args.model, "model")?;
    let hardware = load_graph(&args.hardware, "hardware")?;
    let name = model_name(&args.model);

    let registry = PartitionerRegistry::builtin();
    let descriptor = registry
        .select(&config.partitioning, &model, &hardware)
        .context("No algorithm can partition this model")?;
    let partition = registry
        .partition(&config.partitioning, &name, &model, &hardware)
        .context("Partitioning failed")?;
    let stats = partition.stats(&model, &hardware, config.partitioning.balance_tolerance);

    if args.json {
        let output = PartitionOutput {
            model: name,
            algorithm: descriptor.name,
            assignment: &partition,
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_info(
        &format!(
            "Partitioned '{}' with {} ({} vertices, {} hosts)",
            name,
            descriptor.name,
            model.vertex_count(),
            hardware.vertex_count()
        ),
        global.quiet,
    );

    let loads = partition.loads(&model);
    for host in hardware.vertices() {
        let vertices = partition.vertices_on(&host.id);
        let load = loads.get(&host.id).copied().unwrap_or(0.0);
        println!("{:<12} load {:>8.2}  {}", host.id, load, vertices.join(" "));
    }
    println!();
    println!("Cut weight:          {:.2}", stats.cut_weight);
    println!("Communication cost:  {:.2}", stats.communication_cost);
    println!("Max relative load:   {:.3}", stats.max_relative_load);
    println!("Hosts used:          {}/{}", stats.hosts_used, stats.hosts);
    println!(
        "Balanced:            {}",
        if stats.balanced { "yes" } else { "no" }
    );

    Ok(())
}
