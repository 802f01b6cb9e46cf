//! Algorithms command - List partitioning algorithms and their eligibility

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use simdist_config::{ConfigOverrides, PartitionerType};
use simdist_core::PartitionerRegistry;

use super::{load_config, load_graph};
use crate::GlobalOptions;

/// Arguments for the algorithms command
#[derive(clap::Args, Debug)]
pub struct AlgorithmsArgs {
    /// Model graph to check eligibility against (JSON)
    #[arg(long, short = 'm', requires = "hardware")]
    model: Option<PathBuf>,

    /// Hardware graph to check eligibility against (JSON)
    #[arg(long = "hardware", short = 'H', requires = "model")]
    hardware: Option<PathBuf>,

    /// Partitioner family (single-level-only, multi-level-only, any-type)
    #[arg(long, value_parser = crate::parse_partitioner_type)]
    kind: Option<PartitionerType>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// One registered algorithm
#[derive(Debug, Serialize)]
struct AlgorithmInfo {
    name: &'static str,
    kind: String,
    priority: u8,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    eligible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    selected: bool,
}

/// Execute the algorithms command
pub async fn execute(args: AlgorithmsArgs, global: GlobalOptions) -> Result<()> {
    let overrides = ConfigOverrides {
        kind: args.kind,
        ..Default::default()
    };
    let config = load_config(&global, Some(&overrides))?;
    let registry = PartitionerRegistry::builtin();

    let graphs = match (&args.model, &args.hardware) {
        (Some(model), Some(hardware)) => Some((
            load_graph(model, "model")?,
            load_graph(hardware, "hardware")?,
        )),
        _ => None,
    };

    let selected = graphs.as_ref().and_then(|(model, hardware)| {
        registry
            .select(&config.partitioning, model, hardware)
            .ok()
            .map(|d| d.name)
    });

    let infos: Vec<AlgorithmInfo> = registry
        .descriptors()
        .iter()
        .map(|d| {
            let reason = graphs.as_ref().and_then(|(model, hardware)| {
                d.ineligibility(config.partitioning.kind, model, hardware)
            });
            AlgorithmInfo {
                name: d.name,
                kind: d.kind.to_string(),
                priority: d.priority,
                description: d.description,
                eligible: graphs.as_ref().map(|_| reason.is_none()),
                reason,
                selected: selected == Some(d.name),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in &infos {
        let marker = if info.selected { "*" } else { " " };
        println!(
            "{} {:<14} {:<13} priority {:>3}  {}",
            marker, info.name, info.kind, info.priority, info.description
        );
        match (info.eligible, &info.reason) {
            (Some(false), Some(reason)) => println!("    not eligible: {}", reason),
            (Some(true), _) => println!("    eligible"),
            _ => {}
        }
    }

    if graphs.is_some() && selected.is_none() {
        println!();
        println!(
            "No algorithm is eligible for kind '{}'",
            config.partitioning.kind
        );
    }

    Ok(())
}
