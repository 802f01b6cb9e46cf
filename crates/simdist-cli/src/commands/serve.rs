//! Serve command - Run a host serving the migration protocol over TCP
//!
//! The host listens on the configured bind address, reaches its peers
//! through the `[transport.peers]` table plus any `--peer` flags, and can
//! be seeded with component objects it owns or knows about.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use simdist_config::ConfigOverrides;
use simdist_runtime::{serve, ComponentEntity, HostId, HostNode, TcpTransport};
use tokio::net::TcpListener;
use tracing::info;

use super::{load_config, print_info};
use crate::GlobalOptions;

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Identifier of this host
    #[arg(long)]
    host: String,

    /// Address to listen on (overrides transport.bind)
    #[arg(long, short = 'b')]
    bind: Option<String>,

    /// Peer host address as ID=ADDR (repeatable)
    #[arg(long = "peer", value_name = "ID=ADDR", value_parser = parse_assignment)]
    peers: Vec<(String, String)>,

    /// Create a component object owned by this host (repeatable)
    #[arg(long = "spawn", value_name = "OBJECT")]
    spawn: Vec<String>,

    /// Record that an object lives on another host, as OBJECT=HOST (repeatable)
    #[arg(long = "locate", value_name = "OBJECT=HOST", value_parser = parse_assignment)]
    locate: Vec<(String, String)>,

    /// Model name attached to spawned components
    #[arg(long, default_value = "simulation")]
    model: String,

    /// RPC timeout in milliseconds (overrides migration.rpc_timeout_ms)
    #[arg(long)]
    rpc_timeout_ms: Option<u64>,
}

/// Parse a `KEY=VALUE` pair
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Execute the serve command
pub async fn execute(args: ServeArgs, global: GlobalOptions) -> Result<()> {
    let overrides = ConfigOverrides {
        bind: args.bind.clone(),
        rpc_timeout_ms: args.rpc_timeout_ms,
        ..Default::default()
    };
    let config = load_config(&global, Some(&overrides))?;

    let transport =
        Arc::new(TcpTransport::from_config(&config.transport).context("Invalid peer table")?);
    for (id, addr) in &args.peers {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid address '{}' for peer {}", addr, id))?;
        transport.add_peer(HostId::new(id.as_str()), addr);
    }

    let node = Arc::new(HostNode::new(
        args.host.as_str(),
        transport,
        config.migration.clone(),
    ));
    for object in &args.spawn {
        node.spawn_entity(
            object.as_str(),
            Arc::new(ComponentEntity::new(args.model.as_str())),
        )
        .with_context(|| format!("Failed to create object {}", object))?;
    }
    for (object, owner) in &args.locate {
        node.adopt_location(object.as_str(), owner.as_str());
    }

    let listener = TcpListener::bind(&config.transport.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.transport.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        host = %node.id(),
        addr = %local_addr,
        objects = node.local_ids().len(),
        "Host listening"
    );
    print_info(
        &format!("Host {} listening on {} (Ctrl-C to stop)", node.id(), local_addr),
        global.quiet,
    );

    tokio::select! {
        result = serve(listener, node.clone()) => {
            result.context("Host server stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!(host = %node.id(), "Shutting down");
        }
    }

    Ok(())
}
