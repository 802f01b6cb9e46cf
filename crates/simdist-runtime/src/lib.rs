//! simdist Runtime - Object location and live migration across hosts
//!
//! This crate keeps simulation objects reachable while they move:
//! - Per-host location registry with per-object locking
//! - Location-transparent proxies with stale-owner redirects
//! - Versioned entity codec for migratable object state
//! - Migration protocol with atomic hand-off and best-effort notification
//! - In-memory and TCP transports behind one `Transport` trait
//!
//! ## Example
//!
//! ```ignore
//! use simdist_runtime::{ComponentEntity, HostNode, MemoryTransport};
//! use simdist_config::MigrationConfig;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let h1 = Arc::new(HostNode::new("H1", transport.clone(), MigrationConfig::default()));
//! let h2 = Arc::new(HostNode::new("H2", transport.clone(), MigrationConfig::default()));
//! transport.register(h1.clone());
//! transport.register(h2.clone());
//!
//! h1.spawn_entity("pump", Arc::new(ComponentEntity::new("plant")))?;
//! h2.adopt_location("pump", "H1");
//!
//! let report = h1.migrate(vec!["pump".into()], "H2".into()).await?;
//! assert!(report.succeeded());
//! ```

pub mod component;
pub mod entity;
pub mod error;
pub mod migration;
pub mod node;
pub mod placement;
pub mod proxy;
pub mod referrer;
pub mod registry;
pub mod transport;
pub mod types;

pub use component::{ComponentEntity, ComponentState, PinnedEntity};
pub use entity::{
    DecodeFn, Entity, EntityCodec, EntityDescription, EntityEvent, EntityPayload, EntityRequest,
    EntityResponse, Mediator, Migratable,
};
pub use error::{RuntimeError, WireError};
pub use migration::{MigrationPhase, MigrationReport};
pub use node::HostNode;
pub use placement::place;
pub use proxy::EntityProxy;
pub use referrer::ObjectReferrer;
pub use registry::{IdLocks, LocationEntry, LocationRegistry};
pub use transport::{
    dispatch, serve, HostClient, HostRequest, HostResponse, HostService, MemoryTransport,
    TcpTransport, TransferItem, Transport,
};
pub use types::{HostId, Location, ObjectId, Partner};

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
