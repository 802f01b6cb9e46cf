//! Entity traits and the versioned migration codec.
//!
//! An [`Entity`] is a live simulation object hosted by exactly one host.
//! Remote callers reach it only through [`EntityRequest`]s, which are the
//! subset of its interface that is meaningful across a process boundary.
//! Entities that can move between hosts also implement [`Migratable`] and
//! have a decoder registered in the [`EntityCodec`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::RuntimeError;
use crate::types::ObjectId;

/// Buffered events per mediator before slow subscribers start lagging.
const MEDIATOR_CAPACITY: usize = 64;

/// A remotely invocable request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EntityRequest {
    /// Type and current state summary
    Describe,
    /// Current simulation time
    Time,
    /// Advance simulation time
    Advance { to: f64 },
    /// Read a named variable
    Get { name: String },
    /// Write a named variable
    Set {
        name: String,
        value: serde_json::Value,
    },
    /// Application-defined call
    Call {
        method: String,
        #[serde(default)]
        args: serde_json::Value,
    },
}

impl EntityRequest {
    /// Short operation name for logs and errors.
    pub fn op(&self) -> &str {
        match self {
            Self::Describe => "describe",
            Self::Time => "time",
            Self::Advance { .. } => "advance",
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Call { method, .. } => method,
        }
    }
}

/// Result of an [`EntityRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntityResponse {
    Unit,
    Time(f64),
    Value(Option<serde_json::Value>),
    Description(EntityDescription),
    Json(serde_json::Value),
}

/// Summary returned by [`EntityRequest::Describe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub type_name: String,
    pub time: f64,
    pub variables: Vec<String>,
    pub migratable: bool,
}

/// In-process event published by an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    TimeAdvanced { time: f64 },
    VariableChanged {
        name: String,
        value: serde_json::Value,
    },
}

/// In-process observer handle for an entity.
///
/// Only valid at the owning host; proxies refuse to hand one out.
#[derive(Debug, Clone)]
pub struct Mediator {
    events: broadcast::Sender<EntityEvent>,
}

impl Mediator {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(MEDIATOR_CAPACITY);
        Self { events }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }

    /// Publish an event, returning how many subscribers saw it.
    pub fn publish(&self, event: EntityEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

/// A live simulation object.
pub trait Entity: Send + Sync {
    /// Human-readable type name.
    fn type_name(&self) -> &'static str;

    /// Handle a remotely invocable request.
    fn handle(&self, request: EntityRequest) -> Result<EntityResponse, RuntimeError>;

    /// Local observer handle.
    fn mediator(&self) -> Mediator;

    /// Migratable view of this entity, if it can be transported.
    fn as_migratable(&self) -> Option<&dyn Migratable> {
        None
    }
}

/// An entity whose state can be carried to another host.
pub trait Migratable: Entity {
    /// Codec kind tag.
    fn kind(&self) -> &'static str;

    /// State format version.
    fn version(&self) -> u32;

    /// Snapshot of the state to transport.
    fn encode_state(&self) -> Result<serde_json::Value, RuntimeError>;
}

/// Serialized entity inside a migration batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub kind: String,
    pub version: u32,
    pub state: serde_json::Value,
}

/// Rebuild an entity from its state.
pub type DecodeFn = fn(serde_json::Value) -> Result<Arc<dyn Entity>, RuntimeError>;

#[derive(Clone, Copy)]
struct Decoder {
    version: u32,
    decode: DecodeFn,
}

/// Table of decoders for the migratable entity kinds a host accepts.
#[derive(Clone)]
pub struct EntityCodec {
    decoders: HashMap<String, Decoder>,
}

impl EntityCodec {
    /// Codec with no registered kinds.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Codec with the built-in entity kinds.
    pub fn builtin() -> Self {
        let mut codec = Self::empty();
        codec.register(
            crate::component::ComponentEntity::KIND,
            crate::component::ComponentEntity::VERSION,
            crate::component::ComponentEntity::decode,
        );
        codec
    }

    /// Register (or replace) the decoder for a kind.
    pub fn register(&mut self, kind: impl Into<String>, version: u32, decode: DecodeFn) {
        self.decoders
            .insert(kind.into(), Decoder { version, decode });
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Encode an entity for transport.
    pub fn encode(&self, id: &ObjectId, entity: &dyn Entity) -> Result<EntityPayload, RuntimeError> {
        let migratable = entity
            .as_migratable()
            .ok_or_else(|| RuntimeError::non_serializable(id, entity.type_name()))?;
        Ok(EntityPayload {
            kind: migratable.kind().to_string(),
            version: migratable.version(),
            state: migratable.encode_state()?,
        })
    }

    /// Decode a payload, refusing unknown kinds and version mismatches.
    pub fn decode(&self, payload: EntityPayload) -> Result<Arc<dyn Entity>, RuntimeError> {
        let decoder = self
            .decoders
            .get(&payload.kind)
            .ok_or_else(|| RuntimeError::codec(format!("unknown entity kind '{}'", payload.kind)))?;
        if decoder.version != payload.version {
            return Err(RuntimeError::codec(format!(
                "'{}' payload version {} does not match supported version {}",
                payload.kind, payload.version, decoder.version
            )));
        }
        (decoder.decode)(payload.state)
    }
}

impl Default for EntityCodec {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for EntityCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCodec")
            .field("kinds", &self.kinds())
            .finish()
    }
}
