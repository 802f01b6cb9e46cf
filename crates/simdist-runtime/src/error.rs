//! Runtime error types.
//!
//! [`RuntimeError`] is the local, typed error surface. [`WireError`] is the
//! subset that crosses host boundaries inside a response frame; the caller
//! converts it back with [`WireError::into_runtime`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{HostId, ObjectId};

/// Errors that can occur while hosting, calling or migrating objects.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The batch names an object this host does not own
    #[error("object '{id}' is not owned by this host")]
    NoLocalObject { id: ObjectId },

    /// The object cannot be carried in a migration payload
    #[error("object '{id}' of type '{type_name}' is not migratable")]
    NonSerializable { id: ObjectId, type_name: String },

    /// The destination refused the batch
    #[error("migration to '{destination}' denied: {reason}")]
    MigrationDenied { destination: HostId, reason: String },

    /// RPC could not be delivered or timed out
    ///
    /// `maybe_delivered` is false only when the request certainly never
    /// reached the peer (no address, refused connection, injected fault).
    #[error("transport to '{host}' failed: {message}")]
    Transport {
        host: HostId,
        message: String,
        maybe_delivered: bool,
    },

    /// The call is only meaningful in-process at the owner
    #[error("'{method}' cannot be invoked through a remote proxy")]
    RemoteCallForbidden { method: &'static str },

    /// The called host no longer owns the object
    #[error("host no longer owns '{id}'{}", .redirect.as_ref().map(|h| format!(", try '{}'", h)).unwrap_or_default())]
    StaleOwner {
        id: ObjectId,
        redirect: Option<HostId>,
    },

    /// No location is known for the object
    #[error("object '{id}' not found")]
    ObjectNotFound { id: ObjectId },

    /// An object id is already registered locally
    #[error("object '{id}' is already registered on this host")]
    DuplicateObject { id: ObjectId },

    /// The owner failed while handling the call
    #[error("remote host '{host}' failed: {message}")]
    Remote { host: HostId, message: String },

    /// The entity does not understand the request
    #[error("'{type_name}' does not support {request}")]
    UnsupportedRequest { type_name: String, request: String },

    /// The entity rejected the request arguments
    #[error("invalid request for '{type_name}': {message}")]
    InvalidRequest { type_name: String, message: String },

    /// Entity payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// No route is known to the host
    #[error("unknown host '{0}'")]
    UnknownHost(HostId),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] simdist_config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Create a NoLocalObject error.
    pub fn no_local_object(id: impl Into<ObjectId>) -> Self {
        Self::NoLocalObject { id: id.into() }
    }

    /// Create a NonSerializable error.
    pub fn non_serializable(id: impl Into<ObjectId>, type_name: impl Into<String>) -> Self {
        Self::NonSerializable {
            id: id.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a MigrationDenied error.
    pub fn migration_denied(destination: impl Into<HostId>, reason: impl Into<String>) -> Self {
        Self::MigrationDenied {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// Create a Transport error for a request the peer may have processed.
    pub fn transport(host: impl Into<HostId>, message: impl Into<String>) -> Self {
        Self::Transport {
            host: host.into(),
            message: message.into(),
            maybe_delivered: true,
        }
    }

    /// Create a Transport error for a request that never left this host.
    pub fn unreachable(host: impl Into<HostId>, message: impl Into<String>) -> Self {
        Self::Transport {
            host: host.into(),
            message: message.into(),
            maybe_delivered: false,
        }
    }

    /// Create a StaleOwner error.
    pub fn stale_owner(id: impl Into<ObjectId>, redirect: Option<HostId>) -> Self {
        Self::StaleOwner {
            id: id.into(),
            redirect,
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(id: impl Into<ObjectId>) -> Self {
        Self::ObjectNotFound { id: id.into() }
    }

    /// Create an UnsupportedRequest error.
    pub fn unsupported(type_name: impl Into<String>, request: impl Into<String>) -> Self {
        Self::UnsupportedRequest {
            type_name: type_name.into(),
            request: request.into(),
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a Codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Whether the failure means the peer could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether the peer may have acted on the request despite the failure.
    pub fn maybe_delivered(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                maybe_delivered: true,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Error carried inside a response frame.
///
/// Only variants a caller can act on keep their shape; anything else
/// travels as `Failed` and surfaces as [`RuntimeError::Remote`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireError {
    StaleOwner {
        id: ObjectId,
        redirect: Option<HostId>,
    },
    ObjectNotFound {
        id: ObjectId,
    },
    NoLocalObject {
        id: ObjectId,
    },
    NonSerializable {
        id: ObjectId,
        type_name: String,
    },
    MigrationDenied {
        destination: HostId,
        reason: String,
    },
    Failed {
        message: String,
    },
}

impl WireError {
    /// Rebuild the local error for a response received from `host`.
    pub fn into_runtime(self, host: &HostId) -> RuntimeError {
        match self {
            Self::StaleOwner { id, redirect } => RuntimeError::StaleOwner { id, redirect },
            Self::ObjectNotFound { id } => RuntimeError::ObjectNotFound { id },
            Self::NoLocalObject { id } => RuntimeError::NoLocalObject { id },
            Self::NonSerializable { id, type_name } => {
                RuntimeError::NonSerializable { id, type_name }
            }
            Self::MigrationDenied {
                destination,
                reason,
            } => RuntimeError::MigrationDenied {
                destination,
                reason,
            },
            Self::Failed { message } => RuntimeError::Remote {
                host: host.clone(),
                message,
            },
        }
    }
}

impl From<&RuntimeError> for WireError {
    fn from(err: &RuntimeError) -> Self {
        match err {
            RuntimeError::StaleOwner { id, redirect } => Self::StaleOwner {
                id: id.clone(),
                redirect: redirect.clone(),
            },
            RuntimeError::ObjectNotFound { id } => Self::ObjectNotFound { id: id.clone() },
            RuntimeError::NoLocalObject { id } => Self::NoLocalObject { id: id.clone() },
            RuntimeError::NonSerializable { id, type_name } => Self::NonSerializable {
                id: id.clone(),
                type_name: type_name.clone(),
            },
            RuntimeError::MigrationDenied {
                destination,
                reason,
            } => Self::MigrationDenied {
                destination: destination.clone(),
                reason: reason.clone(),
            },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }
}
