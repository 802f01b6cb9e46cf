//! Host-to-host RPC.
//!
//! [`Transport`] moves one [`HostRequest`] to a host and brings back its
//! [`HostResponse`]. [`HostClient`] layers the typed call surface and the
//! timeout on top, and [`dispatch`] is the server-side counterpart that feeds
//! a request into a [`HostService`].

mod memory;
mod tcp;

pub use memory::MemoryTransport;
pub use tcp::{serve, TcpTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::entity::{EntityPayload, EntityRequest, EntityResponse};
use crate::error::{RuntimeError, WireError};
use crate::types::{HostId, ObjectId, Partner};

/// One migrated object inside a `receive` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferItem {
    pub id: ObjectId,
    pub payload: EntityPayload,
    #[serde(default)]
    pub partners: Vec<Partner>,
}

/// Request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HostRequest {
    MigrateTo {
        ids: Vec<ObjectId>,
        destination: HostId,
    },
    Receive {
        from: HostId,
        batch: Vec<TransferItem>,
    },
    UpdateObjectLocations {
        ids: Vec<ObjectId>,
        owner: HostId,
    },
    LocationOfObject {
        id: ObjectId,
    },
    Invoke {
        id: ObjectId,
        caller: Option<Partner>,
        request: EntityRequest,
    },
}

impl HostRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MigrateTo { .. } => "migrate_to",
            Self::Receive { .. } => "receive",
            Self::UpdateObjectLocations { .. } => "update_object_locations",
            Self::LocationOfObject { .. } => "location_of_object",
            Self::Invoke { .. } => "invoke",
        }
    }
}

/// Response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum HostResponse {
    Migrated(bool),
    Received(bool),
    Updated,
    Location(HostId),
    Invoked(EntityResponse),
    Error(WireError),
}

/// Delivers requests to hosts.
///
/// Implementations report every delivery fault as
/// [`RuntimeError::Transport`], built with [`RuntimeError::unreachable`]
/// when the request never left this host; owner-side failures come back as
/// [`HostResponse::Error`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request to `host` and wait for the response.
    async fn call(&self, host: &HostId, request: HostRequest)
        -> Result<HostResponse, RuntimeError>;
}

/// Server side of the RPC surface.
#[async_trait]
pub trait HostService: Send + Sync {
    /// Id of the host this service answers for.
    fn host_id(&self) -> &HostId;

    /// Move locally owned objects to `destination`.
    async fn migrate_to(
        &self,
        ids: Vec<ObjectId>,
        destination: HostId,
    ) -> Result<bool, RuntimeError>;

    /// Accept or refuse an incoming batch.
    async fn receive(&self, from: HostId, batch: Vec<TransferItem>) -> Result<bool, RuntimeError>;

    /// Record `owner` as the new location of `ids`.
    async fn update_object_locations(
        &self,
        ids: Vec<ObjectId>,
        owner: HostId,
    ) -> Result<(), RuntimeError>;

    /// Host this service believes owns `id`.
    async fn location_of_object(&self, id: ObjectId) -> Result<HostId, RuntimeError>;

    /// Run a request against a locally owned object.
    async fn invoke(
        &self,
        id: ObjectId,
        caller: Option<Partner>,
        request: EntityRequest,
    ) -> Result<EntityResponse, RuntimeError>;
}

/// Run a request frame against a service.
pub async fn dispatch(service: &dyn HostService, request: HostRequest) -> HostResponse {
    trace!(host = %service.host_id(), call = request.name(), "Dispatching request");
    let result = match request {
        HostRequest::MigrateTo { ids, destination } => service
            .migrate_to(ids, destination)
            .await
            .map(HostResponse::Migrated),
        HostRequest::Receive { from, batch } => service
            .receive(from, batch)
            .await
            .map(HostResponse::Received),
        HostRequest::UpdateObjectLocations { ids, owner } => service
            .update_object_locations(ids, owner)
            .await
            .map(|()| HostResponse::Updated),
        HostRequest::LocationOfObject { id } => service
            .location_of_object(id)
            .await
            .map(HostResponse::Location),
        HostRequest::Invoke {
            id,
            caller,
            request,
        } => service
            .invoke(id, caller, request)
            .await
            .map(HostResponse::Invoked),
    };
    result.unwrap_or_else(|e| HostResponse::Error(WireError::from(&e)))
}

/// Typed, timeout-bounded client for the RPC surface.
///
/// A timeout is reported as a transport failure whose request may have
/// been delivered.
#[derive(Clone)]
pub struct HostClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl HostClient {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call(&self, host: &HostId, request: HostRequest) -> Result<HostResponse, RuntimeError> {
        let name = request.name();
        match tokio::time::timeout(self.timeout, self.transport.call(host, request)).await {
            Ok(Ok(HostResponse::Error(e))) => Err(e.into_runtime(host)),
            Ok(result) => result,
            Err(_) => Err(RuntimeError::transport(
                host,
                format!("{} timed out after {:?}", name, self.timeout),
            )),
        }
    }

    fn unexpected(host: &HostId, call: &str, response: HostResponse) -> RuntimeError {
        RuntimeError::transport(host, format!("unexpected response to {}: {:?}", call, response))
    }

    pub async fn migrate_to(
        &self,
        host: &HostId,
        ids: Vec<ObjectId>,
        destination: HostId,
    ) -> Result<bool, RuntimeError> {
        match self
            .call(host, HostRequest::MigrateTo { ids, destination })
            .await?
        {
            HostResponse::Migrated(ok) => Ok(ok),
            other => Err(Self::unexpected(host, "migrate_to", other)),
        }
    }

    pub async fn receive(
        &self,
        host: &HostId,
        from: HostId,
        batch: Vec<TransferItem>,
    ) -> Result<bool, RuntimeError> {
        match self.call(host, HostRequest::Receive { from, batch }).await? {
            HostResponse::Received(ok) => Ok(ok),
            other => Err(Self::unexpected(host, "receive", other)),
        }
    }

    pub async fn update_object_locations(
        &self,
        host: &HostId,
        ids: Vec<ObjectId>,
        owner: HostId,
    ) -> Result<(), RuntimeError> {
        match self
            .call(host, HostRequest::UpdateObjectLocations { ids, owner })
            .await?
        {
            HostResponse::Updated => Ok(()),
            other => Err(Self::unexpected(host, "update_object_locations", other)),
        }
    }

    pub async fn location_of_object(
        &self,
        host: &HostId,
        id: ObjectId,
    ) -> Result<HostId, RuntimeError> {
        match self.call(host, HostRequest::LocationOfObject { id }).await? {
            HostResponse::Location(owner) => Ok(owner),
            other => Err(Self::unexpected(host, "location_of_object", other)),
        }
    }

    pub async fn invoke(
        &self,
        host: &HostId,
        id: ObjectId,
        caller: Option<Partner>,
        request: EntityRequest,
    ) -> Result<EntityResponse, RuntimeError> {
        match self
            .call(
                host,
                HostRequest::Invoke {
                    id,
                    caller,
                    request,
                },
            )
            .await?
        {
            HostResponse::Invoked(response) => Ok(response),
            other => Err(Self::unexpected(host, "invoke", other)),
        }
    }
}

impl std::fmt::Debug for HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
