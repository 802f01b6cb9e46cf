//! A host process: registry, partners, codec and RPC client in one place.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entity::{Entity, EntityCodec, EntityRequest, EntityResponse};
use crate::error::RuntimeError;
use crate::proxy::EntityProxy;
use crate::referrer::ObjectReferrer;
use crate::registry::{LocationEntry, LocationRegistry};
use crate::transport::{HostClient, HostService, TransferItem, Transport};
use crate::types::{HostId, Location, ObjectId, Partner};
use simdist_config::MigrationConfig;

/// One host of a distributed simulation.
///
/// Owns the objects registered locally, remembers where the others live and
/// answers the host RPC surface through its [`HostService`] impl.
pub struct HostNode {
    pub(crate) id: HostId,
    pub(crate) registry: LocationRegistry,
    pub(crate) referrer: ObjectReferrer,
    pub(crate) codec: EntityCodec,
    pub(crate) client: HostClient,
    pub(crate) config: MigrationConfig,
}

impl HostNode {
    pub fn new(id: impl Into<HostId>, transport: Arc<dyn Transport>, config: MigrationConfig) -> Self {
        Self {
            id: id.into(),
            registry: LocationRegistry::new(),
            referrer: ObjectReferrer::new(config.partner_window()),
            codec: EntityCodec::builtin(),
            client: HostClient::new(transport, config.rpc_timeout()),
            config,
        }
    }

    /// Replace the codec used to decode incoming migrations.
    pub fn with_codec(mut self, codec: EntityCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    pub fn referrer(&self) -> &ObjectReferrer {
        &self.referrer
    }

    pub fn client(&self) -> &HostClient {
        &self.client
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Register a newly created object as owned by this host.
    pub fn spawn_entity(
        &self,
        id: impl Into<ObjectId>,
        entity: Arc<dyn Entity>,
    ) -> Result<(), RuntimeError> {
        let id = id.into();
        debug!(host = %self.id, id = %id, kind = entity.type_name(), "Spawning entity");
        self.registry.register(id, entity)
    }

    /// Record where an object created elsewhere lives.
    ///
    /// Ignored for this host's own id and for objects already owned here.
    pub fn adopt_location(&self, id: impl Into<ObjectId>, owner: impl Into<HostId>) {
        let (id, owner) = (id.into(), owner.into());
        if owner == self.id {
            return;
        }
        if matches!(self.registry.location(&id), Some(Location::Local)) {
            warn!(host = %self.id, id = %id, owner = %owner, "Not adopting remote location for a local object");
            return;
        }
        self.registry.set_remote(id, owner);
    }

    /// Permanently remove a locally owned object.
    pub async fn destroy(&self, id: &ObjectId) -> Result<Arc<dyn Entity>, RuntimeError> {
        let _lock = self.registry.lock(std::slice::from_ref(id)).await;
        match self.registry.lookup(id) {
            Some(LocationEntry::Local(entity)) => {
                self.registry.unregister(id);
                self.referrer.forget(id);
                debug!(host = %self.id, id = %id, "Destroyed entity");
                Ok(entity)
            }
            _ => Err(RuntimeError::no_local_object(id)),
        }
    }

    /// Local reference to an object owned here.
    pub fn entity(&self, id: &ObjectId) -> Option<Arc<dyn Entity>> {
        match self.registry.lookup(id)? {
            LocationEntry::Local(entity) => Some(entity),
            LocationEntry::Remote(_) | LocationEntry::InDoubt { .. } => None,
        }
    }

    pub fn location(&self, id: &ObjectId) -> Option<Location> {
        self.registry.location(id)
    }

    pub fn local_ids(&self) -> Vec<ObjectId> {
        self.registry.local_ids()
    }

    /// Handle to `id` that routes calls to wherever it lives.
    pub fn proxy(self: &Arc<Self>, id: impl Into<ObjectId>) -> EntityProxy {
        EntityProxy::new(self.clone(), id.into())
    }

    /// Run a request against an object owned here.
    ///
    /// Waits for any migration of the object to finish first, so a call
    /// never lands on state that has already been shipped. A call on an
    /// in-doubt object first asks the destination who owns it.
    pub async fn invoke_local(
        &self,
        id: &ObjectId,
        caller: Option<Partner>,
        request: EntityRequest,
    ) -> Result<EntityResponse, RuntimeError> {
        let _lock = self.registry.lock(std::slice::from_ref(id)).await;
        match self.registry.lookup(id) {
            Some(LocationEntry::Local(entity)) => {
                if let Some(caller) = caller {
                    self.referrer.record(id, caller);
                }
                entity.handle(request)
            }
            Some(LocationEntry::Remote(owner)) => Err(RuntimeError::stale_owner(id, Some(owner))),
            Some(LocationEntry::InDoubt {
                entity,
                destination,
            }) => match self.settle_in_doubt(id, &destination).await {
                Some(Location::Local) => {
                    if let Some(caller) = caller {
                        self.referrer.record(id, caller);
                    }
                    entity.handle(request)
                }
                Some(Location::Remote(owner)) => Err(RuntimeError::stale_owner(id, Some(owner))),
                None => Err(RuntimeError::stale_owner(id, Some(destination))),
            },
            None => Err(RuntimeError::object_not_found(id)),
        }
    }

    /// Point a stale entry at the host named in a redirect.
    pub(crate) async fn follow_redirect(&self, id: &ObjectId, owner: HostId) {
        let _lock = self.registry.lock(std::slice::from_ref(id)).await;
        match self.registry.lookup(id) {
            Some(LocationEntry::Local(_)) => {}
            Some(LocationEntry::InDoubt { destination, .. }) => {
                self.settle_in_doubt(id, &destination).await;
            }
            Some(LocationEntry::Remote(current)) if current == owner => {}
            _ if owner == self.id => {}
            _ => {
                debug!(host = %self.id, id = %id, owner = %owner, "Following redirect");
                self.registry.set_remote(id.clone(), owner);
            }
        }
    }
}

impl std::fmt::Debug for HostNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostNode")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostService for HostNode {
    fn host_id(&self) -> &HostId {
        &self.id
    }

    async fn migrate_to(
        &self,
        ids: Vec<ObjectId>,
        destination: HostId,
    ) -> Result<bool, RuntimeError> {
        Ok(self.migrate(ids, destination).await?.succeeded())
    }

    async fn receive(&self, from: HostId, batch: Vec<TransferItem>) -> Result<bool, RuntimeError> {
        self.accept_batch(from, batch).await
    }

    async fn update_object_locations(
        &self,
        ids: Vec<ObjectId>,
        owner: HostId,
    ) -> Result<(), RuntimeError> {
        self.apply_location_update(ids, owner).await
    }

    async fn location_of_object(&self, id: ObjectId) -> Result<HostId, RuntimeError> {
        // an in-flight receive or commit answers first
        let _lock = self.registry.lock(std::slice::from_ref(&id)).await;
        match self.registry.location(&id) {
            Some(location) => Ok(location.host(&self.id).clone()),
            None => Err(RuntimeError::object_not_found(id)),
        }
    }

    async fn invoke(
        &self,
        id: ObjectId,
        caller: Option<Partner>,
        request: EntityRequest,
    ) -> Result<EntityResponse, RuntimeError> {
        self.invoke_local(&id, caller, request).await
    }
}
