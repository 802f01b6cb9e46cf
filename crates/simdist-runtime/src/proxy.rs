//! Location-transparent handle to an object.

use std::sync::Arc;
use tracing::debug;

use crate::entity::{EntityDescription, EntityRequest, EntityResponse, Mediator};
use crate::error::RuntimeError;
use crate::node::HostNode;
use crate::types::{Location, ObjectId, Partner};

/// Calls an object wherever it currently lives.
///
/// Each call is one round trip to the owner known to the local registry.
/// If that host answers with a stale-owner redirect, the local entry is
/// corrected and the call retried, up to `max_redirects` times.
#[derive(Debug, Clone)]
pub struct EntityProxy {
    node: Arc<HostNode>,
    id: ObjectId,
    caller: Option<ObjectId>,
}

impl EntityProxy {
    pub(crate) fn new(node: Arc<HostNode>, id: ObjectId) -> Self {
        Self {
            node,
            id,
            caller: None,
        }
    }

    /// Attribute calls to a calling object instead of the host.
    pub fn with_caller(mut self, caller: impl Into<ObjectId>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Location as currently known to the local registry.
    pub fn location(&self) -> Option<Location> {
        self.node.location(&self.id)
    }

    /// Observer handles only exist at the owner, so a proxy never has one.
    pub fn mediator(&self) -> Result<Mediator, RuntimeError> {
        Err(RuntimeError::RemoteCallForbidden { method: "mediator" })
    }

    fn partner(&self) -> Partner {
        match &self.caller {
            Some(object) => Partner::Object(object.clone()),
            None => Partner::Host(self.node.id().clone()),
        }
    }

    /// Send a request to the owner.
    pub async fn call(&self, request: EntityRequest) -> Result<EntityResponse, RuntimeError> {
        let max_redirects = self.node.config().max_redirects;
        let mut redirects = 0;
        loop {
            let result = match self.node.location(&self.id) {
                Some(Location::Local) => {
                    let caller = self.caller.clone().map(Partner::Object);
                    self.node
                        .invoke_local(&self.id, caller, request.clone())
                        .await
                }
                Some(Location::Remote(owner)) => {
                    self.node
                        .client()
                        .invoke(&owner, self.id.clone(), Some(self.partner()), request.clone())
                        .await
                }
                None => return Err(RuntimeError::object_not_found(&self.id)),
            };

            match result {
                Err(RuntimeError::StaleOwner {
                    id,
                    redirect: Some(owner),
                }) if redirects < max_redirects => {
                    redirects += 1;
                    debug!(id = %id, owner = %owner, redirects, "Proxy redirected");
                    self.node.follow_redirect(&id, owner).await;
                }
                Err(RuntimeError::StaleOwner { id, redirect: None }) => {
                    return Err(RuntimeError::object_not_found(id));
                }
                other => return other,
            }
        }
    }

    pub async fn describe(&self) -> Result<EntityDescription, RuntimeError> {
        match self.call(EntityRequest::Describe).await? {
            EntityResponse::Description(description) => Ok(description),
            other => Err(unexpected("describe", other)),
        }
    }

    pub async fn time(&self) -> Result<f64, RuntimeError> {
        match self.call(EntityRequest::Time).await? {
            EntityResponse::Time(time) => Ok(time),
            other => Err(unexpected("time", other)),
        }
    }

    pub async fn advance(&self, to: f64) -> Result<f64, RuntimeError> {
        match self.call(EntityRequest::Advance { to }).await? {
            EntityResponse::Time(time) => Ok(time),
            other => Err(unexpected("advance", other)),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<serde_json::Value>, RuntimeError> {
        match self
            .call(EntityRequest::Get {
                name: name.to_string(),
            })
            .await?
        {
            EntityResponse::Value(value) => Ok(value),
            other => Err(unexpected("get", other)),
        }
    }

    pub async fn set(&self, name: &str, value: serde_json::Value) -> Result<(), RuntimeError> {
        match self
            .call(EntityRequest::Set {
                name: name.to_string(),
                value,
            })
            .await?
        {
            EntityResponse::Unit => Ok(()),
            other => Err(unexpected("set", other)),
        }
    }
}

fn unexpected(op: &str, response: EntityResponse) -> RuntimeError {
    RuntimeError::codec(format!("unexpected response to {}: {:?}", op, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentEntity;
    use crate::transport::MemoryTransport;
    use pretty_assertions::assert_eq;
    use simdist_config::MigrationConfig;

    #[tokio::test]
    async fn test_local_proxy_calls_entity() {
        let node = Arc::new(HostNode::new(
            "H1",
            Arc::new(MemoryTransport::new()),
            MigrationConfig::default(),
        ));
        node.spawn_entity("pump", Arc::new(ComponentEntity::new("plant")))
            .unwrap();

        let proxy = node.proxy("pump");
        proxy.set("rate", serde_json::json!(4)).await.unwrap();
        assert_eq!(proxy.get("rate").await.unwrap(), Some(serde_json::json!(4)));
        assert_eq!(proxy.advance(2.0).await.unwrap(), 2.0);
        assert_eq!(proxy.describe().await.unwrap().variables, vec!["rate"]);
    }

    #[tokio::test]
    async fn test_mediator_is_forbidden_even_locally() {
        let node = Arc::new(HostNode::new(
            "H1",
            Arc::new(MemoryTransport::new()),
            MigrationConfig::default(),
        ));
        node.spawn_entity("pump", Arc::new(ComponentEntity::new("plant")))
            .unwrap();

        let err = node.proxy("pump").mediator().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::RemoteCallForbidden { method: "mediator" }
        ));
    }

    #[tokio::test]
    async fn test_unknown_object() {
        let node = Arc::new(HostNode::new(
            "H1",
            Arc::new(MemoryTransport::new()),
            MigrationConfig::default(),
        ));
        let err = node.proxy("nothing").time().await.unwrap_err();
        assert!(matches!(err, RuntimeError::ObjectNotFound { .. }));
    }
}
