//! Built-in entity types.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::entity::{
    Entity, EntityDescription, EntityEvent, EntityRequest, EntityResponse, Mediator, Migratable,
};
use crate::error::RuntimeError;

/// Transportable state of a [`ComponentEntity`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    /// Model the component belongs to
    pub model: String,
    /// Local simulation time
    pub time: f64,
    /// Named state variables
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// A simulation component with a clock and named variables.
///
/// Variable writes and time advances are published to the mediator, so
/// co-located observers can follow the component without polling.
#[derive(Debug)]
pub struct ComponentEntity {
    state: RwLock<ComponentState>,
    mediator: Mediator,
}

impl ComponentEntity {
    pub const KIND: &'static str = "component";
    pub const VERSION: u32 = 1;

    pub fn new(model: impl Into<String>) -> Self {
        Self::from_state(ComponentState {
            model: model.into(),
            ..Default::default()
        })
    }

    pub fn from_state(state: ComponentState) -> Self {
        Self {
            state: RwLock::new(state),
            mediator: Mediator::new(),
        }
    }

    /// Set a variable before the component is shared.
    pub fn with_variable(self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.state.write().variables.insert(name.into(), value);
        self
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ComponentState {
        self.state.read().clone()
    }

    pub(crate) fn decode(state: serde_json::Value) -> Result<Arc<dyn Entity>, RuntimeError> {
        let state: ComponentState = serde_json::from_value(state)?;
        Ok(Arc::new(Self::from_state(state)))
    }
}

impl Entity for ComponentEntity {
    fn type_name(&self) -> &'static str {
        "ComponentEntity"
    }

    fn handle(&self, request: EntityRequest) -> Result<EntityResponse, RuntimeError> {
        match request {
            EntityRequest::Describe => {
                let state = self.state.read();
                Ok(EntityResponse::Description(EntityDescription {
                    type_name: self.type_name().to_string(),
                    time: state.time,
                    variables: state.variables.keys().cloned().collect(),
                    migratable: true,
                }))
            }
            EntityRequest::Time => Ok(EntityResponse::Time(self.state.read().time)),
            EntityRequest::Advance { to } => {
                {
                    let mut state = self.state.write();
                    if !to.is_finite() || to < state.time {
                        return Err(RuntimeError::invalid_request(
                            self.type_name(),
                            format!("cannot advance from {} to {}", state.time, to),
                        ));
                    }
                    state.time = to;
                }
                self.mediator.publish(EntityEvent::TimeAdvanced { time: to });
                Ok(EntityResponse::Time(to))
            }
            EntityRequest::Get { name } => Ok(EntityResponse::Value(
                self.state.read().variables.get(&name).cloned(),
            )),
            EntityRequest::Set { name, value } => {
                self.state
                    .write()
                    .variables
                    .insert(name.clone(), value.clone());
                self.mediator
                    .publish(EntityEvent::VariableChanged { name, value });
                Ok(EntityResponse::Unit)
            }
            EntityRequest::Call { method, .. } => {
                Err(RuntimeError::unsupported(self.type_name(), method))
            }
        }
    }

    fn mediator(&self) -> Mediator {
        self.mediator.clone()
    }

    fn as_migratable(&self) -> Option<&dyn Migratable> {
        Some(self)
    }
}

impl Migratable for ComponentEntity {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn encode_state(&self) -> Result<serde_json::Value, RuntimeError> {
        Ok(serde_json::to_value(&*self.state.read())?)
    }
}

/// Wraps an entity that must stay on its host.
///
/// Behaves like the inner entity for calls but has no migratable view, so
/// any migration batch containing it is refused during collection.
pub struct PinnedEntity {
    inner: Arc<dyn Entity>,
}

impl PinnedEntity {
    pub fn new(inner: Arc<dyn Entity>) -> Self {
        Self { inner }
    }
}

impl Entity for PinnedEntity {
    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    fn handle(&self, request: EntityRequest) -> Result<EntityResponse, RuntimeError> {
        match self.inner.handle(request)? {
            EntityResponse::Description(mut description) => {
                description.migratable = false;
                Ok(EntityResponse::Description(description))
            }
            other => Ok(other),
        }
    }

    fn mediator(&self) -> Mediator {
        self.inner.mediator()
    }
}
