//! Per-host object location registry.
//!
//! Maps every known object id to either the live local entity or the host
//! believed to own it. Mutations that belong to the migration protocol
//! (local commit, incoming receive, incoming location updates) run while
//! holding the affected ids' locks from [`LocationRegistry::lock`].
//!
//! An id is *in doubt* when it was handed to a destination whose answer was
//! lost. The entity is kept but no longer served locally; the entry reports
//! the destination as owner until [`HostNode::resolve_in_doubt`] or an
//! incoming location update settles it.
//!
//! [`HostNode::resolve_in_doubt`]: crate::HostNode::resolve_in_doubt

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::entity::Entity;
use crate::error::RuntimeError;
use crate::types::{HostId, Location, ObjectId};

/// One registry entry.
#[derive(Clone)]
pub enum LocationEntry {
    Local(Arc<dyn Entity>),
    Remote(HostId),
    InDoubt {
        entity: Arc<dyn Entity>,
        destination: HostId,
    },
}

impl LocationEntry {
    pub fn location(&self) -> Location {
        match self {
            Self::Local(_) => Location::Local,
            Self::Remote(host) | Self::InDoubt { destination: host, .. } => {
                Location::Remote(host.clone())
            }
        }
    }
}

impl fmt::Debug for LocationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(entity) => f.debug_tuple("Local").field(&entity.type_name()).finish(),
            Self::Remote(host) => f.debug_tuple("Remote").field(host).finish(),
            Self::InDoubt {
                entity,
                destination,
            } => f
                .debug_struct("InDoubt")
                .field("type_name", &entity.type_name())
                .field("destination", destination)
                .finish(),
        }
    }
}

/// Guards over a set of object ids, released on drop.
pub struct IdLocks {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Object id → location table for one host.
#[derive(Default)]
pub struct LocationRegistry {
    entries: DashMap<ObjectId, LocationEntry>,
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a locally owned entity.
    pub fn register(&self, id: ObjectId, entity: Arc<dyn Entity>) -> Result<(), RuntimeError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                if matches!(occupied.get(), LocationEntry::Local(_)) {
                    return Err(RuntimeError::DuplicateObject {
                        id: occupied.key().clone(),
                    });
                }
                debug!(id = %occupied.key(), "Registering local object over remote entry");
                occupied.insert(LocationEntry::Local(entity));
            }
            Entry::Vacant(vacant) => {
                debug!(id = %vacant.key(), "Registering local object");
                vacant.insert(LocationEntry::Local(entity));
            }
        }
        Ok(())
    }

    /// Point an id at a remote owner, returning the previous entry.
    pub fn set_remote(&self, id: ObjectId, host: HostId) -> Option<LocationEntry> {
        debug!(id = %id, owner = %host, "Recording remote location");
        self.entries.insert(id, LocationEntry::Remote(host))
    }

    /// Park a local entity while the outcome of its hand-off is unknown.
    ///
    /// Returns false, changing nothing, unless the id is currently local.
    pub fn mark_in_doubt(&self, id: &ObjectId, destination: HostId) -> bool {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return false;
        };
        let LocationEntry::Local(entity) = entry.value() else {
            return false;
        };
        debug!(id = %id, destination = %destination, "Hand-off outcome unknown");
        let entity = entity.clone();
        *entry = LocationEntry::InDoubt {
            entity,
            destination,
        };
        true
    }

    /// Take an in-doubt entity back as locally owned.
    pub fn restore_local(&self, id: &ObjectId) -> bool {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return false;
        };
        let LocationEntry::InDoubt { entity, .. } = entry.value() else {
            return false;
        };
        debug!(id = %id, "Hand-off did not happen, object stays local");
        let entity = entity.clone();
        *entry = LocationEntry::Local(entity);
        true
    }

    /// In-doubt ids with the destination each was sent to, sorted.
    pub fn in_doubt(&self) -> Vec<(ObjectId, HostId)> {
        let mut pending: Vec<(ObjectId, HostId)> = self
            .entries
            .iter()
            .filter_map(|e| match e.value() {
                LocationEntry::InDoubt { destination, .. } => {
                    Some((e.key().clone(), destination.clone()))
                }
                _ => None,
            })
            .collect();
        pending.sort();
        pending
    }

    pub fn lookup(&self, id: &ObjectId) -> Option<LocationEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn location(&self, id: &ObjectId) -> Option<Location> {
        self.entries.get(id).map(|e| e.location())
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn unregister(&self, id: &ObjectId) -> Option<LocationEntry> {
        let removed = self.entries.remove(id).map(|(_, entry)| entry);
        if removed.is_some() {
            debug!(id = %id, "Unregistered object");
        }
        removed
    }

    /// Locally owned ids, sorted.
    pub fn local_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), LocationEntry::Local(_)))
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn local_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.value(), LocationEntry::Local(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered view of every entry's location.
    pub fn snapshot(&self) -> BTreeMap<ObjectId, Location> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().location()))
            .collect()
    }

    /// Acquire the per-id locks for a set of ids.
    ///
    /// Ids are locked in sorted order with duplicates removed, so two
    /// callers with overlapping sets cannot deadlock each other.
    pub async fn lock(&self, ids: &[ObjectId]) -> IdLocks {
        let mut sorted: Vec<&ObjectId> = ids.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            // Clone the mutex out so no map guard is held across the await.
            let mutex = self
                .locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }
        IdLocks { _guards: guards }
    }
}

impl fmt::Debug for LocationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationRegistry")
            .field("entries", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentEntity;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn entity() -> Arc<dyn Entity> {
        Arc::new(ComponentEntity::new("m"))
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = LocationRegistry::new();
        let id = ObjectId::new("a");

        assert!(registry.lookup(&id).is_none());
        registry.register(id.clone(), entity()).unwrap();
        assert_eq!(registry.location(&id), Some(Location::Local));
        assert_eq!(registry.local_ids(), vec![id.clone()]);

        assert!(registry.unregister(&id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_local_registration_fails() {
        let registry = LocationRegistry::new();
        registry.register("a".into(), entity()).unwrap();
        let err = registry.register("a".into(), entity()).unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateObject { .. }));
    }

    #[test]
    fn test_local_registration_replaces_remote() {
        let registry = LocationRegistry::new();
        registry.set_remote("a".into(), HostId::new("H2"));
        registry.register("a".into(), entity()).unwrap();
        assert_eq!(registry.location(&ObjectId::new("a")), Some(Location::Local));
        assert_eq!(registry.local_count(), 1);
    }

    #[test]
    fn test_in_doubt_entry_is_not_local() {
        let registry = LocationRegistry::new();
        let id = ObjectId::new("a");
        assert!(!registry.mark_in_doubt(&id, HostId::new("H2")));

        registry.register(id.clone(), entity()).unwrap();
        assert!(registry.mark_in_doubt(&id, HostId::new("H2")));
        assert_eq!(registry.location(&id), Some(Location::Remote(HostId::new("H2"))));
        assert!(registry.local_ids().is_empty());
        assert_eq!(registry.local_count(), 0);
        assert_eq!(registry.in_doubt(), vec![(id.clone(), HostId::new("H2"))]);

        // a second mark is refused, the entry is no longer local
        assert!(!registry.mark_in_doubt(&id, HostId::new("H3")));

        assert!(registry.restore_local(&id));
        assert_eq!(registry.location(&id), Some(Location::Local));
        assert!(registry.in_doubt().is_empty());
        assert!(!registry.restore_local(&id));
    }

    #[test]
    fn test_registration_settles_in_doubt_entry() {
        let registry = LocationRegistry::new();
        registry.register("a".into(), entity()).unwrap();
        registry.mark_in_doubt(&"a".into(), HostId::new("H2"));

        registry.register("a".into(), entity()).unwrap();
        assert_eq!(registry.location(&ObjectId::new("a")), Some(Location::Local));
        assert!(registry.in_doubt().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_locks_serialize() {
        let registry = Arc::new(LocationRegistry::new());
        let ids: Vec<ObjectId> = vec!["b".into(), "a".into(), "a".into()];
        let held = registry.lock(&ids).await;

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _locks = registry.lock(&[ObjectId::new("a")]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // disjoint ids are not blocked
        let _other = registry.lock(&[ObjectId::new("c")]).await;

        drop(held);
        contender.await.unwrap();
    }
}
