//! Live object migration.
//!
//! An outgoing migration walks `Collecting → Transmitting → Committing →
//! Done`, or ends in `Aborted`. Nothing on the source changes until the
//! destination has accepted the batch; after that the transfer is final and
//! peer notification is best effort, backed by stale-owner redirects.
//!
//! When the acknowledgement is lost after the batch may have been
//! delivered, the source asks the destination who owns the objects before
//! deciding. If it cannot find out, the objects are parked in doubt: kept,
//! but no longer served locally, until a later query settles them.
//!
//! ```ignore
//! let report = h1.migrate(vec!["pump".into()], "H2".into()).await?;
//! assert!(report.succeeded());
//! for host in &report.unreachable {
//!     // will re-resolve through a redirect on its next call
//! }
//! ```

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::node::HostNode;
use crate::registry::LocationEntry;
use crate::transport::TransferItem;
use crate::types::{HostId, Location, ObjectId, Partner};

/// Where an outgoing migration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    Collecting,
    Transmitting,
    Committing,
    Done,
    Aborted,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Transmitting => "transmitting",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of one call to [`HostNode::migrate`].
#[derive(Debug)]
pub struct MigrationReport {
    pub source: HostId,
    pub destination: HostId,
    pub ids: Vec<ObjectId>,
    pub phase: MigrationPhase,
    /// Why the migration aborted
    pub failure: Option<RuntimeError>,
    /// Peers that acknowledged the new location
    pub notified: Vec<HostId>,
    /// Peers that could not be told and will rely on redirects
    pub unreachable: Vec<HostId>,
    /// Objects whose hand-off outcome could not be confirmed
    pub in_doubt: Vec<ObjectId>,
}

impl MigrationReport {
    fn new(source: HostId, destination: HostId, ids: Vec<ObjectId>) -> Self {
        Self {
            source,
            destination,
            ids,
            phase: MigrationPhase::Idle,
            failure: None,
            notified: Vec::new(),
            unreachable: Vec::new(),
            in_doubt: Vec::new(),
        }
    }

    /// Ownership moved (or was already at the destination).
    pub fn succeeded(&self) -> bool {
        self.phase == MigrationPhase::Done
    }

    /// Succeeded and every peer in the notify set acknowledged.
    pub fn fully_propagated(&self) -> bool {
        self.succeeded() && self.unreachable.is_empty()
    }

    fn advance(&mut self, phase: MigrationPhase) {
        info!(
            source = %self.source,
            destination = %self.destination,
            objects = self.ids.len(),
            "Migration {} → {}",
            self.phase,
            phase
        );
        self.phase = phase;
    }

    fn abort(&mut self, failure: RuntimeError) {
        warn!(
            source = %self.source,
            destination = %self.destination,
            error = %failure,
            "Migration aborted in {}",
            self.phase
        );
        self.phase = MigrationPhase::Aborted;
        self.failure = Some(failure);
    }
}

/// What a destination reports about an object it may have received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// The destination owns it
    Accepted,
    /// The destination never took it
    Missing,
    /// The destination points at a third host
    Unclear,
}

impl HostNode {
    /// Move locally owned objects to `destination`.
    ///
    /// Returns `Err` only for bad local input ([`RuntimeError::NoLocalObject`],
    /// [`RuntimeError::NonSerializable`]); in that case nothing was sent. A
    /// refusal or unreachable destination yields an aborted report and leaves
    /// this host's registry untouched, except for objects reported in
    /// [`MigrationReport::in_doubt`].
    pub async fn migrate(
        &self,
        ids: Vec<ObjectId>,
        destination: HostId,
    ) -> Result<MigrationReport, RuntimeError> {
        let mut ids = ids;
        ids.sort();
        ids.dedup();
        let mut report = MigrationReport::new(self.id.clone(), destination.clone(), ids.clone());
        if ids.is_empty() {
            report.phase = MigrationPhase::Done;
            return Ok(report);
        }

        report.advance(MigrationPhase::Collecting);
        let locks = self.registry.lock(&ids).await;
        let batch = match self.collect(&ids, destination == self.id) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(host = %self.id, error = %e, "Migration batch rejected during collection");
                return Err(e);
            }
        };
        if destination == self.id {
            debug!(host = %self.id, "Objects already at destination");
            report.advance(MigrationPhase::Done);
            return Ok(report);
        }

        let mut notify: BTreeSet<HostId> = BTreeSet::new();
        for item in &batch {
            for partner in &item.partners {
                if let Some(host) = self.partner_host(partner) {
                    notify.insert(host);
                }
            }
        }
        notify.insert(destination.clone());
        notify.remove(&self.id);

        report.advance(MigrationPhase::Transmitting);
        match self
            .client
            .receive(&destination, self.id.clone(), batch)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.abort(RuntimeError::migration_denied(
                    &destination,
                    "destination refused the batch",
                ));
                return Ok(report);
            }
            Err(e) if e.maybe_delivered() => {
                warn!(
                    host = %self.id,
                    destination = %destination,
                    error = %e,
                    "Lost answer to transfer, asking destination for the outcome"
                );
                match self.confirm_delivery(&ids, &destination).await {
                    Some(Delivery::Accepted) => {
                        info!(host = %self.id, destination = %destination, "Destination holds the batch");
                    }
                    Some(Delivery::Missing) => {
                        report.abort(e);
                        return Ok(report);
                    }
                    Some(Delivery::Unclear) | None => {
                        for id in &ids {
                            self.registry.mark_in_doubt(id, destination.clone());
                        }
                        report.in_doubt = ids;
                        report.abort(e);
                        return Ok(report);
                    }
                }
            }
            Err(e) if e.is_transport() => {
                report.abort(e);
                return Ok(report);
            }
            Err(e) => {
                report.abort(RuntimeError::migration_denied(&destination, e.to_string()));
                return Ok(report);
            }
        }

        report.advance(MigrationPhase::Committing);
        for id in &ids {
            self.registry.set_remote(id.clone(), destination.clone());
            self.referrer.forget(id);
        }
        drop(locks);
        let expired = self.referrer.prune();
        if expired > 0 {
            debug!(host = %self.id, expired, "Pruned expired partners");
        }

        let peers: Vec<HostId> = notify.into_iter().collect();
        let results = join_all(
            peers
                .iter()
                .map(|peer| self.notify_with_retry(peer, &ids, &destination)),
        )
        .await;
        for (peer, result) in peers.into_iter().zip(results) {
            match result {
                Ok(()) => report.notified.push(peer),
                Err(e) => {
                    warn!(
                        host = %self.id,
                        peer = %peer,
                        error = %e,
                        "Peer missed location update, it will follow a redirect"
                    );
                    report.unreachable.push(peer);
                }
            }
        }

        report.advance(MigrationPhase::Done);
        Ok(report)
    }

    /// Check ownership of every id and, unless the move is a no-op, encode
    /// the batch. Read only.
    fn collect(&self, ids: &[ObjectId], ownership_only: bool) -> Result<Vec<TransferItem>, RuntimeError> {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            match self.registry.lookup(id) {
                Some(LocationEntry::Local(entity)) => entities.push((id, entity)),
                _ => return Err(RuntimeError::no_local_object(id)),
            }
        }
        if ownership_only {
            return Ok(Vec::new());
        }

        entities
            .into_iter()
            .map(|(id, entity)| {
                Ok::<_, RuntimeError>(TransferItem {
                    id: id.clone(),
                    payload: self.codec.encode(id, entity.as_ref())?,
                    partners: self.referrer.partners(id),
                })
            })
            .collect()
    }

    fn partner_host(&self, partner: &Partner) -> Option<HostId> {
        match partner {
            Partner::Host(host) => Some(host.clone()),
            Partner::Object(id) => self
                .registry
                .location(id)
                .map(|location| location.host(&self.id).clone()),
        }
    }

    async fn notify_with_retry(
        &self,
        peer: &HostId,
        ids: &[ObjectId],
        owner: &HostId,
    ) -> Result<(), RuntimeError> {
        let attempts = self.config.notify_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .client
                .update_object_locations(peer, ids.to_vec(), owner.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let backoff = self.config.backoff_for_retry(attempt);
                    debug!(peer = %peer, attempt, error = %e, ?backoff, "Retrying location update");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// What `destination` says about one object it may have received.
    async fn delivery_of(
        &self,
        id: &ObjectId,
        destination: &HostId,
    ) -> Result<Delivery, RuntimeError> {
        match self
            .client
            .location_of_object(destination, id.clone())
            .await
        {
            Ok(owner) if owner == *destination => Ok(Delivery::Accepted),
            Ok(owner) if owner == self.id => Ok(Delivery::Missing),
            Ok(_) => Ok(Delivery::Unclear),
            Err(RuntimeError::ObjectNotFound { .. }) => Ok(Delivery::Missing),
            Err(e) => Err(e),
        }
    }

    /// Find out whether a batch with a lost answer was accepted.
    ///
    /// A batch is admitted whole or not at all, so one object held by the
    /// destination settles it. `None` when the destination stayed silent
    /// for every attempt.
    async fn confirm_delivery(&self, ids: &[ObjectId], destination: &HostId) -> Option<Delivery> {
        let attempts = self.config.notify_attempts.max(1);
        for attempt in 1..=attempts {
            let mut outcome = Some(Delivery::Missing);
            for id in ids {
                match self.delivery_of(id, destination).await {
                    Ok(Delivery::Accepted) => return Some(Delivery::Accepted),
                    Ok(Delivery::Missing) => {}
                    Ok(Delivery::Unclear) => outcome = Some(Delivery::Unclear),
                    Err(e) => {
                        debug!(destination = %destination, attempt, error = %e, "Outcome query failed");
                        outcome = None;
                        break;
                    }
                }
            }
            if outcome.is_some() {
                return outcome;
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.backoff_for_retry(attempt)).await;
            }
        }
        None
    }

    /// Settle one in-doubt object by asking its destination. The caller
    /// holds the id's lock.
    ///
    /// Returns the settled location, or `None` if it is still unknown.
    pub(crate) async fn settle_in_doubt(
        &self,
        id: &ObjectId,
        destination: &HostId,
    ) -> Option<Location> {
        match self.delivery_of(id, destination).await {
            Ok(Delivery::Accepted) => {
                self.registry.set_remote(id.clone(), destination.clone());
                self.referrer.forget(id);
                info!(host = %self.id, id = %id, owner = %destination, "In-doubt object was handed off");
                Some(Location::Remote(destination.clone()))
            }
            Ok(Delivery::Missing) => {
                self.registry.restore_local(id);
                info!(host = %self.id, id = %id, "In-doubt object is still owned here");
                Some(Location::Local)
            }
            Ok(Delivery::Unclear) => None,
            Err(e) => {
                debug!(host = %self.id, id = %id, error = %e, "In-doubt object still unresolved");
                None
            }
        }
    }

    /// Ask destinations about every in-doubt object, returning how many
    /// remain unresolved.
    pub async fn resolve_in_doubt(&self) -> usize {
        let mut unresolved = 0;
        for (id, _) in self.registry.in_doubt() {
            let _lock = self.registry.lock(std::slice::from_ref(&id)).await;
            // re-read under the lock, an update may have settled it
            if let Some(LocationEntry::InDoubt { destination, .. }) = self.registry.lookup(&id) {
                if self.settle_in_doubt(&id, &destination).await.is_none() {
                    unresolved += 1;
                }
            }
        }
        unresolved
    }

    /// Admit an incoming batch, or refuse it without changing anything.
    pub(crate) async fn accept_batch(
        &self,
        from: HostId,
        batch: Vec<TransferItem>,
    ) -> Result<bool, RuntimeError> {
        if !self.config.accept_migrations {
            info!(host = %self.id, from = %from, "Refusing migration: not accepting objects");
            return Ok(false);
        }
        let ids: Vec<ObjectId> = batch.iter().map(|item| item.id.clone()).collect();
        let unique: BTreeSet<&ObjectId> = ids.iter().collect();
        if unique.len() != ids.len() {
            warn!(host = %self.id, from = %from, "Refusing migration: duplicate ids in batch");
            return Ok(false);
        }

        let _locks = self.registry.lock(&ids).await;
        if let Some(max) = self.config.max_hosted_objects {
            if self.registry.local_count() + ids.len() > max {
                info!(host = %self.id, from = %from, max, "Refusing migration: capacity");
                return Ok(false);
            }
        }
        if let Some(id) = ids
            .iter()
            .find(|id| matches!(self.registry.location(id), Some(Location::Local)))
        {
            warn!(host = %self.id, from = %from, id = %id, "Refusing migration: already owned here");
            return Ok(false);
        }

        let mut decoded = Vec::with_capacity(batch.len());
        for item in batch {
            match self.codec.decode(item.payload) {
                Ok(entity) => decoded.push((item.id, entity, item.partners)),
                Err(e) => {
                    warn!(host = %self.id, from = %from, id = %item.id, error = %e, "Refusing migration: undecodable payload");
                    return Ok(false);
                }
            }
        }

        for (id, entity, partners) in decoded {
            self.registry.register(id.clone(), entity)?;
            self.referrer.adopt(
                &id,
                partners
                    .into_iter()
                    .chain(std::iter::once(Partner::Host(from.clone()))),
            );
        }
        info!(host = %self.id, from = %from, objects = ids.len(), "Accepted migration");
        Ok(true)
    }

    /// Record `owner` as the location of `ids`.
    ///
    /// Applying the same update twice leaves the registry as applying it
    /// once. Entries for objects owned here are never overwritten.
    pub(crate) async fn apply_location_update(
        &self,
        ids: Vec<ObjectId>,
        owner: HostId,
    ) -> Result<(), RuntimeError> {
        if owner == self.id {
            return Ok(());
        }
        let _locks = self.registry.lock(&ids).await;
        for id in ids {
            match self.registry.lookup(&id) {
                Some(LocationEntry::Local(_)) => {
                    warn!(host = %self.id, id = %id, owner = %owner, "Ignoring location update for a local object");
                }
                Some(LocationEntry::Remote(current)) if current == owner => {}
                Some(LocationEntry::InDoubt { .. }) => {
                    info!(host = %self.id, id = %id, owner = %owner, "Location update settles in-doubt object");
                    self.registry.set_remote(id.clone(), owner.clone());
                    self.referrer.forget(&id);
                }
                _ => {
                    self.registry.set_remote(id, owner.clone());
                }
            }
        }
        Ok(())
    }
}
