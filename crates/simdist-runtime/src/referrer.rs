//! Communication partner bookkeeping.
//!
//! Tracks, per locally owned object, which peers called it recently. The
//! partners' hosts are the ones told about a migration of that object.

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::types::{ObjectId, Partner};

/// Recent callers of each object, expiring after a time window.
#[derive(Debug)]
pub struct ObjectReferrer {
    partners: DashMap<ObjectId, HashMap<Partner, Instant>>,
    window: Duration,
}

impl ObjectReferrer {
    pub fn new(window: Duration) -> Self {
        Self {
            partners: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Note a call to `id` from `partner`.
    pub fn record(&self, id: &ObjectId, partner: Partner) {
        trace!(id = %id, partner = ?partner, "Recording partner");
        self.partners
            .entry(id.clone())
            .or_default()
            .insert(partner, Instant::now());
    }

    /// Adopt partners that travelled with a migrated object.
    pub fn adopt(&self, id: &ObjectId, partners: impl IntoIterator<Item = Partner>) {
        let now = Instant::now();
        let mut entry = self.partners.entry(id.clone()).or_default();
        for partner in partners {
            entry.insert(partner, now);
        }
    }

    /// Partners of `id` seen within the window, sorted.
    pub fn partners(&self, id: &ObjectId) -> Vec<Partner> {
        let now = Instant::now();
        let mut partners: Vec<Partner> = self
            .partners
            .get(id)
            .map(|seen| {
                seen.iter()
                    .filter(|(_, at)| now.duration_since(**at) <= self.window)
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default();
        partners.sort();
        partners
    }

    /// Drop everything known about `id`, returning its live partners.
    pub fn forget(&self, id: &ObjectId) -> Vec<Partner> {
        let partners = self.partners(id);
        self.partners.remove(id);
        partners
    }

    /// Objects with any partner entry, expired or not.
    pub fn tracked(&self) -> usize {
        self.partners.len()
    }

    /// Remove expired partners, returning how many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.partners.retain(|_, seen| {
            let before = seen.len();
            seen.retain(|_, at| now.duration_since(*at) <= self.window);
            removed += before - seen.len();
            !seen.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_dedups_and_sorts() {
        let referrer = ObjectReferrer::new(Duration::from_secs(60));
        let id = ObjectId::new("x");
        referrer.record(&id, Partner::Host(HostId::new("H3")));
        referrer.record(&id, Partner::Object(ObjectId::new("y")));
        referrer.record(&id, Partner::Host(HostId::new("H3")));

        assert_eq!(
            referrer.partners(&id),
            vec![
                Partner::Object(ObjectId::new("y")),
                Partner::Host(HostId::new("H3")),
            ]
        );
    }

    #[test]
    fn test_expired_partners_are_ignored() {
        let referrer = ObjectReferrer::new(Duration::ZERO);
        let id = ObjectId::new("x");
        referrer.record(&id, Partner::Host(HostId::new("H2")));
        std::thread::sleep(Duration::from_millis(5));

        assert!(referrer.partners(&id).is_empty());
        assert_eq!(referrer.tracked(), 1);
        assert_eq!(referrer.prune(), 1);
        assert_eq!(referrer.tracked(), 0);
    }

    #[test]
    fn test_forget_returns_partners() {
        let referrer = ObjectReferrer::new(Duration::from_secs(60));
        let id = ObjectId::new("x");
        referrer.adopt(&id, vec![Partner::Host(HostId::new("H1"))]);
        assert_eq!(referrer.forget(&id).len(), 1);
        assert!(referrer.partners(&id).is_empty());
    }
}
