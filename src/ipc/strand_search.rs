//! Strand search: the full request/response pair behind requests for a
//! strand matching a tag.
//!
//! Unlike a plain lookup, a search that finds no match yet is kept pending
//! so that a strand registering moments later can still satisfy it, until
//! its own timeout expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ipc::coordinator::StrandRecord;
use crate::ipc::strand::KidId;

/// How long a search waits for a matching strand to appear before the
/// Coordinator gives up and answers "not found".
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

struct PendingSearch {
    requester: u32,
    tag: String,
    deadline: Instant,
}

/// Tracks searches that could not be satisfied immediately.
#[derive(Default)]
pub struct StrandSearchRegistry {
    pending: Vec<PendingSearch>,
}

impl StrandSearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending search for `tag` on behalf of `requester`.
    pub fn add(&mut self, requester: u32, tag: String) {
        self.pending.push(PendingSearch {
            requester,
            tag,
            deadline: Instant::now() + SEARCH_TIMEOUT,
        });
    }

    /// Called whenever the registry of live strands changes (a new
    /// registration). Returns `(requester, found_kid)` pairs for every
    /// pending search now satisfied, removing them from the pending list.
    pub fn resolve_against(&mut self, strands: &HashMap<u32, StrandRecord>) -> Vec<(u32, KidId)> {
        let mut satisfied = Vec::new();
        self.pending.retain(|search| {
            match strands.values().find(|s| s.tag.as_deref() == Some(search.tag.as_str())) {
                Some(found) => {
                    satisfied.push((search.requester, found.kid_id));
                    false
                }
                None => true,
            }
        });
        satisfied
    }

    /// Drops and returns the requesters of every search whose deadline has
    /// passed, so the Coordinator can answer them with "not found".
    pub fn sweep_expired(&mut self) -> Vec<u32> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.pending.retain(|search| {
            if search.deadline <= now {
                expired.push(search.requester);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(kid: u32, tag: &str) -> StrandRecord {
        StrandRecord {
            kid_id: KidId(kid),
            pid: 0,
            tag: Some(tag.into()),
        }
    }

    #[test]
    fn unresolved_search_stays_pending() {
        let mut registry = StrandSearchRegistry::new();
        registry.add(1, "worker".into());
        let strands = HashMap::new();
        assert!(registry.resolve_against(&strands).is_empty());
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn late_registration_satisfies_pending_search() {
        let mut registry = StrandSearchRegistry::new();
        registry.add(1, "worker".into());
        let mut strands = HashMap::new();
        strands.insert(9, record(9, "worker"));
        let resolved = registry.resolve_against(&strands);
        assert_eq!(resolved, vec![(1, KidId(9))]);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn expired_search_is_swept() {
        let mut registry = StrandSearchRegistry::new();
        registry.pending.push(PendingSearch {
            requester: 3,
            tag: "ghost".into(),
            deadline: Instant::now() - Duration::from_millis(1),
        });
        let expired = registry.sweep_expired();
        assert_eq!(expired, vec![3]);
        assert_eq!(registry.pending_count(), 0);
    }
}
