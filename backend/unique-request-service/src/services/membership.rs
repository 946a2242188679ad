/// Membership store for request identifiers
///
/// Remembers every identifier this process has ever observed, whether it came
/// from local ingress or from the shared event log. Answers "is this new?"
/// with a single atomic check-and-insert.
///
/// # Guarantees
/// - For a given identifier, exactly one `observe` call returns `true`
/// - Thread-safe (DashMap shard locks, no global lock)
/// - No eviction: the store grows for the lifetime of the process
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;
use crate::models::RequestId;

/// Where the first observation of an identifier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Accepted by this instance's ingress handler
    Local,
    /// Merged from the shared event log
    Remote,
}

#[derive(Debug, Default)]
pub struct MembershipStore {
    seen: Arc<DashMap<RequestId, Origin>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `id`.
    ///
    /// # Returns
    /// * `true` - first observation of this identifier
    /// * `false` - identifier was already present
    pub fn observe(&self, id: RequestId, origin: Origin) -> bool {
        // The shard write lock is held across the check and the insert.
        match self.seen.entry(id) {
            Entry::Occupied(_) => {
                debug!(request_id = %id, ?origin, "Identifier already observed");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(origin);
                metrics::MEMBERSHIP_SIZE.inc();
                true
            }
        }
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.seen.contains_key(&id)
    }

    /// Origin of the first observation, if the identifier is present
    pub fn origin_of(&self, id: RequestId) -> Option<Origin> {
        self.seen.get(&id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Clone for MembershipStore {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}
