//! Key lookup by linear pointer chasing.

use crate::store::replica::{Replica, ValueRef};
use crate::store::replset::ReplicaSet;
use crate::store::scheduler::ReplicaScheduler;
use crate::utils::ChaseError;

/// How lookups are spread over replicas.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ScatterMode {
    /// One replica per lookup; the whole traversal stays in it.
    PerLookup,

    /// A fresh replica for every traversal step.
    PerHop,
}

impl ScatterMode {
    /// Parse command line string into `ScatterMode` enum.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "lookup" => Some(Self::PerLookup),
            "hop" => Some(Self::PerHop),
            _ => None,
        }
    }
}

/// Scans `replica` from its head, following `next` links until the key
/// matches. Returns `None` if the terminal node is reached without a match.
pub fn resolve(replica: &Replica, key: u64) -> Option<ValueRef> {
    let mut idx = replica.head();
    while let Some(i) = idx {
        let node = replica.node(i)?;
        if node.key == key {
            return Some(node.value);
        }
        idx = node.next;
    }
    None
}

/// Like `resolve`, but every step reads the next node from a newly picked
/// replica. All replicas share the same shape, so a node index taken from
/// one replica's link is valid in any other.
pub fn resolve_scattered(
    replicas: &ReplicaSet,
    scheduler: &mut ReplicaScheduler,
    key: u64,
) -> Result<Option<ValueRef>, ChaseError> {
    let mut idx = 0;
    loop {
        let replica = pick_replica(replicas, scheduler)?;
        let Some(node) = replica.node(idx) else {
            return Ok(None);
        };
        if node.key == key {
            return Ok(Some(node.value));
        }
        match node.next {
            Some(next) => idx = next,
            None => return Ok(None),
        }
    }
}

/// Resolves one lookup under given scatter mode, advancing the scheduler.
/// Returns `Err` on a scheduler fault and `Ok(None)` on a miss.
pub fn lookup(
    replicas: &ReplicaSet,
    scheduler: &mut ReplicaScheduler,
    mode: ScatterMode,
    key: u64,
) -> Result<Option<ValueRef>, ChaseError> {
    match mode {
        ScatterMode::PerLookup => {
            let replica = pick_replica(replicas, scheduler)?;
            Ok(resolve(replica, key))
        }
        ScatterMode::PerHop => resolve_scattered(replicas, scheduler, key),
    }
}

#[inline]
fn pick_replica<'s>(
    replicas: &'s ReplicaSet,
    scheduler: &mut ReplicaScheduler,
) -> Result<&'s Replica, ChaseError> {
    let idx = scheduler.pick()?;
    replicas.get(idx).ok_or_else(|| {
        ChaseError::msg(format!("replica {} missing from set", idx))
    })
}
