//! The full set of content-identical list replicas served by one server.

use crate::store::replica::{ArenaId, Replica, ValueRef};
use crate::utils::ChaseError;

/// Default (and maximum) number of replicas.
pub const NUM_LIST: usize = 1024 * 128;

/// Fixed-size collection of replicas, built once at startup and read-only
/// afterwards.
#[derive(Debug)]
pub struct ReplicaSet {
    /// All replicas, indexed by arena ID.
    replicas: Vec<Replica>,

    /// Number of elements per list.
    num_elements: usize,

    /// Value size in bytes.
    value_size: usize,
}

impl ReplicaSet {
    /// Builds `num_replicas` independent replicas of the same list. Any
    /// allocation failure aborts the whole build.
    pub fn build(
        num_replicas: usize,
        num_elements: usize,
        value_size: usize,
    ) -> Result<Self, ChaseError> {
        if num_replicas == 0 || num_replicas > NUM_LIST {
            return logged_err!("invalid number of replicas {}", num_replicas);
        }

        let mut replicas = Vec::new();
        replicas.try_reserve_exact(num_replicas)?;
        let progress_step = (num_replicas / 8).max(1);
        for id in 0..num_replicas {
            let replica = Replica::build(id as ArenaId, num_elements, value_size)
                .map_err(|e| {
                    pf_error!("building replica {} failed: {}", id, e);
                    e
                })?;
            if id == 0 {
                let layout = replica.layout();
                pf_info!(
                    "replica layout: elements {} B, values {} B, arena {} B",
                    layout.nodes_bytes,
                    layout.values_bytes,
                    layout.total_bytes
                );
            }
            replicas.push(replica);

            if (id + 1) % progress_step == 0 {
                pf_debug!("built {}/{} replicas", id + 1, num_replicas);
            }
        }

        pf_info!(
            "built {} replicas of {} elements x {} B",
            num_replicas,
            num_elements,
            value_size
        );
        Ok(ReplicaSet {
            replicas,
            num_elements,
            value_size,
        })
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Always false for a built set.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Number of elements per list.
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Value size in bytes.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Gets the replica at given index.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Replica> {
        self.replicas.get(idx)
    }

    /// Copies out the whole words of a value, looking up its arena.
    pub fn value_words(&self, vref: &ValueRef) -> Result<Vec<u64>, ChaseError> {
        match self.replicas.get(vref.arena as usize) {
            Some(replica) => replica.value_words(vref),
            None => Err(ChaseError::msg(format!(
                "value ref into unknown arena {}",
                vref.arena
            ))),
        }
    }
}
