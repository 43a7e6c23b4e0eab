//! Bit-reversal replica scheduler.
//!
//! Consecutive counter values differ mostly in their low bits; reversing the
//! bits turns those into high-bit differences, so back-to-back lookups land
//! on replicas far apart in index space. Over any aligned window of
//! `2^bits` counter values every replica index is produced exactly once.

use crate::utils::ChaseError;

/// Reverses the lowest `bits` bits of `x`; higher bits are discarded.
#[inline]
pub fn reverse_bits(x: u32, bits: u32) -> u32 {
    if bits == 0 {
        0
    } else {
        x.reverse_bits() >> (u32::BITS - bits)
    }
}

/// Picks which replica answers each lookup.
#[derive(Debug)]
pub struct ReplicaScheduler {
    /// Monotonically increasing pick counter, wrapping at `u32` width.
    s_index: u32,

    /// Width of the reversed field.
    bits: u32,

    /// Number of replicas being scheduled over.
    num_replicas: usize,
}

impl ReplicaScheduler {
    /// Creates a scheduler over `num_replicas` replicas starting at counter
    /// zero. The reversed field is just wide enough to span all indices.
    pub fn new(num_replicas: usize) -> Result<Self, ChaseError> {
        if num_replicas == 0 || num_replicas > (1usize << 31) {
            return Err(ChaseError::msg(format!(
                "invalid number of replicas {} to schedule",
                num_replicas
            )));
        }
        Ok(ReplicaScheduler {
            s_index: 0,
            bits: num_replicas.next_power_of_two().trailing_zeros(),
            num_replicas,
        })
    }

    /// Gets the width of the reversed field.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Gets the current counter value.
    pub fn counter(&self) -> u32 {
        self.s_index
    }

    /// Returns the replica index for the next lookup and advances the
    /// counter. An index at or beyond the replica count is an internal fault;
    /// the counter still advances so later picks proceed normally.
    pub fn pick(&mut self) -> Result<usize, ChaseError> {
        let idx = reverse_bits(self.s_index, self.bits) as usize;
        self.s_index = self.s_index.wrapping_add(1);
        if idx >= self.num_replicas {
            return logged_err!(
                "reversed index {} is not valid, beyond {} replicas",
                idx,
                self.num_replicas
            );
        }
        Ok(idx)
    }
}
