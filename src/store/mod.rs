//! In-memory replicated linked-list store and its lookup machinery.

pub mod codec;

mod replica;
mod replset;
mod resolver;
mod scheduler;

pub use replica::{
    ArenaId, ArenaLayout, ListElement, NodeIdx, Replica, ValueRef, ARENA_ALIGN,
};
pub use replset::{ReplicaSet, NUM_LIST};
pub use resolver::{lookup, resolve, resolve_scattered, ScatterMode};
pub use scheduler::{reverse_bits, ReplicaScheduler};
