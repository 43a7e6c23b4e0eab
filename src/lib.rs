//! Remote pointer-chasing lookup latency benchmark: a server holding many
//! replicas of one linked list, and a closed-loop client timing lookups.

#[macro_use]
mod utils;

mod client;
mod server;
mod stats;
mod store;

// Helper utilities, functions, and macros
pub use utils::{logger_init, logger_set_me, ChaseError, Timer, ME};

// Store data structures and lookup machinery
pub use store::{
    codec, lookup, resolve, resolve_scattered, reverse_bits, ArenaId,
    ArenaLayout, ListElement, NodeIdx, Replica, ReplicaScheduler, ReplicaSet,
    ScatterMode, ValueRef, ARENA_ALIGN, NUM_LIST,
};

// Server side public interface
pub use server::{
    ApiReply, ApiRequest, CallId, CallResult, LookupServer, ServerConfig,
    ServerState, LIST_FUNC, LIST_PROG, LIST_VERS, MAX_ARRAY_LEN, MAX_DATAGRAM,
    NULL_PROC,
};

// Client side public interface
pub use client::{
    ClientId, DriverClosedLoop, DriverReply, GenericEndpoint, ModeParamsQuery,
    QueryGenerator, TcpEndpoint, TransportKind, UdpEndpoint,
};

// Latency statistics
pub use stats::{summarize, LatencyReport, LatencyStats, TAIL_MIN_SAMPLES};
