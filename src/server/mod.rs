//! Lookup server functionality modules.

mod external;
mod messages;
mod node;
mod state;

pub use messages::{
    ApiReply, ApiRequest, CallId, CallResult, LIST_FUNC, LIST_PROG, LIST_VERS,
    MAX_ARRAY_LEN, MAX_DATAGRAM, NULL_PROC,
};
pub use node::{LookupServer, ServerConfig};
pub use state::ServerState;
