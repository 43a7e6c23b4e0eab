//! Lookup client functionality modules.

mod driver;
mod endpoint;
mod query;

pub use driver::{DriverClosedLoop, DriverReply};
pub use endpoint::{
    ClientId, GenericEndpoint, TcpEndpoint, TransportKind, UdpEndpoint,
};
pub use query::{ModeParamsQuery, QueryGenerator};
