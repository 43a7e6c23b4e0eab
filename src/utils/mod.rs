//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod error;
mod safetcp;
mod timer;

pub use error::ChaseError;
pub use print::{logger_init, logger_set_me, ME};
pub use timer::Timer;

pub(crate) use safetcp::{
    safe_tcp_read, safe_tcp_write_insist, tcp_bind_with_retry,
    tcp_connect_with_retry,
};
