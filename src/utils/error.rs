//! Customized unified error type.

use std::collections;
use std::error;
use std::fmt;
use std::io;
use std::net;
use std::num;
use std::string;

/// Customized error type for listchase.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ChaseError(pub(crate) String);

impl ChaseError {
    pub fn msg(msg: impl ToString) -> Self {
        ChaseError(msg.to_string())
    }
}

impl fmt::Display for ChaseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for ChaseError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `ChaseError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for ChaseError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                ChaseError(e.to_string())
            }
        }
    };
}

// Helper macro for saving boiler-plate `impl From<X<T>>`s for transparent
// conversion from various common generic error types to `ChaseError`.
macro_rules! impl_from_error_generic {
    ($error:ty) => {
        impl<T> From<$error> for ChaseError {
            fn from(e: $error) -> ChaseError {
                ChaseError::msg(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(string::FromUtf8Error);
impl_from_error!(num::ParseIntError);
impl_from_error!(num::ParseFloatError);
impl_from_error!(net::AddrParseError);
impl_from_error!(collections::TryReserveError);
impl_from_error!(bincode::error::EncodeError);
impl_from_error!(bincode::error::DecodeError);
impl_from_error!(toml::ser::Error);
impl_from_error!(toml::de::Error);
impl_from_error!(ctrlc::Error);
impl_from_error!(tokio::sync::oneshot::error::RecvError);

impl_from_error_generic!(tokio::sync::watch::error::SendError<T>);
impl_from_error_generic!(tokio::sync::mpsc::error::SendError<T>);
