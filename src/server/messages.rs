//! Wire messages exchanged between lookup clients and the server.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Program number the lookup service answers to.
pub const LIST_PROG: u32 = 0x2345_1111;

/// Only supported program version.
pub const LIST_VERS: u32 = 1;

/// No-op procedure, answered with an empty result.
pub const NULL_PROC: u32 = 0;

/// Key lookup procedure.
pub const LIST_FUNC: u32 = 1;

/// Maximum number of words in one lookup result.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum payload of one UDP datagram.
pub const MAX_DATAGRAM: usize = 65507;

/// Per-call transaction ID, echoed back in the reply.
pub type CallId = u64;

/// Request sent by a client.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode,
)]
pub enum ApiRequest {
    /// Procedure call.
    Call {
        /// Transaction ID.
        xid: CallId,

        /// Program number.
        prog: u32,

        /// Program version.
        vers: u32,

        /// Procedure number.
        proc_id: u32,

        /// Key argument; ignored by the NULL procedure.
        key: u64,
    },

    /// Client leave notification.
    Leave,
}

impl ApiRequest {
    /// Composes a lookup call for `key`.
    pub fn lookup(xid: CallId, key: u64) -> Self {
        ApiRequest::Call {
            xid,
            prog: LIST_PROG,
            vers: LIST_VERS,
            proc_id: LIST_FUNC,
            key,
        }
    }

    /// Composes a NULL procedure call.
    pub fn null(xid: CallId) -> Self {
        ApiRequest::Call {
            xid,
            prog: LIST_PROG,
            vers: LIST_VERS,
            proc_id: NULL_PROC,
            key: 0,
        }
    }
}

/// Outcome of one procedure call.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode,
)]
pub enum CallResult {
    /// NULL procedure done.
    Null,

    /// Value words of the looked-up key.
    Value { words: Vec<u64> },

    /// Key absent; only sent when explicit miss replies are enabled.
    NotFound,

    /// Unknown procedure number.
    NoProc,

    /// Unknown program, or a version outside `low..=high`.
    ProgMismatch { low: u32, high: u32 },

    /// Server could not encode the result.
    SystemErr,
}

/// Reply sent back to a client.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode,
)]
pub enum ApiReply {
    /// Reply to a procedure call.
    Reply {
        /// Transaction ID of the corresponding call.
        xid: CallId,

        /// Call outcome.
        result: CallResult,
    },

    /// Reply to client leave notification.
    Leave,
}

#[cfg(test)]
mod messages_tests {
    use super::*;
    use crate::utils::ChaseError;

    #[test]
    fn lookup_call_fields() {
        assert_eq!(
            ApiRequest::lookup(7, 42),
            ApiRequest::Call {
                xid: 7,
                prog: 0x2345_1111,
                vers: 1,
                proc_id: 1,
                key: 42,
            }
        );
    }

    #[test]
    fn max_value_reply_exceeds_datagram() -> Result<(), ChaseError> {
        let reply = ApiReply::Reply {
            xid: 1,
            result: CallResult::Value {
                words: vec![u64::MAX; MAX_DATAGRAM / 8],
            },
        };
        let bytes = bincode::encode_to_vec(&reply, bincode::config::standard())?;
        assert!(bytes.len() > MAX_DATAGRAM);
        Ok(())
    }
}
