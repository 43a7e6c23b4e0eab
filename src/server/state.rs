//! Server-side lookup state owned by the dispatch loop.

use crate::server::messages::{
    ApiReply, ApiRequest, CallId, CallResult, LIST_FUNC, LIST_PROG, LIST_VERS,
    MAX_ARRAY_LEN, NULL_PROC,
};
use crate::store::{self, ReplicaScheduler, ReplicaSet, ScatterMode};
use crate::utils::ChaseError;

/// Everything a lookup touches: the replica set, the scheduler counter, and
/// the miss policy. Only the single dispatch loop holds this, so no locking
/// is needed.
#[derive(Debug)]
pub struct ServerState {
    /// Immutable replica set.
    replicas: ReplicaSet,

    /// Replica scheduler; its counter advances on every lookup.
    scheduler: ReplicaScheduler,

    /// How lookups are spread over replicas.
    scatter: ScatterMode,

    /// Answer misses with `NotFound` instead of staying silent.
    miss_reply: bool,
}

impl ServerState {
    /// Creates the state around an already built replica set.
    pub fn new(
        replicas: ReplicaSet,
        scatter: ScatterMode,
        miss_reply: bool,
    ) -> Result<Self, ChaseError> {
        let scheduler = ReplicaScheduler::new(replicas.len())?;
        Ok(ServerState {
            replicas,
            scheduler,
            scatter,
            miss_reply,
        })
    }

    /// Gets the replica set.
    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    /// Gets the scheduler.
    pub fn scheduler(&self) -> &ReplicaScheduler {
        &self.scheduler
    }

    /// Handles one request. Returns `None` when no reply must be sent.
    pub fn handle(&mut self, req: &ApiRequest) -> Option<ApiReply> {
        match *req {
            ApiRequest::Leave => Some(ApiReply::Leave),
            ApiRequest::Call {
                xid,
                prog,
                vers,
                proc_id,
                key,
            } => self
                .handle_call(xid, prog, vers, proc_id, key)
                .map(|result| ApiReply::Reply { xid, result }),
        }
    }

    /// Dispatches a call by program, version, and procedure number.
    fn handle_call(
        &mut self,
        xid: CallId,
        prog: u32,
        vers: u32,
        proc_id: u32,
        key: u64,
    ) -> Option<CallResult> {
        if prog != LIST_PROG || vers != LIST_VERS {
            pf_debug!(
                "call {} for unknown program {:#x} version {}",
                xid,
                prog,
                vers
            );
            return Some(CallResult::ProgMismatch {
                low: LIST_VERS,
                high: LIST_VERS,
            });
        }

        match proc_id {
            NULL_PROC => Some(CallResult::Null),
            LIST_FUNC => self.lookup(key),
            _ => {
                pf_debug!("call {} for unknown procedure {}", xid, proc_id);
                Some(CallResult::NoProc)
            }
        }
    }

    /// Resolves one key. A scheduler fault drops the call; a miss drops it
    /// too unless explicit miss replies are enabled.
    fn lookup(&mut self, key: u64) -> Option<CallResult> {
        let vref = match store::lookup(
            &self.replicas,
            &mut self.scheduler,
            self.scatter,
            key,
        ) {
            Ok(Some(vref)) => vref,
            Ok(None) => {
                pf_warn!("the expected key is not found: {}", key);
                return if self.miss_reply {
                    Some(CallResult::NotFound)
                } else {
                    None
                };
            }
            Err(e) => {
                pf_warn!("dropping lookup of key {}: {}", key, e);
                return None;
            }
        };

        match self.replicas.value_words(&vref) {
            Ok(words) if words.len() <= MAX_ARRAY_LEN => {
                Some(CallResult::Value { words })
            }
            Ok(words) => {
                pf_error!(
                    "result of {} words exceeds limit {}",
                    words.len(),
                    MAX_ARRAY_LEN
                );
                Some(CallResult::SystemErr)
            }
            Err(e) => {
                pf_error!("failed to read value of key {}: {}", key, e);
                Some(CallResult::SystemErr)
            }
        }
    }
}
