//! Closed-loop call driver: exactly one outstanding call at a time, each
//! bounded by a deadline.

use crate::client::{ClientId, GenericEndpoint};
use crate::server::{ApiReply, ApiRequest, CallId, CallResult};
use crate::utils::{ChaseError, Timer};

use tokio::time::Duration;

/// Outcome of one driven call.
#[derive(Debug, PartialEq, Eq)]
pub enum DriverReply {
    /// Lookup returned a value.
    Value { xid: CallId, words: Vec<u64> },

    /// NULL procedure answered.
    Null,

    /// Server explicitly reported the key as absent.
    NotFound,

    /// Server answered with an error result.
    Failure { result: CallResult },

    /// No matching reply before the deadline.
    Timeout,
}

/// Closed-loop driver over one endpoint.
pub struct DriverClosedLoop {
    /// Client endpoint.
    endpoint: Box<dyn GenericEndpoint>,

    /// Next transaction ID to use.
    next_xid: CallId,

    /// Per-call deadline.
    timeout: Duration,

    /// Deadline timer of the outstanding call.
    timer: Timer,
}

impl DriverClosedLoop {
    /// Creates a new closed-loop driver.
    pub fn new(endpoint: Box<dyn GenericEndpoint>, timeout: Duration) -> Self {
        DriverClosedLoop {
            endpoint,
            next_xid: 0,
            timeout,
            timer: Timer::new(),
        }
    }

    /// Establishes connection to the server.
    pub async fn connect(&mut self) -> Result<(), ChaseError> {
        self.endpoint.connect().await
    }

    /// Leaves the server.
    pub async fn leave(&mut self) -> Result<(), ChaseError> {
        self.endpoint.leave().await
    }

    /// Gets my client ID.
    pub fn id(&self) -> ClientId {
        self.endpoint.id()
    }

    /// Gets the per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issues a lookup of `key` and waits for its reply.
    pub async fn lookup(&mut self, key: u64) -> Result<DriverReply, ChaseError> {
        let xid = self.take_xid();
        Ok(match self.call(ApiRequest::lookup(xid, key)).await? {
            None => DriverReply::Timeout,
            Some(CallResult::Value { words }) => {
                DriverReply::Value { xid, words }
            }
            Some(CallResult::NotFound) => DriverReply::NotFound,
            Some(result) => DriverReply::Failure { result },
        })
    }

    /// Issues a NULL procedure call and waits for its reply.
    pub async fn ping(&mut self) -> Result<DriverReply, ChaseError> {
        let xid = self.take_xid();
        Ok(match self.call(ApiRequest::null(xid)).await? {
            None => DriverReply::Timeout,
            Some(CallResult::Null) => DriverReply::Null,
            Some(result) => DriverReply::Failure { result },
        })
    }

    #[inline]
    fn take_xid(&mut self) -> CallId {
        let xid = self.next_xid;
        self.next_xid += 1;
        xid
    }

    /// Sends a call and waits for the reply carrying the same transaction
    /// ID. Replies to earlier, timed-out calls are skipped. Returns `None`
    /// if the deadline passes first.
    async fn call(
        &mut self,
        req: ApiRequest,
    ) -> Result<Option<CallResult>, ChaseError> {
        let ApiRequest::Call { xid, .. } = req else {
            return logged_err!("leave is not a call");
        };

        self.timer.restart(self.timeout)?;
        self.endpoint.send_req(&req).await?;

        loop {
            tokio::select! {
                () = self.timer.timeout() => {
                    pf_debug!("timed-out waiting for reply to call {}", xid);
                    return Ok(None);
                },

                reply = self.endpoint.recv_reply() => match reply? {
                    ApiReply::Reply { xid: reply_xid, result }
                        if reply_xid == xid =>
                    {
                        return Ok(Some(result));
                    }
                    ApiReply::Reply { xid: reply_xid, .. } => {
                        pf_debug!("skipping stale reply to call {}", reply_xid);
                    }
                    ApiReply::Leave => {
                        return logged_err!("unexpected leave reply");
                    }
                },
            }
        }
    }
}
