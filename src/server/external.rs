//! Lookup server external API module implementation: TCP and UDP front ends
//! that funnel every request into one channel drained by the dispatch loop.

use std::net::SocketAddr;

use crate::client::ClientId;
use crate::server::messages::{ApiReply, ApiRequest, CallResult, MAX_DATAGRAM};
use crate::utils::{
    safe_tcp_read, safe_tcp_write_insist, tcp_bind_with_retry, ChaseError,
};

use bytes::BytesMut;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// Deadline for a new TCP client to send its ID.
const CLIENT_ID_TIMEOUT: Duration = Duration::from_secs(5);

/// Client ID under which all datagram requests are filed.
const UDP_CLIENT: ClientId = ClientId::MAX;

/// One-shot slot for the reply to a single request. Dropping it without
/// sending means no reply goes out.
pub(crate) type ReplySlot = oneshot::Sender<ApiReply>;

/// A request as seen by the dispatch loop.
pub(crate) type IncomingReq = (ClientId, ApiRequest, ReplySlot);

/// The external client-facing API module.
pub(crate) struct ExternalApi {
    /// Receiver side of the req channel.
    rx_req: Option<mpsc::Receiver<IncomingReq>>,

    /// Bound TCP address.
    tcp_addr: Option<SocketAddr>,

    /// Bound UDP address, if the datagram front end is on.
    udp_addr: Option<SocketAddr>,

    /// Join handle of the TCP client acceptor thread.
    tcp_acceptor_handle: Option<JoinHandle<()>>,

    /// Join handle of the UDP servant thread.
    udp_servant_handle: Option<JoinHandle<()>>,
}

// ExternalApi public API implementation
impl ExternalApi {
    /// Creates a new external API module.
    pub(crate) fn new() -> Self {
        ExternalApi {
            rx_req: None,
            tcp_addr: None,
            udp_addr: None,
            tcp_acceptor_handle: None,
            udp_servant_handle: None,
        }
    }

    /// Creates the req channel of capacity `chan_req_cap`, binds the TCP
    /// listener at `api_addr`, and spawns the client acceptor thread. If
    /// `enable_udp` is set, also binds a UDP socket on the same port (or a
    /// fresh one if `api_addr` asks for any port) and spawns its servant.
    pub(crate) async fn setup(
        &mut self,
        api_addr: SocketAddr,
        enable_udp: bool,
        chan_req_cap: usize,
    ) -> Result<(), ChaseError> {
        if self.tcp_acceptor_handle.is_some() {
            return logged_err!("setup already done");
        }
        if chan_req_cap == 0 {
            return logged_err!("invalid chan_req_cap {}", chan_req_cap);
        }

        let (tx_req, rx_req) = mpsc::channel(chan_req_cap);
        self.rx_req = Some(rx_req);

        let tcp_listener = tcp_bind_with_retry(api_addr, 3).await?;
        let tcp_addr = tcp_listener.local_addr()?;
        self.tcp_addr = Some(tcp_addr);

        if enable_udp {
            let udp_socket = UdpSocket::bind(api_addr).await?;
            let udp_addr = udp_socket.local_addr()?;
            pf_info!("accepting datagrams on '{}'", udp_addr);
            self.udp_addr = Some(udp_addr);
            self.udp_servant_handle = Some(tokio::spawn(
                Self::udp_servant_thread(udp_socket, tx_req.clone()),
            ));
        }

        self.tcp_acceptor_handle = Some(tokio::spawn(
            Self::tcp_acceptor_thread(tx_req, tcp_listener),
        ));

        Ok(())
    }

    /// Gets the bound TCP address.
    pub(crate) fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Gets the bound UDP address.
    pub(crate) fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Waits for the next request from any client. Cancellation-safe.
    pub(crate) async fn get_req(&mut self) -> Result<IncomingReq, ChaseError> {
        match self.rx_req {
            Some(ref mut rx_req) => match rx_req.recv().await {
                Some(incoming) => Ok(incoming),
                None => logged_err!("req channel has been closed"),
            },
            None => logged_err!("get_req called before setup"),
        }
    }
}

impl Drop for ExternalApi {
    fn drop(&mut self) {
        if let Some(handle) = self.tcp_acceptor_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.udp_servant_handle.take() {
            handle.abort();
        }
    }
}

// ExternalApi tcp_acceptor thread implementation
impl ExternalApi {
    /// TCP client acceptor thread function.
    async fn tcp_acceptor_thread(
        tx_req: mpsc::Sender<IncomingReq>,
        listener: TcpListener,
    ) {
        pf_debug!("tcp_acceptor thread spawned");
        match listener.local_addr() {
            Ok(addr) => pf_info!("accepting clients on '{}'", addr),
            Err(e) => pf_warn!("error getting listener address: {}", e),
        }

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    pf_warn!("error accepting client connection: {}", e);
                    continue;
                }
            };
            pf_debug!("accepted connection from {}", addr);

            tokio::spawn(Self::tcp_servant_thread(
                addr,
                stream,
                tx_req.clone(),
            ));
        }
    }
}

// ExternalApi tcp_servant thread implementation
impl ExternalApi {
    /// Per-connection request reader and reply writer thread function.
    /// Requests on one connection are strictly one at a time.
    async fn tcp_servant_thread(
        addr: SocketAddr,
        mut conn: TcpStream,
        tx_req: mpsc::Sender<IncomingReq>,
    ) {
        // receive client ID
        let id = match time::timeout(CLIENT_ID_TIMEOUT, conn.read_u64()).await
        {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                pf_error!("error receiving client ID from {}: {}", addr, e);
                return;
            }
            Err(_) => {
                pf_warn!("no client ID from {} in time, dropping", addr);
                return;
            }
        };
        pf_info!("accepted new client {} from {}", id, addr);

        let (mut conn_read, conn_write) = conn.into_split();
        let mut read_buf = BytesMut::with_capacity(8 + 1024);
        let mut write_buf = BytesMut::with_capacity(8 + 1024);
        let mut write_buf_cursor = 0;

        loop {
            let req: ApiRequest =
                match safe_tcp_read(&mut read_buf, &mut conn_read).await {
                    Ok(req) => req,
                    Err(e) => {
                        pf_warn!("error reading from client {}: {}", id, e);
                        break;
                    }
                };
            let leaving = req == ApiRequest::Leave;

            let (tx_reply, rx_reply) = oneshot::channel();
            if let Err(e) = tx_req.send((id, req, tx_reply)).await {
                pf_error!("error sending to req channel: {}", e);
                break;
            }

            match rx_reply.await {
                Ok(reply) => {
                    if let Err(e) = safe_tcp_write_insist(
                        &mut write_buf,
                        &mut write_buf_cursor,
                        &conn_write,
                        &reply,
                    )
                    .await
                    {
                        pf_error!("error replying to {}: {}", id, e);
                        break;
                    }
                }
                Err(_) => {
                    pf_debug!("request from {} left without reply", id);
                }
            }

            if leaving {
                pf_info!("client {} has left", id);
                break;
            }
        }

        pf_debug!("tcp_servant thread for {} ({}) exited", id, addr);
    }
}

// ExternalApi udp_servant thread implementation
impl ExternalApi {
    /// Encodes and sends one reply datagram. A reply too large for a single
    /// datagram is replaced by a `SystemErr` result.
    async fn send_datagram(
        socket: &UdpSocket,
        peer: SocketAddr,
        reply: &ApiReply,
    ) -> Result<(), ChaseError> {
        let mut bytes =
            bincode::encode_to_vec(reply, bincode::config::standard())?;
        if bytes.len() > MAX_DATAGRAM {
            if let ApiReply::Reply { xid, .. } = *reply {
                pf_warn!(
                    "reply to {} of {} bytes too large for a datagram",
                    peer,
                    bytes.len()
                );
                bytes = bincode::encode_to_vec(
                    &ApiReply::Reply {
                        xid,
                        result: CallResult::SystemErr,
                    },
                    bincode::config::standard(),
                )?;
            }
        }
        socket.send_to(&bytes, peer).await?;
        Ok(())
    }

    /// Datagram request listener and reply sender thread function.
    async fn udp_servant_thread(
        socket: UdpSocket,
        tx_req: mpsc::Sender<IncomingReq>,
    ) {
        pf_debug!("udp_servant thread spawned");
        let mut recv_buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = match socket.recv_from(&mut recv_buf).await {
                Ok(received) => received,
                Err(e) => {
                    pf_warn!("error receiving datagram: {}", e);
                    continue;
                }
            };
            let req: ApiRequest = match bincode::decode_from_slice(
                &recv_buf[..len],
                bincode::config::standard(),
            ) {
                Ok((req, _)) => req,
                Err(e) => {
                    pf_warn!("undecodable datagram from {}: {}", peer, e);
                    continue;
                }
            };

            let (tx_reply, rx_reply) = oneshot::channel();
            if let Err(e) = tx_req.send((UDP_CLIENT, req, tx_reply)).await {
                pf_error!("error sending to req channel: {}", e);
                break;
            }
            let Ok(reply) = rx_reply.await else {
                pf_debug!("datagram from {} left without reply", peer);
                continue;
            };

            if let Err(e) = Self::send_datagram(&socket, peer, &reply).await {
                pf_error!("error replying to {}: {}", peer, e);
            }
        }
    }
}
