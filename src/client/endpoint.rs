//! Client endpoints: a common trait over the TCP and UDP transports used to
//! reach the lookup server.

use std::net::SocketAddr;

use crate::server::{ApiReply, ApiRequest, MAX_DATAGRAM};
use crate::utils::{
    safe_tcp_read, safe_tcp_write_insist, tcp_connect_with_retry, ChaseError,
};

use async_trait::async_trait;

use bytes::BytesMut;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UdpSocket;

/// Client ID type.
pub type ClientId = u64;

/// Transport kind a client talks over.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl TransportKind {
    /// Parse command line string into `TransportKind` enum.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    /// Creates an unconnected endpoint of this kind towards `server`, with a
    /// random client ID.
    pub fn new_endpoint(self, server: SocketAddr) -> Box<dyn GenericEndpoint> {
        let id: ClientId = rand::random();
        match self {
            Self::Tcp => Box::new(TcpEndpoint::new(id, server)),
            Self::Udp => Box::new(UdpEndpoint::new(id, server)),
        }
    }
}

/// Client endpoint trait implemented by every transport.
#[async_trait]
pub trait GenericEndpoint: Send {
    /// Establishes connection to the server.
    async fn connect(&mut self) -> Result<(), ChaseError>;

    /// Leaves the server: sends a leave notification and forgets about the
    /// connection. A no-op if not connected.
    async fn leave(&mut self) -> Result<(), ChaseError>;

    /// Sends a request to the server.
    async fn send_req(&mut self, req: &ApiRequest) -> Result<(), ChaseError>;

    /// Receives a reply from the server. Cancellation-safe.
    async fn recv_reply(&mut self) -> Result<ApiReply, ChaseError>;

    /// Gets my client ID.
    fn id(&self) -> ClientId;
}

/// Endpoint speaking length-prefixed frames over one TCP connection.
pub struct TcpEndpoint {
    /// My client ID.
    id: ClientId,

    /// Server address.
    server: SocketAddr,

    /// Read-half split of the TCP connection stream.
    conn_read: Option<OwnedReadHalf>,

    /// Write-half split of the TCP connection stream.
    conn_write: Option<OwnedWriteHalf>,

    /// Partially received frame.
    read_buf: BytesMut,

    /// Frame being sent.
    write_buf: BytesMut,

    /// Bytes of `write_buf` already sent.
    write_buf_cursor: usize,
}

impl TcpEndpoint {
    /// Creates a new unconnected TCP endpoint.
    pub fn new(id: ClientId, server: SocketAddr) -> Self {
        TcpEndpoint {
            id,
            server,
            conn_read: None,
            conn_write: None,
            read_buf: BytesMut::with_capacity(8 + 1024),
            write_buf: BytesMut::with_capacity(8 + 1024),
            write_buf_cursor: 0,
        }
    }
}

#[async_trait]
impl GenericEndpoint for TcpEndpoint {
    async fn connect(&mut self) -> Result<(), ChaseError> {
        if self.conn_write.is_some() {
            return logged_err!("already connected to {}", self.server);
        }

        let mut stream = tcp_connect_with_retry(self.server, 3).await?;
        stream.write_u64(self.id).await?; // send my client ID
        let (conn_read, conn_write) = stream.into_split();
        self.conn_read = Some(conn_read);
        self.conn_write = Some(conn_write);
        pf_info!("connected to server {} over tcp", self.server);
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), ChaseError> {
        if self.conn_write.is_none() {
            return Ok(());
        }

        self.send_req(&ApiRequest::Leave).await?;
        loop {
            // skip late replies to earlier calls
            if self.recv_reply().await? == ApiReply::Leave {
                break;
            }
        }

        self.conn_read = None;
        self.conn_write = None;
        self.read_buf.clear();
        self.write_buf.clear();
        self.write_buf_cursor = 0;
        pf_info!("left server {}", self.server);
        Ok(())
    }

    async fn send_req(&mut self, req: &ApiRequest) -> Result<(), ChaseError> {
        let Some(conn_write) = self.conn_write.as_ref() else {
            return logged_err!("send_req called before connect");
        };
        safe_tcp_write_insist(
            &mut self.write_buf,
            &mut self.write_buf_cursor,
            conn_write,
            req,
        )
        .await
    }

    async fn recv_reply(&mut self) -> Result<ApiReply, ChaseError> {
        let Some(conn_read) = self.conn_read.as_mut() else {
            return logged_err!("recv_reply called before connect");
        };
        safe_tcp_read(&mut self.read_buf, conn_read).await
    }

    fn id(&self) -> ClientId {
        self.id
    }
}

/// Endpoint sending one datagram per request.
pub struct UdpEndpoint {
    /// My client ID.
    id: ClientId,

    /// Server address.
    server: SocketAddr,

    /// Socket connected to the server address.
    socket: Option<UdpSocket>,

    /// Buffer for one incoming datagram.
    recv_buf: Vec<u8>,
}

impl UdpEndpoint {
    /// Creates a new unconnected UDP endpoint.
    pub fn new(id: ClientId, server: SocketAddr) -> Self {
        UdpEndpoint {
            id,
            server,
            socket: None,
            recv_buf: vec![0u8; MAX_DATAGRAM],
        }
    }
}

#[async_trait]
impl GenericEndpoint for UdpEndpoint {
    async fn connect(&mut self) -> Result<(), ChaseError> {
        if self.socket.is_some() {
            return logged_err!("already connected to {}", self.server);
        }

        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;
        self.socket = Some(socket);
        pf_info!("connected to server {} over udp", self.server);
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), ChaseError> {
        if self.socket.is_none() {
            return Ok(());
        }

        // datagrams may be lost, so the leave reply is not awaited
        self.send_req(&ApiRequest::Leave).await?;
        self.socket = None;
        pf_info!("left server {}", self.server);
        Ok(())
    }

    async fn send_req(&mut self, req: &ApiRequest) -> Result<(), ChaseError> {
        let Some(socket) = self.socket.as_ref() else {
            return logged_err!("send_req called before connect");
        };
        let bytes = bincode::encode_to_vec(req, bincode::config::standard())?;
        socket.send(&bytes).await?;
        Ok(())
    }

    async fn recv_reply(&mut self) -> Result<ApiReply, ChaseError> {
        let Some(socket) = self.socket.as_ref() else {
            return logged_err!("recv_reply called before connect");
        };
        let len = socket.recv(&mut self.recv_buf).await?;
        let (reply, _) = bincode::decode_from_slice(
            &self.recv_buf[..len],
            bincode::config::standard(),
        )?;
        Ok(reply)
    }

    fn id(&self) -> ClientId {
        self.id
    }
}
