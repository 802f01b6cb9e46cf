//! TCP transport: length-prefixed JSON frames.
//!
//! Each frame is a big-endian `u32` byte count followed by one JSON
//! document. A client opens one connection per call; the server answers
//! frames on a connection until the peer closes it.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

use super::{dispatch, HostRequest, HostResponse, HostService, Transport};
use crate::error::RuntimeError;
use crate::types::HostId;
use simdist_config::TransportConfig;

/// Largest frame accepted from a peer.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

async fn write_frame<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|&n| n as usize <= MAX_FRAME_BYTES)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Read one frame, or `None` on a clean end of stream.
async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Client side of the TCP transport.
#[derive(Debug, Default)]
pub struct TcpTransport {
    peers: RwLock<HashMap<HostId, SocketAddr>>,
}

impl TcpTransport {
    pub fn new(peers: HashMap<HostId, SocketAddr>) -> Self {
        Self {
            peers: RwLock::new(peers),
        }
    }

    /// Build from the `[transport]` config section.
    pub fn from_config(config: &TransportConfig) -> Result<Self, RuntimeError> {
        let peers = config
            .peer_addrs()?
            .into_iter()
            .map(|(host, addr)| (HostId::new(host), addr))
            .collect();
        Ok(Self::new(peers))
    }

    pub fn add_peer(&self, host: HostId, addr: SocketAddr) {
        self.peers.write().insert(host, addr);
    }

    pub fn peer_addr(&self, host: &HostId) -> Option<SocketAddr> {
        self.peers.read().get(host).copied()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(
        &self,
        host: &HostId,
        request: HostRequest,
    ) -> Result<HostResponse, RuntimeError> {
        let addr = self
            .peer_addr(host)
            .ok_or_else(|| RuntimeError::unreachable(host, "no address known for peer"))?;
        let refused = |e: std::io::Error| RuntimeError::unreachable(host, e.to_string());
        let fail = |e: std::io::Error| RuntimeError::transport(host, e.to_string());

        let mut stream = TcpStream::connect(addr).await.map_err(refused)?;
        stream.set_nodelay(true).map_err(refused)?;
        trace!(host = %host, %addr, call = request.name(), "Sending frame");
        write_frame(&mut stream, &request).await.map_err(fail)?;

        read_frame(&mut stream)
            .await
            .map_err(fail)?
            .ok_or_else(|| RuntimeError::transport(host, "connection closed before response"))
    }
}

async fn handle_connection(mut stream: TcpStream, service: Arc<dyn HostService>) {
    loop {
        let request: HostRequest = match read_frame(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Dropping connection after bad frame");
                return;
            }
        };
        let response = dispatch(service.as_ref(), request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(error = %e, "Peer went away before response");
            return;
        }
    }
}

/// Answer requests on `listener` until the task is cancelled.
pub async fn serve(listener: TcpListener, service: Arc<dyn HostService>) -> Result<(), RuntimeError> {
    info!(
        host = %service.host_id(),
        addr = %listener.local_addr()?,
        "Serving host requests"
    );
    loop {
        let (stream, peer) = listener.accept().await?;
        trace!(%peer, "Accepted connection");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle");
        }
        tokio::spawn(handle_connection(stream, service.clone()));
    }
}
