//! Framed TCP transport: listener, connection list, and reader loops.
//!
//! Each connection carries whole frames: the writer sends one complete
//! zlib stream per message, the reader accumulates 4096-byte chunks
//! until a short read marks the end of the stream, then decompresses
//! and forwards the payload to the sync layer over a channel. The
//! connection list is capped at `max_connections`; over-cap peers are
//! closed immediately on either direction.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

use super::frame::{deflate, inflate};
use super::{ConnId, NetworkError};

/// Size of one read chunk; a shorter read terminates the frame.
const RECV_CHUNK: usize = 4096;

/// Binds the peer listener with a backlog matching the connection cap.
pub fn bind_listener(addr: SocketAddr, backlog: usize) -> std::io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// One decompressed frame delivered to the sync layer.
#[derive(Debug)]
pub struct InboundFrame {
    pub payload: Vec<u8>,
    pub from: ConnId,
}

/// The broadcast capability the sync layer depends on.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sends `payload` to every live connection except `exclude`.
    async fn broadcast(&self, payload: &[u8], exclude: Option<ConnId>);
}

struct Connection {
    id: ConnId,
    addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
}

/// Listener, connection list, and per-connection reader tasks.
pub struct TcpTransport {
    max_connections: usize,
    connections: Mutex<Vec<Arc<Connection>>>,
    next_id: AtomicU64,
    inbound: mpsc::Sender<InboundFrame>,
}

impl TcpTransport {
    /// Creates a transport that delivers decompressed frames to `inbound`.
    pub fn new(max_connections: usize, inbound: mpsc::Sender<InboundFrame>) -> Arc<Self> {
        Arc::new(Self {
            max_connections,
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            inbound,
        })
    }

    /// Spawns the accept loop on an already bound listener.
    pub fn start(self: &Arc<Self>, listener: TcpListener) {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(err) = transport.admit(stream, addr).await {
                            tracing::warn!(%addr, %err, "inbound connection rejected");
                        }
                    }
                    Err(err) => {
                        tracing::error!(%err, "error accepting connection");
                        return;
                    }
                }
            }
        });
    }

    /// Dials a peer and adds the connection to the list.
    pub async fn connect_to_peer(
        self: &Arc<Self>,
        host: IpAddr,
        port: u16,
    ) -> Result<ConnId, NetworkError> {
        let addr = SocketAddr::new(host, port);
        let stream = TcpStream::connect(addr).await.map_err(NetworkError::Socket)?;
        let id = self.admit(stream, addr).await?;
        tracing::info!(%addr, "connected to peer");
        Ok(id)
    }

    /// Number of currently open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Looks up an existing connection to `host`, if any.
    pub async fn connection_for_host(&self, host: IpAddr) -> Option<ConnId> {
        self.connections
            .lock()
            .await
            .iter()
            .find(|conn| conn.addr.ip() == host)
            .map(|conn| conn.id)
    }

    /// Tracks a new stream and spawns its reader, enforcing the cap.
    async fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<ConnId, NetworkError> {
        let mut connections = self.connections.lock().await;
        if connections.len() >= self.max_connections {
            return Err(NetworkError::ConnectionCap);
        }

        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            addr,
            writer: Mutex::new(write_half),
        });
        connections.push(Arc::clone(&conn));
        drop(connections);

        tracing::info!(%addr, id = conn.id, "connection established");
        let transport = Arc::clone(self);
        let id = conn.id;
        tokio::spawn(async move {
            transport.read_frames(read_half, conn).await;
        });
        Ok(id)
    }

    /// Per-connection reader loop; exits by removing the connection.
    async fn read_frames(self: Arc<Self>, mut read_half: OwnedReadHalf, conn: Arc<Connection>) {
        loop {
            let mut data = Vec::new();
            let mut eof = false;

            loop {
                let mut buf = [0u8; RECV_CHUNK];
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => {
                        data.extend_from_slice(&buf[..n]);
                        if n < RECV_CHUNK {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::error!(addr = %conn.addr, %err, "error receiving data");
                        self.remove_connection(conn.id).await;
                        return;
                    }
                }
            }

            if !data.is_empty() {
                match inflate(&data) {
                    Ok(payload) => {
                        if self
                            .inbound
                            .send(InboundFrame {
                                payload,
                                from: conn.id,
                            })
                            .await
                            .is_err()
                        {
                            // The sync layer is gone; the node is shutting down.
                            self.remove_connection(conn.id).await;
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::error!(addr = %conn.addr, %err, "dropping undecodable connection");
                        self.remove_connection(conn.id).await;
                        return;
                    }
                }
            }

            if eof {
                self.remove_connection(conn.id).await;
                return;
            }
        }
    }

    async fn remove_connection(&self, id: ConnId) {
        let mut connections = self.connections.lock().await;
        if let Some(position) = connections.iter().position(|conn| conn.id == id) {
            let conn = connections.remove(position);
            tracing::info!(addr = %conn.addr, id, "connection closed");
        }
    }
}

#[async_trait]
impl Broadcaster for TcpTransport {
    async fn broadcast(&self, payload: &[u8], exclude: Option<ConnId>) {
        let compressed = deflate(payload);
        let targets: Vec<Arc<Connection>> = self
            .connections
            .lock()
            .await
            .iter()
            .filter(|conn| Some(conn.id) != exclude)
            .cloned()
            .collect();

        for conn in targets {
            let mut writer = conn.writer.lock().await;
            if let Err(err) = writer.write_all(&compressed).await {
                drop(writer);
                tracing::error!(addr = %conn.addr, %err, "error broadcasting to a connection");
                self.remove_connection(conn.id).await;
            }
        }
    }
}
