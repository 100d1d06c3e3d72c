use async_trait::async_trait;
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Radio is disabled; enable it before connecting to {0}")]
    RadioDisabled(PeerAddress),

    #[error("Peer {0} is not paired")]
    PeerNotPaired(PeerAddress),

    #[error("Could not resolve peer {peer}: {reason}")]
    Unresolvable { peer: PeerAddress, reason: String },

    #[error("Timed out connecting to {0}")]
    Timeout(PeerAddress),

    #[error("Connection to {peer} failed: {source}")]
    Connect {
        peer: PeerAddress,
        #[source]
        source: io::Error,
    },

    #[error("Session to {0} was already opened once")]
    SessionReused(PeerAddress),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is not open")]
    NotOpen,

    #[error("Stream closed after {received} of {expected} bytes")]
    PrematureClose { expected: usize, received: usize },

    #[error("Stream operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Opaque identifier of the remote peer (a `host:port` pair for TCP).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Local link state checked before a connection attempt.
///
/// Neither condition is retried or repaired here; the caller has to fix the
/// link and request a new capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPreconditions {
    pub radio_enabled: bool,
    pub peer_paired: bool,
}

impl Default for LinkPreconditions {
    fn default() -> Self {
        Self {
            radio_enabled: true,
            peer_paired: true,
        }
    }
}

impl LinkPreconditions {
    pub fn check(&self, peer: &PeerAddress) -> Result<(), ConnectionError> {
        if !self.radio_enabled {
            return Err(ConnectionError::RadioDisabled(peer.clone()));
        }
        if !self.peer_paired {
            return Err(ConnectionError::PeerNotPaired(peer.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
            write: Duration::from_secs(10),
        }
    }
}

/// Establishes the raw stream behind a [`Session`].
#[async_trait]
pub trait PeerConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Stop any discovery or advertisement activity that would slow down
    /// connection establishment.
    async fn cancel_discovery(&self) {}

    /// Resolve `peer` and connect to it. Must not retry.
    async fn connect(&self, peer: &PeerAddress) -> Result<Self::Stream, ConnectionError>;
}

/// Connects to `host:port` peers over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn resolve(&self, peer: &PeerAddress) -> Result<Vec<SocketAddr>, ConnectionError> {
        let addrs: Vec<SocketAddr> = lookup_host(peer.as_str())
            .await
            .map_err(|e| ConnectionError::Unresolvable {
                peer: peer.clone(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ConnectionError::Unresolvable {
                peer: peer.clone(),
                reason: "no addresses found".to_string(),
            });
        }
        Ok(addrs)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(SessionTimeouts::default().connect)
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, peer: &PeerAddress) -> Result<TcpStream, ConnectionError> {
        let addrs = self.resolve(peer).await?;

        let mut last_error = None;
        for addr in addrs {
            debug!("📡 Trying {} for peer {}", addr, peer);
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true).ok();
                    return Ok(stream);
                }
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => return Err(ConnectionError::Timeout(peer.clone())),
            }
        }

        Err(ConnectionError::Connect {
            peer: peer.clone(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address")),
        })
    }
}

enum SessionState<S> {
    Idle,
    Open(S),
    Closed,
}

/// One stream connection to one peer.
///
/// A session moves `Idle -> Open -> Closed` and never goes back. Dropping it
/// releases the underlying stream, so a torn-down capture task still
/// disconnects from the peer.
pub struct Session<S> {
    peer: PeerAddress,
    state: SessionState<S>,
    timeouts: SessionTimeouts,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(peer: PeerAddress, timeouts: SessionTimeouts) -> Self {
        Self {
            peer,
            state: SessionState::Idle,
            timeouts,
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(peer: PeerAddress, stream: S, timeouts: SessionTimeouts) -> Self {
        Self {
            peer,
            state: SessionState::Open(stream),
            timeouts,
        }
    }

    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// Check the link, cancel discovery and connect. Fails fast on every error.
    pub async fn open<C>(
        &mut self,
        connector: &C,
        preconditions: &LinkPreconditions,
    ) -> Result<(), ConnectionError>
    where
        C: PeerConnector<Stream = S> + ?Sized,
    {
        if !matches!(self.state, SessionState::Idle) {
            return Err(ConnectionError::SessionReused(self.peer.clone()));
        }

        preconditions.check(&self.peer)?;
        connector.cancel_discovery().await;

        info!("📡 Connecting to camera peer at {}", self.peer);
        let stream = connector.connect(&self.peer).await?;
        self.state = SessionState::Open(stream);
        info!("✅ Connected to camera peer {}", self.peer);

        Ok(())
    }

    fn stream_mut(&mut self) -> Result<&mut S, SessionError> {
        match &mut self.state {
            SessionState::Open(stream) => Ok(stream),
            _ => Err(SessionError::NotOpen),
        }
    }

    /// Write all of `bytes` and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let write_timeout = self.timeouts.write;
        let stream = self.stream_mut()?;

        timeout(write_timeout, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| SessionError::Timeout(write_timeout))??;

        debug!("📤 Sent {} bytes", bytes.len());
        Ok(())
    }

    /// Read exactly `n` bytes, accumulating as many partial reads as needed.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, SessionError> {
        let read_timeout = self.timeouts.read;
        let stream = self.stream_mut()?;

        let mut buffer = vec![0u8; n];
        let mut received = 0;
        while received < n {
            let read = timeout(read_timeout, stream.read(&mut buffer[received..]))
                .await
                .map_err(|_| SessionError::Timeout(read_timeout))??;
            if read == 0 {
                return Err(SessionError::PrematureClose {
                    expected: n,
                    received,
                });
            }
            received += read;
        }

        Ok(buffer)
    }

    /// Single best-effort read of at most `max_bytes`.
    ///
    /// Errors, timeouts and end of stream all yield an empty buffer.
    pub async fn read_up_to(&mut self, max_bytes: usize) -> Vec<u8> {
        let read_timeout = self.timeouts.read;
        let Ok(stream) = self.stream_mut() else {
            return Vec::new();
        };

        let mut buffer = vec![0u8; max_bytes];
        match timeout(read_timeout, stream.read(&mut buffer)).await {
            Ok(Ok(read)) => {
                buffer.truncate(read);
                buffer
            }
            Ok(Err(e)) => {
                debug!("Best-effort read failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                debug!("Best-effort read timed out after {:?}", read_timeout);
                Vec::new()
            }
        }
    }

    /// Release the connection. Safe to call repeatedly and on a session that
    /// never opened; shutdown errors are logged and swallowed.
    pub async fn close(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(mut stream) => {
                match timeout(self.timeouts.write, stream.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("⚠️ Error while closing session to {}: {}", self.peer, e),
                    Err(_) => warn!("⚠️ Timed out closing session to {}", self.peer),
                }
                info!("🔌 Session to {} closed", self.peer);
            }
            SessionState::Idle => debug!("Closing session to {} that never opened", self.peer),
            SessionState::Closed => debug!("Session to {} already closed", self.peer),
        }
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Open(_)) {
            warn!(
                "🔌 Session to {} dropped while open; releasing stream",
                self.peer
            );
        }
    }
}
