//! # Capture Protocol
//!
//! Stream protocol and transport session for talking to a remote camera peer.
//!
//! This crate provides:
//! - The wire framing (trigger command, 4-byte signed big-endian size header,
//!   payload or diagnostic text)
//! - A transport [`Session`] that owns one stream connection to one peer
//! - A mock camera peer for tests and local development
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use capture_protocol::{
//!     FrameReader, LinkPreconditions, PeerAddress, Session, SessionTimeouts, TcpConnector,
//!     TRIGGER_COMMAND,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let timeouts = SessionTimeouts::default();
//! let connector = TcpConnector::new(timeouts.connect);
//! let mut session = Session::new(PeerAddress::from("127.0.0.1:9000"), timeouts);
//!
//! session.open(&connector, &LinkPreconditions::default()).await?;
//! session.send(TRIGGER_COMMAND.as_bytes()).await?;
//! let frame = FrameReader::default().read_frame(&mut session).await?;
//! session.close().await;
//!
//! println!("Received {:?}", frame);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod mock_peer;
pub mod protocol;

// Re-export commonly used types
pub use client::{
    ConnectionError, LinkPreconditions, PeerAddress, PeerConnector, Session, SessionError,
    SessionTimeouts, TcpConnector,
};
pub use mock_peer::{ImageSource, MockCameraPeer, MockPeerConfig, MockPeerHandle, NO_IMAGE_MESSAGE};
pub use protocol::{
    decode_header, encode_header, write_error_frame, write_payload_frame, Frame, FrameHeader,
    FrameReader, ProtocolError, DEFAULT_MAX_PAYLOAD_BYTES, HEADER_LEN, MAX_DIAGNOSTIC_BYTES,
    TRIGGER_COMMAND, UNKNOWN_PEER_ERROR,
};
