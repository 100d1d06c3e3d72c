use crate::client::{Session, SessionError};
use log::{debug, error, info};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Control string that asks the peer to take a picture.
pub const TRIGGER_COMMAND: &str = "TAKE_PICTURE_SIGNAL\n";

/// Size of the signed big-endian length header.
pub const HEADER_LEN: usize = 4;

/// Upper bound of the diagnostic text read after a failure header.
pub const MAX_DIAGNOSTIC_BYTES: usize = 256;

/// Sanity limit for a positive header (16MB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Reason used when the peer signals a failure without any text.
pub const UNKNOWN_PEER_ERROR: &str = "Unknown Pi Error";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to read image size header: {0}")]
    HeaderTruncated(#[source] SessionError),

    #[error("Connection closed prematurely while reading image body: {0}")]
    BodyTruncated(#[source] SessionError),

    #[error("Pi failed to capture image. Error: {0}")]
    PeerReportedFailure(String),

    #[error("Invalid payload size: {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Decode the 4-byte header as a signed big-endian integer.
pub fn decode_header(header: [u8; HEADER_LEN]) -> i32 {
    i32::from_be_bytes(header)
}

pub fn encode_header(length: i32) -> [u8; HEADER_LEN] {
    length.to_be_bytes()
}

/// What the header announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// A body of exactly this many bytes follows.
    Payload(usize),
    /// Non-positive header: the peer failed, optional diagnostic text follows.
    Failure(i32),
}

impl FrameHeader {
    pub fn from_length(length: i32) -> Self {
        if length <= 0 {
            FrameHeader::Failure(length)
        } else {
            FrameHeader::Payload(length as usize)
        }
    }
}

/// One decoded unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Payload(Vec<u8>),
    Error(String),
}

impl Frame {
    pub fn into_payload(self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Frame::Payload(body) => Ok(body),
            Frame::Error(reason) => Err(ProtocolError::PeerReportedFailure(reason)),
        }
    }
}

/// Decodes the size-prefixed frame protocol from a [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    max_payload_bytes: usize,
    max_diagnostic_bytes: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_diagnostic_bytes: MAX_DIAGNOSTIC_BYTES,
        }
    }
}

impl FrameReader {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            max_payload_bytes,
            ..Self::default()
        }
    }

    /// Read and classify the length header.
    pub async fn read_header<S>(&self, session: &mut Session<S>) -> Result<FrameHeader, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let bytes = session
            .read_exact(HEADER_LEN)
            .await
            .map_err(ProtocolError::HeaderTruncated)?;

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes);
        let length = decode_header(header);
        debug!("📥 Frame header announces {} bytes", length);

        match FrameHeader::from_length(length) {
            FrameHeader::Payload(size) if size > self.max_payload_bytes => {
                Err(ProtocolError::PayloadTooLarge {
                    size,
                    max: self.max_payload_bytes,
                })
            }
            header => Ok(header),
        }
    }

    /// Read what follows `header`: the exact body, or one bounded read of
    /// diagnostic text.
    pub async fn read_body<S>(
        &self,
        session: &mut Session<S>,
        header: FrameHeader,
    ) -> Result<Frame, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match header {
            FrameHeader::Payload(size) => {
                let body = session
                    .read_exact(size)
                    .await
                    .map_err(ProtocolError::BodyTruncated)?;
                info!("📥 Received image body: {} bytes", body.len());
                Ok(Frame::Payload(body))
            }
            FrameHeader::Failure(length) => {
                let text = session.read_up_to(self.max_diagnostic_bytes).await;
                let reason = if text.is_empty() {
                    UNKNOWN_PEER_ERROR.to_string()
                } else {
                    String::from_utf8_lossy(&text).into_owned()
                };
                error!("❌ Peer signalled failure (header {}): {}", length, reason);
                Ok(Frame::Error(reason))
            }
        }
    }

    /// Header then body, with the failure channel kept as [`Frame::Error`].
    pub async fn next_frame<S>(&self, session: &mut Session<S>) -> Result<Frame, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let header = self.read_header(session).await?;
        self.read_body(session, header).await
    }

    /// Read one frame; a peer-reported failure becomes
    /// [`ProtocolError::PeerReportedFailure`].
    pub async fn read_frame<S>(&self, session: &mut Session<S>) -> Result<Frame, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.next_frame(session).await? {
            Frame::Error(reason) => Err(ProtocolError::PeerReportedFailure(reason)),
            frame => Ok(frame),
        }
    }
}

/// Write a payload frame: positive header followed by the body.
pub async fn write_payload_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = i32::try_from(payload.len())
        .ok()
        .filter(|length| *length > 0)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes cannot be framed", payload.len()),
            )
        })?;

    writer.write_all(&encode_header(length)).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Write a failure frame: zero header followed by optional diagnostic text.
pub async fn write_error_frame<W>(writer: &mut W, message: Option<&str>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_header(0)).await?;
    if let Some(message) = message {
        writer.write_all(message.as_bytes()).await?;
    }
    writer.flush().await
}
