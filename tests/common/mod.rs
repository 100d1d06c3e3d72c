//! Shared fakes for the capture integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use capture_protocol::{ConnectionError, PeerAddress, PeerConnector};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use urbansight_edge::classifier::{ClassificationOutcome, Classifier};
use urbansight_edge::location::{Coordinates, LocationError, LocationProvider};
use urbansight_edge::metadata::{ImageMetadata, MetadataSink, SubmissionError};
use urbansight_edge::orchestrator::{CaptureListener, CaptureResult};

/// In-memory stream that counts shutdowns.
pub struct CountingStream {
    inner: DuplexStream,
    shutdowns: Arc<AtomicUsize>,
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Hands out one pre-made in-memory connection, or refuses.
pub struct StubConnector {
    stream: Mutex<Option<CountingStream>>,
    pub connects: AtomicUsize,
    pub shutdowns: Arc<AtomicUsize>,
}

impl StubConnector {
    /// Connector plus the peer's end of the connection.
    pub fn connected() -> (Self, DuplexStream) {
        let (local, remote) = duplex(64 * 1024);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: local,
            shutdowns: shutdowns.clone(),
        };
        let connector = Self {
            stream: Mutex::new(Some(stream)),
            connects: AtomicUsize::new(0),
            shutdowns,
        };
        (connector, remote)
    }

    pub fn refusing() -> Self {
        Self {
            stream: Mutex::new(None),
            connects: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PeerConnector for StubConnector {
    type Stream = CountingStream;

    async fn connect(&self, peer: &PeerAddress) -> Result<CountingStream, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ConnectionError::Connect {
                peer: peer.clone(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })
    }
}

/// Read the trigger line sent by the orchestrator.
pub async fn read_trigger(peer: &mut DuplexStream) -> String {
    let mut received = Vec::new();
    let mut byte = [0u8; 1];
    while peer.read(&mut byte).await.unwrap() == 1 {
        received.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    String::from_utf8(received).unwrap()
}

/// Peer task: wait for the trigger, answer with `response`, close.
pub fn scripted_peer(mut peer: DuplexStream, response: Vec<u8>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let trigger = read_trigger(&mut peer).await;
        peer.write_all(&response).await.unwrap();
        peer.shutdown().await.unwrap();
        trigger
    })
}

pub struct RecordingClassifier {
    outcome: ClassificationOutcome,
    pub calls: Mutex<Vec<Vec<u8>>>,
}

impl RecordingClassifier {
    pub fn new(outcome: ClassificationOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, image: &[u8]) -> ClassificationOutcome {
        self.calls.lock().unwrap().push(image.to_vec());
        self.outcome.clone()
    }
}

pub struct StubLocation {
    result: Mutex<Option<Result<Option<Coordinates>, LocationError>>>,
    pub lookups: AtomicUsize,
}

impl StubLocation {
    pub fn new(result: Result<Option<Coordinates>, LocationError>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(result)),
            lookups: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LocationProvider for StubLocation {
    async fn last_known(&self) -> Result<Option<Coordinates>, LocationError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(LocationError::Unavailable("already used".to_string())))
    }
}

pub struct RecordingSink {
    fail: bool,
    pub submitted: Mutex<Vec<ImageMetadata>>,
}

impl RecordingSink {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn submissions(&self) -> Vec<ImageMetadata> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSink for RecordingSink {
    async fn submit(&self, metadata: &ImageMetadata) -> Result<(), SubmissionError> {
        self.submitted.lock().unwrap().push(metadata.clone());
        if self.fail {
            return Err(SubmissionError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub results: Mutex<Vec<CaptureResult>>,
}

#[async_trait]
impl CaptureListener for RecordingListener {
    async fn on_capture(&self, result: &CaptureResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

/// One captured HTTP request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub body: String,
}

/// Minimal HTTP/1.1 server answering every request with `status` and `body`.
pub async fn spawn_http_responder(
    status: &'static str,
    body: &'static str,
) -> (String, Arc<Mutex<Vec<CapturedRequest>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let captured = requests.clone();

    let task = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            let mut buffer = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let read = stream.read(&mut chunk).await.unwrap_or(0);
                if read == 0 {
                    break None;
                }
                buffer.extend_from_slice(&chunk[..read]);
                if let Some(pos) = find(&buffer, b"\r\n\r\n") {
                    break Some(pos + 4);
                }
            };
            let Some(header_end) = header_end else {
                continue;
            };

            let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);

            while buffer.len() < header_end + content_length {
                let read = stream.read(&mut chunk).await.unwrap_or(0);
                if read == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..read]);
            }

            captured.lock().unwrap().push(CapturedRequest {
                request_line: head.lines().next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
            });

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.ok();
            stream.shutdown().await.ok();
        }
    });

    (base_url, requests, task)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
