//! One capture transaction, end to end.
//!
//! Connect to the camera peer, send the trigger, read the framed image, then
//! classify it, locate the device and submit the metadata. Only connection
//! and protocol failures end a transaction early; the collaborators after the
//! frame read degrade to fallback values. The session is closed on every path.

use crate::classifier::Classifier;
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::location::{resolve_location, Coordinates, LocationProvider, DEFAULT_LOCATION_TIMEOUT};
use crate::metadata::{iso_local_timestamp, ImageMetadata, MetadataSink};
use async_trait::async_trait;
use capture_protocol::{
    FrameReader, LinkPreconditions, PeerAddress, PeerConnector, Session, SessionTimeouts,
    TRIGGER_COMMAND,
};
use chrono::Local;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Reason reported when a capture is requested while another is running.
pub const CAPTURE_IN_PROGRESS: &str = "Capture already in progress";

/// Reason recorded when the peer framed an image with no bytes.
pub const NO_PAYLOAD: &str = "No image data received from peer";

/// States a transaction passes through, in order.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CaptureState {
    Idle,
    Connecting,
    Signaling,
    ReceivingHeader,
    ReceivingBody,
    Classifying,
    LocatingDevice,
    Submitting,
    Done,
    Failed(String),
    /// Resource release, always last.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Image received; category and location may be degraded sentinels.
    Done(CaptureResult),
    /// The peer answered with an empty body. A zero length header is a
    /// failure frame, so a conforming peer never produces this.
    NoPayload,
    /// The transaction failed; the reason is meant for the user.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    pub outcome: CaptureOutcome,
    pub states: Vec<CaptureState>,
}

/// Post-capture step run after a successful transaction, e.g. persisting
/// the image or updating a screen.
#[async_trait]
pub trait CaptureListener: Send + Sync {
    async fn on_capture(&self, result: &CaptureResult);
}

struct StateTrace(Vec<CaptureState>);

impl StateTrace {
    fn new() -> Self {
        Self(vec![CaptureState::Idle])
    }

    fn enter(&mut self, state: CaptureState) {
        debug!("➡️ Capture state: {}", state);
        self.0.push(state);
    }
}

/// Drives capture transactions against one peer, one at a time.
pub struct CaptureOrchestrator<C: PeerConnector> {
    connector: C,
    peer: PeerAddress,
    preconditions: LinkPreconditions,
    timeouts: SessionTimeouts,
    frame_reader: FrameReader,
    classifier: Arc<dyn Classifier>,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
    metadata_sink: Arc<dyn MetadataSink>,
    listener: Option<Arc<dyn CaptureListener>>,
    in_flight: Mutex<()>,
}

fn no_payload(trace: &mut StateTrace) -> CaptureOutcome {
    warn!("{}", NO_PAYLOAD);
    trace.enter(CaptureState::Failed(NO_PAYLOAD.to_string()));
    CaptureOutcome::NoPayload
}

impl<C: PeerConnector> CaptureOrchestrator<C> {
    pub fn new(
        connector: C,
        peer: PeerAddress,
        classifier: Arc<dyn Classifier>,
        location: Arc<dyn LocationProvider>,
        metadata_sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self {
            connector,
            peer,
            preconditions: LinkPreconditions::default(),
            timeouts: SessionTimeouts::default(),
            frame_reader: FrameReader::default(),
            classifier,
            location,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            metadata_sink,
            listener: None,
            in_flight: Mutex::new(()),
        }
    }

    pub fn from_config(
        config: &CaptureConfig,
        connector: C,
        classifier: Arc<dyn Classifier>,
        location: Arc<dyn LocationProvider>,
        metadata_sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self::new(
            connector,
            config.peer_address.clone(),
            classifier,
            location,
            metadata_sink,
        )
        .with_preconditions(config.preconditions)
        .with_timeouts(config.session_timeouts)
        .with_frame_reader(FrameReader::new(config.max_payload_bytes))
        .with_location_timeout(config.location_timeout)
    }

    pub fn with_preconditions(mut self, preconditions: LinkPreconditions) -> Self {
        self.preconditions = preconditions;
        self
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_frame_reader(mut self, frame_reader: FrameReader) -> Self {
        self.frame_reader = frame_reader;
        self
    }

    pub fn with_location_timeout(mut self, limit: Duration) -> Self {
        self.location_timeout = limit;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn CaptureListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Update the link state, e.g. after the user enabled the radio.
    pub fn set_preconditions(&mut self, preconditions: LinkPreconditions) {
        self.preconditions = preconditions;
    }

    /// Run one capture transaction.
    ///
    /// A request that arrives while another transaction is in flight is
    /// rejected without touching the peer.
    pub async fn capture(&self) -> CaptureReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("⚠️ {}; ignoring request", CAPTURE_IN_PROGRESS);
            return CaptureReport {
                outcome: CaptureOutcome::Failed(CAPTURE_IN_PROGRESS.to_string()),
                states: Vec::new(),
            };
        };

        info!("📸 Capture requested from {}", self.peer);
        let mut trace = StateTrace::new();
        let mut session = Session::new(self.peer.clone(), self.timeouts);

        let outcome = self.run(&mut session, &mut trace).await;

        session.close().await;
        trace.enter(CaptureState::Closed);

        CaptureReport {
            outcome,
            states: trace.0,
        }
    }

    async fn run(&self, session: &mut Session<C::Stream>, trace: &mut StateTrace) -> CaptureOutcome {
        let image = match self.receive_image(session, trace).await {
            Ok(image) => image,
            Err(e) => {
                let reason = e.to_string();
                error!("❌ Capture failed: {}", reason);
                trace.enter(CaptureState::Failed(reason.clone()));
                return CaptureOutcome::Failed(reason);
            }
        };

        if image.is_empty() {
            return no_payload(trace);
        }

        CaptureOutcome::Done(self.process(image, trace).await)
    }

    async fn receive_image(
        &self,
        session: &mut Session<C::Stream>,
        trace: &mut StateTrace,
    ) -> Result<Vec<u8>, CaptureError> {
        trace.enter(CaptureState::Connecting);
        session.open(&self.connector, &self.preconditions).await?;

        trace.enter(CaptureState::Signaling);
        session.send(TRIGGER_COMMAND.as_bytes()).await?;
        debug!("📤 Trigger sent: {:?}", TRIGGER_COMMAND);

        trace.enter(CaptureState::ReceivingHeader);
        let header = self.frame_reader.read_header(session).await?;

        trace.enter(CaptureState::ReceivingBody);
        let frame = self.frame_reader.read_body(session, header).await?;

        Ok(frame.into_payload()?)
    }

    async fn process(&self, image: Vec<u8>, trace: &mut StateTrace) -> CaptureResult {
        trace.enter(CaptureState::Classifying);
        let classification = self.classifier.classify(&image).await;
        let category = classification.category;

        trace.enter(CaptureState::LocatingDevice);
        let location: Coordinates =
            resolve_location(self.location.as_ref(), self.location_timeout).await;

        trace.enter(CaptureState::Submitting);
        let timestamp = iso_local_timestamp(Local::now());
        let metadata = ImageMetadata::new(category.clone(), location, timestamp.clone());
        match self.metadata_sink.submit(&metadata).await {
            Ok(()) => info!("✅ Metadata submitted for '{}'", category),
            Err(e) => error!("Failed to send metadata to server: {}", e),
        }

        trace.enter(CaptureState::Done);
        let result = CaptureResult {
            category,
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp,
            image,
        };

        if let Some(listener) = &self.listener {
            listener.on_capture(&result).await;
        }

        info!(
            "✅ Capture complete: '{}' ({} bytes)",
            result.category,
            result.image.len()
        );
        result
    }
}

/// Run one capture per input line until the input closes.
///
/// Captures run on their own tasks so a request arriving mid-transaction is
/// rejected rather than queued. Once the input closes, captures already
/// started are awaited; each finished report is handed to `on_report`.
/// Returns the number of reports delivered.
pub async fn serve_requests<C, R, F>(
    orchestrator: Arc<CaptureOrchestrator<C>>,
    input: R,
    mut on_report: F,
) -> usize
where
    C: PeerConnector + 'static,
    C::Stream: 'static,
    R: AsyncBufRead + Unpin,
    F: FnMut(&CaptureReport),
{
    let mut lines = input.lines();
    let mut in_flight = JoinSet::new();
    let mut delivered = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(_)) => {
                        let orchestrator = Arc::clone(&orchestrator);
                        in_flight.spawn(async move { orchestrator.capture().await });
                    }
                    Ok(None) => {
                        info!("Input closed; waiting for {} capture(s) in flight", in_flight.len());
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                }
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                delivered += deliver(joined, &mut on_report);
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        delivered += deliver(joined, &mut on_report);
    }
    delivered
}

fn deliver<F>(joined: Result<CaptureReport, tokio::task::JoinError>, on_report: &mut F) -> usize
where
    F: FnMut(&CaptureReport),
{
    match joined {
        Ok(report) => {
            on_report(&report);
            1
        }
        Err(e) => {
            error!("Capture task ended abnormally: {}", e);
            0
        }
    }
}
