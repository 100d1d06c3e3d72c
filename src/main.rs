use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use capture_protocol::{PeerAddress, TcpConnector};
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use urbansight_edge::{
    classifier::HttpClassifier,
    config::load_config,
    location::{FixedLocation, LocationProvider, NoLocation},
    metadata::HttpMetadataSink,
    orchestrator::{
        serve_requests, CaptureListener, CaptureOrchestrator, CaptureOutcome, CaptureReport,
        CaptureResult,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera peer address, overrides URBANSIGHT_PEER_ADDRESS
    #[arg(long)]
    peer: Option<String>,

    /// Run a single capture and exit
    #[arg(long)]
    once: bool,
}

/// Tells the user about every completed capture.
struct ConsoleReporter;

#[async_trait]
impl CaptureListener for ConsoleReporter {
    async fn on_capture(&self, result: &CaptureResult) {
        println!(
            "🖼️  Received {} bytes, category '{}' at ({:.6}, {:.6}) {}",
            result.image.len(),
            result.category,
            result.latitude,
            result.longitude,
            result.timestamp
        );
    }
}

fn report(report: &CaptureReport) -> bool {
    match &report.outcome {
        CaptureOutcome::Done(result) => {
            log::info!("Capture finished: '{}'", result.category);
            println!("✅ Data processed and sent to server");
            true
        }
        CaptureOutcome::NoPayload => {
            println!("⚠️  No image data received from peer");
            false
        }
        CaptureOutcome::Failed(reason) => {
            println!("❌ Process failed: {}", reason);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();
    log::info!("🚀 Initializing urbansight-capture");

    let args = Args::parse();
    let mut config = load_config().context("Failed to load configuration")?;
    if let Some(peer) = args.peer {
        config.peer_address = PeerAddress::from(peer);
    }

    // One HTTP client shared by both collaborators
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to create HTTP client")?;
    let classifier = Arc::new(HttpClassifier::with_client(
        http.clone(),
        config.classifier_url.clone(),
    ));
    let metadata_sink = Arc::new(HttpMetadataSink::with_client(
        http,
        config.metadata_url.clone(),
    ));
    let classifier_endpoint = classifier.endpoint().clone();
    let metadata_endpoint = metadata_sink.endpoint().clone();
    let location: Arc<dyn LocationProvider> = match config.fixed_location {
        Some(coordinates) => Arc::new(FixedLocation::new(coordinates)),
        None => Arc::new(NoLocation),
    };

    let connector = TcpConnector::new(config.session_timeouts.connect);
    let orchestrator = Arc::new(
        CaptureOrchestrator::from_config(&config, connector, classifier, location, metadata_sink)
            .with_listener(Arc::new(ConsoleReporter)),
    );
    log::info!("📡 Camera peer: {}", orchestrator.peer());
    log::info!("🏷️ Classifier: {}", classifier_endpoint);
    log::info!("📨 Metadata server: {}", metadata_endpoint);

    if args.once {
        if !report(&orchestrator.capture().await) {
            bail!("Capture did not complete");
        }
        return Ok(());
    }

    println!("📸 Press ENTER to take a picture");
    println!("   Press Ctrl+C to exit");

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        delivered = serve_requests(Arc::clone(&orchestrator), input, |outcome| {
            report(outcome);
        }) => {
            log::info!("Input closed after {} capture(s), shutting down...", delivered);
        }

        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down...");
        }
    }

    println!("\n👋 Goodbye!");
    Ok(())
}
