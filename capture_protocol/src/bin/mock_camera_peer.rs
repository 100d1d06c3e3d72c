use capture_protocol::{ImageSource, MockCameraPeer, MockPeerConfig};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mock_camera_peer")]
#[command(about = "Camera-side peer that answers capture triggers with image files")]
struct Args {
    /// Address to bind the TCP listener to
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    address: String,

    /// Directory to serve the newest image from
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Serve this file on every trigger instead of scanning a directory
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Always answer with a failure frame carrying this text
    #[arg(long)]
    fail_with: Option<String>,

    /// Images smaller than this are ignored
    #[arg(long, default_value = "1024")]
    min_image_bytes: usize,

    /// Seconds to wait for the trigger after a client connects
    #[arg(long, default_value = "60")]
    trigger_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    info!("🚀 Starting mock camera peer with args: {:?}", args);

    let image_source = match (args.fail_with, args.file) {
        (Some(message), _) => ImageSource::Failure(Some(message)),
        (None, Some(file)) => ImageSource::Fixed(tokio::fs::read(&file).await?),
        (None, None) => ImageSource::Directory(args.dir),
    };

    let peer = MockCameraPeer::new(MockPeerConfig {
        bind_address: args.address,
        image_source,
        min_image_bytes: args.min_image_bytes,
        trigger_timeout: Duration::from_secs(args.trigger_timeout),
    });
    let listener = peer.bind().await?;

    tokio::select! {
        _ = Arc::new(peer).serve(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
    }

    info!("🛑 Mock camera peer stopped");
    Ok(())
}
