use crate::protocol::{write_error_frame, write_payload_frame, TRIGGER_COMMAND};
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Diagnostic text sent when no image can be served.
pub const NO_IMAGE_MESSAGE: &str = "ERROR: No image available.";

const TRIGGER_READ_BYTES: usize = 1024;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Where the peer takes its "captured" image from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Newest image file in the directory.
    Directory(PathBuf),
    /// Always the same bytes.
    Fixed(Vec<u8>),
    /// Always fail, with optional diagnostic text.
    Failure(Option<String>),
}

/// Configuration for the mock camera peer
#[derive(Debug, Clone)]
pub struct MockPeerConfig {
    /// Address to bind the TCP listener to (use "127.0.0.1:0" for random port)
    pub bind_address: String,
    pub image_source: ImageSource,
    /// Files smaller than this are treated as incomplete captures
    pub min_image_bytes: usize,
    /// How long to wait for the trigger after a client connects
    pub trigger_timeout: Duration,
}

impl Default for MockPeerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            image_source: ImageSource::Directory(PathBuf::from(".")),
            min_image_bytes: 1024,
            trigger_timeout: Duration::from_secs(60),
        }
    }
}

/// Camera-side peer: answers each trigger with one frame, then disconnects.
pub struct MockCameraPeer {
    config: MockPeerConfig,
    triggers: Arc<AtomicUsize>,
}

impl MockCameraPeer {
    pub fn new(config: MockPeerConfig) -> Self {
        info!("📷 Mock camera peer configured:");
        info!("  🔌 Bind: {}", config.bind_address);
        info!("  🖼️ Source: {:?}", Self::describe(&config.image_source));
        info!("  📏 Minimum image size: {} bytes", config.min_image_bytes);

        Self {
            config,
            triggers: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn describe(source: &ImageSource) -> String {
        match source {
            ImageSource::Directory(dir) => format!("directory {}", dir.display()),
            ImageSource::Fixed(bytes) => format!("fixed image of {} bytes", bytes.len()),
            ImageSource::Failure(message) => format!("failure ({:?})", message),
        }
    }

    pub async fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        info!(
            "📷 Mock camera peer listening on {}",
            listener.local_addr()?
        );
        Ok(listener)
    }

    /// Accept connections one at a time until the task is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, address)) => {
                    info!("📡 Accepted connection from {}", address);
                    if let Err(e) = self.handle_client(stream).await {
                        error!("Client {} error: {}", address, e);
                    }
                    info!("🔌 Client {} disconnected. Waiting for next connection...", address);
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                }
            }
        }
    }

    /// Start the peer in a background task and return a handle for testing
    pub async fn start_background(self) -> io::Result<MockPeerHandle> {
        let listener = self.bind().await?;
        let address = listener.local_addr()?;
        let triggers = self.triggers.clone();
        let task = tokio::spawn(Arc::new(self).serve(listener));

        Ok(MockPeerHandle {
            address,
            triggers,
            task,
        })
    }

    async fn handle_client(&self, mut stream: TcpStream) -> io::Result<()> {
        let mut buffer = vec![0u8; TRIGGER_READ_BYTES];
        let read = match timeout(self.config.trigger_timeout, stream.read(&mut buffer)).await {
            Ok(read) => read?,
            Err(_) => {
                warn!("⚠️ No trigger within {:?}", self.config.trigger_timeout);
                return Ok(());
            }
        };

        let text = String::from_utf8_lossy(&buffer[..read]);
        let text = text.trim();
        if text.is_empty() || text.starts_with(TRIGGER_COMMAND.trim_end()) {
            info!("📸 Trigger received");
        } else {
            warn!("⚠️ Unexpected signal: {:?}. Proceeding anyway...", text);
        }
        self.triggers.fetch_add(1, Ordering::SeqCst);

        match self.capture().await {
            Ok(image) => {
                write_payload_frame(&mut stream, &image).await?;
                info!("📤 Sent image ({} bytes) with 4-byte header", image.len());
            }
            Err(message) => {
                write_error_frame(&mut stream, message.as_deref()).await?;
                info!("📤 Sent error frame (size=0)");
            }
        }

        stream.shutdown().await
    }

    async fn capture(&self) -> Result<Vec<u8>, Option<String>> {
        match &self.config.image_source {
            ImageSource::Fixed(bytes) if !bytes.is_empty() => Ok(bytes.clone()),
            ImageSource::Fixed(_) => Err(Some(NO_IMAGE_MESSAGE.to_string())),
            ImageSource::Failure(message) => Err(message.clone()),
            ImageSource::Directory(dir) => {
                let Some(path) = latest_image(dir, self.config.min_image_bytes).await else {
                    warn!("⚠️ No image found in {}", dir.display());
                    return Err(Some(NO_IMAGE_MESSAGE.to_string()));
                };
                debug!("🖼️ Serving {}", path.display());
                match tokio::fs::read(&path).await {
                    Ok(bytes) if bytes.len() >= self.config.min_image_bytes => Ok(bytes),
                    Ok(_) => Err(Some(NO_IMAGE_MESSAGE.to_string())),
                    Err(e) => {
                        error!("File read error ({}): {}", path.display(), e);
                        Err(Some(NO_IMAGE_MESSAGE.to_string()))
                    }
                }
            }
        }
    }
}

/// Newest image file in `dir` that is at least `min_bytes` long.
pub async fn latest_image(dir: &Path, min_bytes: usize) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !is_image {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() || (metadata.len() as usize) < min_bytes {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path)
}

/// Handle for a mock peer running in the background
pub struct MockPeerHandle {
    address: SocketAddr,
    triggers: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockPeerHandle {
    pub fn address(&self) -> String {
        self.address.to_string()
    }

    /// Number of triggers received so far.
    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MockPeerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_latest_image_skips_small_and_foreign_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("capture_0.png"), vec![1u8; 10]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), vec![1u8; 4096]).unwrap();
        assert_eq!(latest_image(dir.path(), 1024).await, None);

        std::fs::write(dir.path().join("capture_1.png"), vec![1u8; 2048]).unwrap();
        assert_eq!(
            latest_image(dir.path(), 1024).await,
            Some(dir.path().join("capture_1.png"))
        );
    }

    #[tokio::test]
    async fn test_latest_image_missing_directory() {
        assert_eq!(
            latest_image(Path::new("/definitely/not/here"), 1).await,
            None
        );
    }

    #[tokio::test]
    async fn test_fixed_empty_image_is_a_failure() {
        let peer = MockCameraPeer::new(MockPeerConfig {
            image_source: ImageSource::Fixed(Vec::new()),
            ..MockPeerConfig::default()
        });
        assert_eq!(
            peer.capture().await,
            Err(Some(NO_IMAGE_MESSAGE.to_string()))
        );
    }
}
