//! Exercises the transport session and frame reader against the mock camera
//! peer over real TCP connections.

use capture_protocol::{
    Frame, FrameReader, ImageSource, LinkPreconditions, MockCameraPeer, MockPeerConfig,
    PeerAddress, ProtocolError, Session, SessionTimeouts, TcpConnector, NO_IMAGE_MESSAGE,
    TRIGGER_COMMAND,
};
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpStream;

fn timeouts() -> SessionTimeouts {
    SessionTimeouts {
        connect: Duration::from_secs(2),
        read: Duration::from_secs(5),
        write: Duration::from_secs(2),
    }
}

async fn trigger(address: String) -> Result<Frame, ProtocolError> {
    let connector = TcpConnector::new(timeouts().connect);
    let mut session: Session<TcpStream> = Session::new(PeerAddress::from(address), timeouts());

    session
        .open(&connector, &LinkPreconditions::default())
        .await
        .expect("Failed to connect to mock peer");
    session
        .send(TRIGGER_COMMAND.as_bytes())
        .await
        .expect("Failed to send trigger");

    let frame = FrameReader::default().read_frame(&mut session).await;
    session.close().await;
    assert!(session.is_closed());
    frame
}

#[tokio::test]
async fn test_fixed_image_round_trip() {
    env_logger::try_init().ok();

    let image: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let peer = MockCameraPeer::new(MockPeerConfig {
        image_source: ImageSource::Fixed(image.clone()),
        ..MockPeerConfig::default()
    })
    .start_background()
    .await
    .expect("Failed to start mock peer");

    let frame = trigger(peer.address()).await.unwrap();
    assert_eq!(frame, Frame::Payload(image));
    assert_eq!(peer.triggers(), 1);
}

#[tokio::test]
async fn test_failure_frame_carries_peer_message() {
    env_logger::try_init().ok();

    let peer = MockCameraPeer::new(MockPeerConfig {
        image_source: ImageSource::Failure(Some("sensor busy".to_string())),
        ..MockPeerConfig::default()
    })
    .start_background()
    .await
    .unwrap();

    let err = trigger(peer.address()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Pi failed to capture image. Error: sensor busy"
    );
}

#[tokio::test]
async fn test_silent_failure_uses_placeholder() {
    let peer = MockCameraPeer::new(MockPeerConfig {
        image_source: ImageSource::Failure(None),
        ..MockPeerConfig::default()
    })
    .start_background()
    .await
    .unwrap();

    match trigger(peer.address()).await {
        Err(ProtocolError::PeerReportedFailure(reason)) => {
            assert_eq!(reason, "Unknown Pi Error")
        }
        other => panic!("expected peer failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_directory_source_serves_large_enough_image() {
    let dir = tempdir().unwrap();
    let peer = MockCameraPeer::new(MockPeerConfig {
        image_source: ImageSource::Directory(dir.path().to_path_buf()),
        min_image_bytes: 1024,
        ..MockPeerConfig::default()
    })
    .start_background()
    .await
    .unwrap();

    // Nothing valid yet: the peer answers with its no-image message.
    std::fs::write(dir.path().join("capture_0.png"), vec![9u8; 100]).unwrap();
    match trigger(peer.address()).await {
        Err(ProtocolError::PeerReportedFailure(reason)) => assert_eq!(reason, NO_IMAGE_MESSAGE),
        other => panic!("expected peer failure, got {:?}", other),
    }

    let image = vec![42u8; 2048];
    std::fs::write(dir.path().join("capture_1.png"), &image).unwrap();
    assert_eq!(trigger(peer.address()).await.unwrap(), Frame::Payload(image));
    assert_eq!(peer.triggers(), 2);
}

#[tokio::test]
async fn test_peer_serves_consecutive_connections() {
    let peer = MockCameraPeer::new(MockPeerConfig {
        image_source: ImageSource::Fixed(vec![1, 2, 3]),
        ..MockPeerConfig::default()
    })
    .start_background()
    .await
    .unwrap();

    for _ in 0..3 {
        assert_eq!(
            trigger(peer.address()).await.unwrap(),
            Frame::Payload(vec![1, 2, 3])
        );
    }
    assert_eq!(peer.triggers(), 3);
}
