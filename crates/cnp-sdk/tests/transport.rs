//! Integration tests for serving interests over a transport.
//!
//! Tests cover:
//! - Interests answered from content already buffered
//! - Interests parked until the segmenter publishes
//! - Expired interests and shutdown accounting

use cnp_sdk::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<MemoryTransport>, FlowControlledBuffer, Segmenter<MemoryKeyStore>) {
    let transport = Arc::new(MemoryTransport::new());
    let buffer = FlowControlledBuffer::new(BufferConfig::builder().persistent().build());
    let keys = Arc::new(MemoryKeyStore::from_seed([21u8; 32]));
    let segmenter = Segmenter::block_segmenter(buffer.clone(), keys, 8, 1).unwrap();
    (transport, buffer, segmenter)
}

#[tokio::test]
async fn test_serves_buffered_segments_in_order() {
    let (transport, buffer, mut segmenter) = setup();
    let server = InterestServer::new(transport.clone(), buffer, Duration::from_secs(1))
        .spawn()
        .unwrap();
    let mut face = transport.connect(FaceId::new("reader"));

    let name = Name::parse("/served").unwrap();
    let content: Vec<u8> = (0..30u8).collect();
    segmenter.finish(&name, &content, PutOptions::new()).await.unwrap();

    let mut interest = Interest::new(name.clone());
    let mut received = Vec::new();
    loop {
        let block = face
            .fetch(interest.clone(), Duration::from_secs(1))
            .await
            .unwrap()
            .expect("segment served");
        verify_self_certified(&block).unwrap();
        received.extend_from_slice(block.payload());
        if block.is_final_segment() {
            break;
        }
        interest = Interest::next_after(block.name());
    }
    assert_eq!(received, content);

    let stats = server.shutdown().await;
    assert_eq!(stats.served(), 4);
}

#[tokio::test]
async fn test_parked_interest_answered_after_publish() {
    let (transport, buffer, mut segmenter) = setup();
    let server = InterestServer::new(transport.clone(), buffer.clone(), Duration::from_secs(5))
        .spawn()
        .unwrap();
    let mut face = transport.connect(FaceId::new("early"));

    let name = Name::parse("/later").unwrap();
    face.express(name.clone()).await.unwrap();
    while buffer.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    segmenter.put(&name, b"now", PutOptions::new()).await.unwrap();
    let block = tokio::time::timeout(Duration::from_secs(1), face.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.payload(), b"now");
    assert_eq!(server.shutdown().await.served(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_interest_expires() {
    let (transport, buffer, _segmenter) = setup();
    let server = InterestServer::new(transport.clone(), buffer, Duration::from_millis(50))
        .spawn()
        .unwrap();
    let mut face = transport.connect(FaceId::new("hopeful"));

    let got = face
        .fetch(Name::parse("/nothing").unwrap(), Duration::from_millis(500))
        .await
        .unwrap();
    assert!(got.is_none());

    let stats = server.shutdown().await;
    assert_eq!(stats.expired(), 1);
    assert_eq!(stats.served(), 0);
}

#[tokio::test]
async fn test_second_server_cannot_subscribe() {
    let (transport, buffer, _segmenter) = setup();
    let _first = InterestServer::new(transport.clone(), buffer.clone(), Duration::from_secs(1))
        .spawn()
        .unwrap();
    let second = InterestServer::new(transport, buffer, Duration::from_secs(1)).spawn();
    assert!(matches!(second, Err(cnp_sdk::TransportError::AlreadySubscribed)));
}
