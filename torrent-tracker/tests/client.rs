mod common;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use common::{
    announce_response, connect_response, expected_peers, metadata, metadata_with,
    transaction_id, RecordingTransport, ANNOUNCE, CONNECTION_ID,
};
use tokio::sync::oneshot;
use torrent_parser::{error::TorrentParserError, udp::PeerEndpoint};
use torrent_tracker::{TrackerClient, TrackerConfig, TrackerError, TrackerResult};

type Outcome = TrackerResult<Vec<PeerEndpoint>>;

fn callback(
    calls: &Arc<AtomicUsize>,
) -> (impl FnOnce(Outcome) + Send + 'static, oneshot::Receiver<Outcome>) {
    let (tx, rx) = oneshot::channel();
    let calls = Arc::clone(calls);
    let on_peers = move |result: Outcome| {
        calls.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(result);
    };
    (on_peers, rx)
}

#[tokio::test]
async fn test_get_peers_end_to_end() {
    let (transport, mut sent) = RecordingTransport::new();
    let client = Arc::new(TrackerClient::new(Arc::new(transport), TrackerConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_peers, result) = callback(&calls);

    let _handle = client.get_peers(metadata(), on_peers);

    let connect = sent.recv().await.unwrap();
    assert_eq!(connect.host, "tracker.example.org");
    assert_eq!(connect.port, 6969);
    assert_eq!(connect.datagram.len(), 16);
    assert_eq!(client.pending_transactions(), 1);

    // noise on the shared channel
    client.dispatch(&connect_response([9, 9, 9, 9], CONNECTION_ID));
    client.dispatch(&[0, 0, 0, 3, 1, 2]);
    client.dispatch(&[0, 0]);
    client.dispatch(&connect_response(transaction_id(&connect.datagram), CONNECTION_ID));

    let announce = sent.recv().await.unwrap();
    assert_eq!(announce.datagram.len(), 98);
    assert_eq!(announce.datagram[0..8], CONNECTION_ID);
    assert_eq!(&announce.datagram[36..44], b"-RT0001-");
    assert_ne!(transaction_id(&announce.datagram), transaction_id(&connect.datagram));

    // a stale answer carrying the connect transaction id is not routed anymore
    client.dispatch(&announce_response(transaction_id(&connect.datagram)));
    client.dispatch(&announce_response(transaction_id(&announce.datagram)));
    client.dispatch(&announce_response(transaction_id(&announce.datagram)));

    let peers = result.await.unwrap().unwrap();
    assert_eq!(peers, expected_peers());
    assert_eq!(peers[0].ip.to_string(), "192.168.1.1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.pending_transactions(), 0);
    assert!(sent.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_sessions_share_channel() {
    let (transport, mut sent) = RecordingTransport::new();
    let client = Arc::new(TrackerClient::new(Arc::new(transport), TrackerConfig::default()));

    let responder = {
        let client = Arc::clone(&client);
        async move {
            let first = sent.recv().await.unwrap();
            let second = sent.recv().await.unwrap();
            // answer out of order
            for connect in [second, first] {
                let connection_id = if connect.port == 6969 { [1; 8] } else { [2; 8] };
                client.dispatch(&connect_response(transaction_id(&connect.datagram), connection_id));
            }

            let mut seen = HashSet::new();
            for _ in 0..2 {
                let announce = sent.recv().await.unwrap();
                seen.insert(announce.port);
                let expected = if announce.port == 6969 { [1; 8] } else { [2; 8] };
                assert_eq!(announce.datagram[0..8], expected);
                client.dispatch(&announce_response(transaction_id(&announce.datagram)));
            }
            assert_eq!(seen.len(), 2);
        }
    };

    let other = metadata_with("udp://other.example.org:1337/announce", &[10]);
    let first = metadata();
    let (first_peers, second_peers, ()) =
        tokio::join!(client.peers(&first), client.peers(&other), responder);

    assert_eq!(first_peers.unwrap(), expected_peers());
    assert_eq!(second_peers.unwrap(), expected_peers());
    assert_eq!(client.pending_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_tracker() {
    let config = TrackerConfig {
        base_timeout_secs: 1,
        max_attempts: 3,
        ..TrackerConfig::default()
    };
    let (transport, mut sent) = RecordingTransport::new();
    let client = Arc::new(TrackerClient::new(Arc::new(transport), config));
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_peers, result) = callback(&calls);

    client.get_peers(metadata(), on_peers);

    let outcome = result.await.unwrap();
    assert!(matches!(
        outcome,
        Err(TrackerError::TrackerUnreachable { attempts: 3 })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut transactions = HashSet::new();
    while let Ok(request) = sent.try_recv() {
        assert_eq!(request.datagram.len(), 16);
        transactions.insert(transaction_id(&request.datagram));
    }
    assert_eq!(transactions.len(), 3);
    assert_eq!(client.pending_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_session() {
    let (transport, mut sent) = RecordingTransport::new();
    let client = Arc::new(TrackerClient::new(Arc::new(transport), TrackerConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_peers, _result) = callback(&calls);

    let handle = client.get_peers(metadata(), on_peers);
    let connect = sent.recv().await.unwrap();

    handle.cancel();
    assert!(!handle.wait().await);
    assert_eq!(client.pending_transactions(), 0);

    client.dispatch(&connect_response(transaction_id(&connect.datagram), CONNECTION_ID));
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(sent.try_recv().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_content_too_large_fails_before_sending() {
    let (transport, mut sent) = RecordingTransport::new();
    let client = Arc::new(TrackerClient::new(Arc::new(transport), TrackerConfig::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let (on_peers, result) = callback(&calls);

    client.get_peers(metadata_with(ANNOUNCE, &[i64::MAX, i64::MAX, 2]), on_peers);

    assert!(matches!(
        result.await.unwrap(),
        Err(TrackerError::TorrentParserError(TorrentParserError::ContentTooLarge))
    ));
    assert!(sent.try_recv().is_err());
}

#[tokio::test]
async fn test_http_tracker_rejected() {
    let (transport, mut sent) = RecordingTransport::new();
    let client = TrackerClient::new(Arc::new(transport), TrackerConfig::default());

    let result = client
        .announce(&metadata_with("http://tracker.example.org/announce", &[10]))
        .await;

    assert!(matches!(result, Err(TrackerError::UnsupportedScheme(scheme)) if scheme == "http"));
    assert!(sent.try_recv().is_err());
}
