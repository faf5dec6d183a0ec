//! Pairing sessions against the in-process rendezvous hub.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use webfsr_protocol::{MemoryRendezvous, Rendezvous};
use webfsr_session::state::MISSING_CODE_ERROR;
use webfsr_session::{
    LastCodeStore, MemoryStore, PairingSession, SessionState, SessionStatus, MESSAGE,
};
use webfsr_types::{
    ApplicationMessage, PairingCode, PeerId, ProfileSyncPayload, Role, SensorReading, Theme,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn session(role: Role, hub: &MemoryRendezvous) -> PairingSession {
    let rendezvous: Arc<dyn Rendezvous> = Arc::new(hub.clone());
    PairingSession::builder(role, rendezvous).build()
}

async fn wait_for(
    session: &PairingSession,
    pred: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    let mut rx = session.subscribe();
    let status = tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for session status")
        .expect("session dropped");
    status.clone()
}

async fn connected(session: &PairingSession) -> SessionStatus {
    wait_for(session, SessionStatus::is_connected).await
}

/// Host on a fresh code plus a remote joined to it, both connected.
async fn paired(hub: &MemoryRendezvous) -> (PairingSession, PairingSession, PairingCode) {
    let host = session(Role::Host, hub);
    host.connect(None).await;
    let code = host.status().code.expect("host minted a code");

    let remote = session(Role::Remote, hub);
    remote.connect(Some(code.clone())).await;

    connected(&host).await;
    connected(&remote).await;
    (host, remote, code)
}

fn sample_payload() -> ProfileSyncPayload {
    ProfileSyncPayload {
        thresholds: vec![480, 550, 420, 600],
        sensor_labels: vec!["Left".into(), "Down".into(), "Up".into(), "Right".into()],
        sensor_colors: vec!["#3a7da3".into(), "#d4607c".into()],
        threshold_color: "#4dd253".into(),
        use_threshold_color: true,
        use_single_color: false,
        single_bar_color: "#3a7da3".into(),
        is_locked: true,
        theme: Theme::Light,
    }
}

#[tokio::test]
async fn host_and_remote_connect_to_each_other() {
    let hub = MemoryRendezvous::new();
    let (host, remote, code) = paired(&hub).await;

    let members = hub.members(code.as_str());
    assert_eq!(members.len(), 2);

    let host_peer = host.status().peer.unwrap();
    let remote_peer = remote.status().peer.unwrap();
    assert_ne!(host_peer, remote_peer);
    assert!(members.contains(&host_peer));
    assert!(members.contains(&remote_peer));
    assert_eq!(remote.status().code, Some(code));
    assert_eq!(host.status().error, None);
}

#[tokio::test]
async fn host_accepts_a_single_peer_among_concurrent_remotes() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    let code = host.status().code.unwrap();

    let remotes: Vec<_> = (0..3).map(|_| session(Role::Remote, &hub)).collect();
    connect_all(&remotes, &code).await;

    let first = connected(&host).await.peer.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = host.status();
    assert!(status.is_connected());
    assert_eq!(status.peer, Some(first));
    assert_eq!(hub.members(code.as_str()).len(), 4);
}

async fn connect_all(remotes: &[PairingSession], code: &PairingCode) {
    let tasks: Vec<_> = remotes
        .iter()
        .map(|r| {
            let r = r.clone();
            let code = code.clone();
            tokio::spawn(async move { r.connect(Some(code)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn send_without_peer_is_a_noop() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);

    host.send(ApplicationMessage::Ping);
    host.connect(None).await;
    host.send(ApplicationMessage::Ping);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(hub.frames_on(MESSAGE.name()).is_empty());
}

#[tokio::test]
async fn messages_are_addressed_to_the_connected_peer() {
    let hub = MemoryRendezvous::new();
    let (host, remote, _) = paired(&hub).await;

    host.send(ApplicationMessage::Ping);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = hub.frames_on(MESSAGE.name());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].target, host.status().peer);
    assert_eq!(Some(frames[0].from.clone()), remote.status().peer);
}

#[tokio::test]
async fn sync_round_trip_is_deep_equal() {
    let hub = MemoryRendezvous::new();
    let (host, remote, _) = paired(&hub).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = tx.send(msg);
    });

    let sent = ApplicationMessage::Sync {
        payload: sample_payload(),
    };
    host.send(sent.clone());

    let received = tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn messages_flow_both_ways() {
    let hub = MemoryRendezvous::new();
    let (host, remote, _) = paired(&hub).await;

    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    host.on_message(move |msg| {
        let _ = host_tx.send(msg);
    });
    let (remote_tx, mut remote_rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = remote_tx.send(msg);
    });

    remote.send(ApplicationMessage::Threshold {
        index: 2,
        value: 600,
    });
    host.send(ApplicationMessage::Values {
        payload: SensorReading {
            values: vec![1, 2, 3, 4],
            timestamp: 7,
        },
    });

    let at_host = tokio::time::timeout(TIMEOUT, host_rx.recv()).await.unwrap();
    assert_eq!(
        at_host,
        Some(ApplicationMessage::Threshold {
            index: 2,
            value: 600
        })
    );
    let at_remote = tokio::time::timeout(TIMEOUT, remote_rx.recv()).await.unwrap();
    assert!(matches!(at_remote, Some(ApplicationMessage::Values { .. })));
}

#[tokio::test]
async fn latest_message_handler_wins() {
    let hub = MemoryRendezvous::new();
    let (host, remote, _) = paired(&hub).await;

    let (old_tx, mut old_rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = old_tx.send(msg);
    });
    let (new_tx, mut new_rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = new_tx.send(msg);
    });

    host.send(ApplicationMessage::Ping);
    let received = tokio::time::timeout(TIMEOUT, new_rx.recv()).await.unwrap();
    assert_eq!(received, Some(ApplicationMessage::Ping));
    assert!(old_rx.try_recv().is_err());
}

#[tokio::test]
async fn cleared_handlers_are_released_and_not_called() {
    let hub = MemoryRendezvous::new();
    let (host, remote, _) = paired(&hub).await;

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = msg_tx.send(msg);
    });
    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
    remote.on_peer_disconnected(move |peer: &PeerId| {
        let _ = gone_tx.send(peer.clone());
    });
    remote.clear_handlers();

    host.send(ApplicationMessage::Ping);
    tokio::time::sleep(Duration::from_millis(50)).await;
    host.disconnect().await;
    wait_for(&remote, |s| s.state == SessionState::Disconnected).await;

    // Both callbacks were dropped, so their senders are gone unused.
    assert!(matches!(msg_rx.try_recv(), Err(TryRecvError::Disconnected)));
    assert!(matches!(gone_rx.try_recv(), Err(TryRecvError::Disconnected)));
}

#[tokio::test]
async fn disconnect_is_not_resurrected_by_late_handshakes() {
    let hub = MemoryRendezvous::new();
    let (host, remote, code) = paired(&hub).await;

    host.disconnect().await;
    assert_eq!(host.status(), SessionStatus::default());

    // The remote comes back to the same room and greets everyone again.
    remote.connect(Some(code.clone())).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(host.status(), SessionStatus::default());
    assert_eq!(hub.members(code.as_str()).len(), 1);
}

#[tokio::test]
async fn peer_leaving_disconnects_and_keeps_code() {
    let hub = MemoryRendezvous::new();
    let (host, remote, code) = paired(&hub).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    host.on_peer_disconnected(move |peer: &PeerId| {
        let _ = tx.send(peer.clone());
    });
    let remote_peer = host.status().peer.unwrap();

    remote.disconnect().await;

    let gone = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap();
    assert_eq!(gone, Some(remote_peer));
    let status = wait_for(&host, |s| s.state == SessionState::Disconnected).await;
    assert_eq!(status.peer, None);
    assert_eq!(status.code, Some(code));
}

#[tokio::test]
async fn host_accepts_a_new_remote_after_the_first_left() {
    let hub = MemoryRendezvous::new();
    let (host, first, code) = paired(&hub).await;
    let first_peer = host.status().peer.unwrap();

    first.disconnect().await;
    wait_for(&host, |s| s.peer.is_none()).await;

    let second = session(Role::Remote, &hub);
    second.connect(Some(code)).await;
    let status = connected(&host).await;
    assert_ne!(status.peer, Some(first_peer));
    connected(&second).await;
}

#[tokio::test]
async fn rapid_connect_disconnect_connect_keeps_one_room() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);

    host.connect(None).await;
    host.disconnect().await;
    host.connect(None).await;
    assert_eq!(hub.membership_count(), 1);

    let a = PairingCode::generate();
    let b = PairingCode::generate();
    let (h1, h2, h3) = (host.clone(), host.clone(), host.clone());
    let _ = tokio::join!(
        tokio::spawn(async move { h1.connect(Some(a)).await }),
        tokio::spawn(async move { h2.disconnect().await }),
        tokio::spawn(async move { h3.connect(Some(b)).await }),
    );
    assert!(hub.membership_count() <= 1);

    host.connect(None).await;
    assert_eq!(hub.membership_count(), 1);
    assert_eq!(
        hub.occupied_rooms(),
        vec![host.status().code.unwrap().to_string()]
    );

    host.disconnect().await;
    assert_eq!(hub.membership_count(), 0);
}

#[tokio::test]
async fn concurrent_connects_settle_on_one_room() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);

    let (h1, h2) = (host.clone(), host.clone());
    tokio::join!(h1.connect(None), h2.connect(None));

    assert_eq!(hub.membership_count(), 1);
    assert!(host.status().is_connecting());
}

#[tokio::test]
async fn bare_token_joins_the_same_room() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    let code = host.status().code.unwrap();

    let typed = PairingCode::parse(&format!("  {}  ", code.display_token().to_uppercase())).unwrap();
    assert_eq!(typed, code);

    let remote = session(Role::Remote, &hub);
    remote.connect(Some(typed)).await;
    connected(&host).await;
    connected(&remote).await;
    assert_eq!(hub.occupied_rooms(), vec![code.to_string()]);
}

#[tokio::test]
async fn remote_uses_construction_time_code() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    let code = host.status().code.unwrap();

    let rendezvous: Arc<dyn Rendezvous> = Arc::new(hub.clone());
    let remote = PairingSession::builder(Role::Remote, rendezvous)
        .code(code.clone())
        .settle_delay(Duration::ZERO)
        .build();
    remote.connect(None).await;

    assert_eq!(connected(&remote).await.code, Some(code));
}

#[tokio::test]
async fn remote_without_code_reports_error() {
    let hub = MemoryRendezvous::new();
    let remote = session(Role::Remote, &hub);
    remote.connect(None).await;

    let status = remote.status();
    assert_eq!(status.state, SessionState::Disconnected);
    assert_eq!(status.error.as_deref(), Some(MISSING_CODE_ERROR));
    assert_eq!(hub.join_count(), 0);
}

#[tokio::test]
async fn join_failure_surfaces_error_and_retry_counts() {
    let hub = MemoryRendezvous::new();
    let remote = session(Role::Remote, &hub);
    let code = PairingCode::generate();

    hub.fail_next_join("tracker unreachable");
    remote.connect(Some(code.clone())).await;

    let status = remote.status();
    assert_eq!(status.state, SessionState::Disconnected);
    assert!(status.error.unwrap().contains("tracker unreachable"));
    assert_eq!(hub.membership_count(), 0);

    remote.retry().await;
    let status = remote.status();
    assert_eq!(status.reconnect_attempt, 1);
    assert_eq!(status.state, SessionState::Connecting);
    assert_eq!(status.code, Some(code.clone()));
    assert_eq!(status.error, None);
    assert_eq!(hub.members(code.as_str()).len(), 1);
}

#[tokio::test]
async fn connection_records_last_code() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    let code = host.status().code.unwrap();

    let backing = MemoryStore::default();
    let store = Arc::new(LastCodeStore::open(backing.clone()));
    let rendezvous: Arc<dyn Rendezvous> = Arc::new(hub.clone());
    let remote = PairingSession::builder(Role::Remote, rendezvous)
        .last_code(Arc::clone(&store))
        .build();

    let (tx, mut rx) = mpsc::unbounded_channel();
    remote.on_peer_connected(move |peer: &PeerId| {
        let _ = tx.send(peer.clone());
    });
    remote.connect(Some(code.clone())).await;

    tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap();
    assert_eq!(store.get(), Some(code.clone()));
    assert_eq!(LastCodeStore::open(backing).get(), Some(code));
}

#[tokio::test]
async fn malformed_and_unknown_actions_are_ignored() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    let code = host.status().code.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.on_message(move |msg: ApplicationMessage| {
        let _ = tx.send(msg);
    });

    // `values` whose vector claims about 2^61 elements.
    let mut huge_len = vec![1, 253];
    huge_len.extend_from_slice(&(u64::MAX / 8).to_le_bytes());

    let intruder = hub.join(code.as_str()).await.unwrap();
    let room = intruder.room.as_ref();
    room.send("handshake", vec![0xff, 0xff, 0xff], None)
        .await
        .unwrap();
    room.send(MESSAGE.name(), huge_len.clone(), None)
        .await
        .unwrap();
    room.send("handshake", huge_len, None).await.unwrap();
    room.send("chat", b"hello".to_vec(), None).await.unwrap();
    MESSAGE
        .send(room, &ApplicationMessage::Ready, None)
        .await
        .unwrap();

    // The room task survived and only the well-formed message came through.
    let received = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap();
    assert_eq!(received, Some(ApplicationMessage::Ready));
    assert!(rx.try_recv().is_err());

    let status = host.status();
    assert_eq!(status.state, SessionState::Connecting);
    assert_eq!(status.peer, None);
}

#[tokio::test]
async fn dropping_the_session_releases_its_room() {
    let hub = MemoryRendezvous::new();
    let host = session(Role::Host, &hub);
    host.connect(None).await;
    assert_eq!(hub.membership_count(), 1);

    drop(host);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hub.membership_count(), 0);
}
