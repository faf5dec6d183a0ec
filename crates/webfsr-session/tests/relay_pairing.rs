//! Pairing through a real relay over loopback QUIC.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use webfsr_protocol::{QuicRendezvous, QuicTransport, Rendezvous};
use webfsr_relay::RelayServer;
use webfsr_session::{HostAction, HostProfile, PairingSession, RemoteMirror, SessionStatus};
use webfsr_types::{ApplicationMessage, Role};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn connected(session: &PairingSession) -> SessionStatus {
    let mut rx = session.subscribe();
    let status = tokio::time::timeout(TIMEOUT, rx.wait_for(SessionStatus::is_connected))
        .await
        .expect("timed out waiting for connection")
        .expect("session dropped");
    status.clone()
}

#[tokio::test]
async fn host_and_remote_pair_through_relay() {
    let cert = webfsr_certgen::generate_relay_certificate("localhost").unwrap();
    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), &cert.cert_pem, &cert.key_pem)
        .unwrap();
    let relay_addr = server.local_addr().unwrap();
    let relay = server.handle();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(server.run(async move {
        let _ = stop_rx.await;
    }));

    let rendezvous = |fingerprint: String| -> Arc<dyn Rendezvous> {
        let transport =
            QuicTransport::client("127.0.0.1:0".parse().unwrap(), Some(fingerprint)).unwrap();
        Arc::new(QuicRendezvous::new(transport, relay_addr, "localhost"))
    };

    let host = PairingSession::builder(Role::Host, rendezvous(cert.fingerprint.clone())).build();
    let remote =
        PairingSession::builder(Role::Remote, rendezvous(cert.fingerprint.clone())).build();

    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    host.on_message(move |msg| {
        let _ = host_tx.send(msg);
    });
    let (remote_tx, mut remote_rx) = mpsc::unbounded_channel();
    remote.on_message(move |msg| {
        let _ = remote_tx.send(msg);
    });

    host.connect(None).await;
    let code = host.status().code.unwrap();
    remote.connect(Some(code.clone())).await;
    connected(&host).await;
    connected(&remote).await;
    assert_eq!(relay.members(code.as_str()).len(), 2);

    // Remote asks for state, host answers with its profile.
    let mut profile = HostProfile::new(4);
    remote.send(ApplicationMessage::Ready);
    let ready = tokio::time::timeout(TIMEOUT, host_rx.recv()).await.unwrap().unwrap();
    assert_eq!(profile.handle(&ready), Some(HostAction::Resync));
    host.send(profile.sync_message());

    let mut mirror = RemoteMirror::default();
    let sync = tokio::time::timeout(TIMEOUT, remote_rx.recv()).await.unwrap().unwrap();
    mirror.apply(&sync);
    assert_eq!(mirror.thresholds, profile.thresholds());
    assert_eq!(sync, profile.sync_message());

    remote.disconnect().await;
    host.disconnect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(relay.room_count(), 0);
    let _ = stop_tx.send(());
}
