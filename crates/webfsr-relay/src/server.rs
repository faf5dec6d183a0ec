//! The relay server: accept loop and per-connection handling.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use webfsr_protocol::{
    MessageReceiver, MessageSender, PeerConnection, ProtocolError, QuicTransport, RelayEvent,
    RelayRequest,
};
use webfsr_types::PeerId;

use crate::error::RelayError;
use crate::registry::{RoomRegistry, MEMBER_BUFFER};

type SharedRegistry = Arc<Mutex<RoomRegistry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, RoomRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// QUIC signaling relay.
pub struct RelayServer {
    transport: QuicTransport,
    registry: SharedRegistry,
}

/// Read-only view of a running relay's rooms.
#[derive(Clone)]
pub struct RelayHandle {
    registry: SharedRegistry,
}

impl RelayHandle {
    pub fn room_count(&self) -> usize {
        lock(&self.registry).room_count()
    }

    pub fn member_count(&self) -> usize {
        lock(&self.registry).member_count()
    }

    pub fn members(&self, room: &str) -> Vec<PeerId> {
        lock(&self.registry).members(room)
    }
}

impl RelayServer {
    pub fn bind(addr: SocketAddr, cert_pem: &str, key_pem: &str) -> Result<Self, RelayError> {
        let transport = QuicTransport::bind(addr, cert_pem, key_pem)?;
        Ok(Self {
            transport,
            registry: Arc::new(Mutex::new(RoomRegistry::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            registry: Arc::clone(&self.registry),
        }
    }

    /// Serve until `shutdown` resolves or the endpoint closes.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), RelayError> {
        info!(addr = %self.local_addr()?, "relay running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                result = self.transport.accept() => match result {
                    Ok(conn) => {
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(async move {
                            let remote = conn.remote_address();
                            if let Err(e) = serve_connection(conn, registry).await {
                                debug!(remote = %remote, error = %e, "relay connection ended with error");
                            }
                        });
                    }
                    Err(ProtocolError::EndpointClosed) => break,
                    Err(e) => debug!(error = %e, "accept error"),
                },
            }
        }

        self.transport.close();
        info!("relay shut down");
        Ok(())
    }
}

async fn serve_connection(conn: PeerConnection, registry: SharedRegistry) -> Result<(), RelayError> {
    let remote = conn.remote_address();
    let (mut tx, mut rx) = conn.accept_control_stream().await?;

    let room = match rx.recv::<RelayRequest>().await? {
        Some(RelayRequest::Join { room }) => room,
        Some(other) => {
            warn!(remote = %remote, request = ?other, "first request was not Join");
            refuse(&mut tx, &conn, RelayError::NotJoined.to_string()).await;
            return Err(RelayError::NotJoined);
        }
        None => return Ok(()),
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(MEMBER_BUFFER);
    let joined = lock(&registry).join(&room, outbound_tx);
    let peer = match joined {
        Ok(peer) => peer,
        Err(e) => {
            refuse(&mut tx, &conn, e.to_string()).await;
            return Err(e);
        }
    };
    info!(remote = %remote, room = %room, peer = %peer, "member joined");

    let result = serve_member(tx, &mut rx, &registry, &room, &peer, outbound_rx).await;

    lock(&registry).leave(&room, &peer);
    conn.close();
    info!(remote = %remote, room = %room, peer = %peer, "member left");
    result
}

async fn refuse(tx: &mut MessageSender, conn: &PeerConnection, reason: String) {
    if let Err(e) = tx.send(&RelayEvent::Error { reason }).await {
        debug!(error = %e, "failed to send refusal");
    }
    conn.close();
}

/// Pump requests into the registry while a writer task drains our queue.
async fn serve_member(
    mut tx: MessageSender,
    rx: &mut MessageReceiver,
    registry: &SharedRegistry,
    room: &str,
    peer: &PeerId,
    mut outbound: mpsc::Receiver<RelayEvent>,
) -> Result<(), RelayError> {
    tx.send(&RelayEvent::Joined { peer: peer.clone() }).await?;

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            if let Err(e) = tx.send(&event).await {
                debug!(error = %e, "relay writer stopped");
                break;
            }
        }
    });

    let result = loop {
        match rx.recv::<RelayRequest>().await {
            Ok(Some(RelayRequest::Send {
                action,
                payload,
                target,
            })) => {
                let queued = lock(registry).route(room, peer, &action, &payload, target.as_ref());
                trace!(room, peer = %peer, action = %action, queued, "routed payload");
            }
            Ok(Some(RelayRequest::Join { room: other })) => {
                debug!(peer = %peer, room = %other, "ignoring second Join on one stream");
            }
            Ok(Some(RelayRequest::Leave) | None) => break Ok(()),
            Err(e) => break Err(e.into()),
        }
    };

    writer.abort();
    result
}
