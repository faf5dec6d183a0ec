//! Rendezvous through the QUIC signaling relay.
//!
//! Each joined room gets its own connection and control stream; a reader
//! task turns relay events into [`RoomEvent`]s and drops the event sender
//! when the relay goes away, which the consumer sees as a closed channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webfsr_types::PeerId;

use crate::connection::{MessageReceiver, MessageSender, PeerConnection};
use crate::error::ProtocolError;
use crate::relay::{RelayEvent, RelayRequest};
use crate::rendezvous::{JoinedRoom, Rendezvous, Room, RoomEvent, EVENT_BUFFER};
use crate::transport::QuicTransport;

/// Rendezvous client for a webfsr relay.
#[derive(Clone)]
pub struct QuicRendezvous {
    transport: QuicTransport,
    relay: SocketAddr,
    server_name: String,
}

impl QuicRendezvous {
    pub fn new(transport: QuicTransport, relay: SocketAddr, server_name: impl Into<String>) -> Self {
        Self {
            transport,
            relay,
            server_name: server_name.into(),
        }
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay
    }
}

#[async_trait]
impl Rendezvous for QuicRendezvous {
    async fn join(&self, room_id: &str) -> Result<JoinedRoom, ProtocolError> {
        let connection = self
            .transport
            .connect(self.relay, &self.server_name)
            .await?;
        let (mut tx, mut rx) = connection.open_control_stream().await?;

        tx.send(&RelayRequest::Join {
            room: room_id.to_string(),
        })
        .await?;

        let peer = match rx.recv::<RelayEvent>().await {
            Ok(Some(RelayEvent::Joined { peer })) => peer,
            Ok(Some(RelayEvent::Error { reason })) => {
                connection.close();
                return Err(ProtocolError::Join(reason));
            }
            Ok(Some(other)) => {
                connection.close();
                return Err(ProtocolError::UnexpectedReply(format!(
                    "expected Joined, got {other:?}"
                )));
            }
            Ok(None) => {
                connection.close();
                return Err(ProtocolError::StreamClosed);
            }
            Err(e) => {
                connection.close();
                return Err(e);
            }
        };
        info!(room = room_id, peer = %peer, relay = %self.relay, "joined relay room");

        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_relay_events(rx, events_tx));

        Ok(JoinedRoom {
            room: Arc::new(QuicRoom {
                room_id: room_id.to_string(),
                peer,
                connection,
                tx: Mutex::new(tx),
                left: AtomicBool::new(false),
                reader,
            }),
            events,
        })
    }
}

async fn read_relay_events(mut rx: MessageReceiver, events: mpsc::Sender<RoomEvent>) {
    loop {
        let event = match rx.recv::<RelayEvent>().await {
            Ok(Some(RelayEvent::PeerJoined(peer))) => RoomEvent::PeerJoined(peer),
            Ok(Some(RelayEvent::PeerLeft(peer))) => RoomEvent::PeerLeft(peer),
            Ok(Some(RelayEvent::Deliver {
                action,
                payload,
                from,
            })) => RoomEvent::Action {
                name: action,
                payload,
                from,
            },
            Ok(Some(RelayEvent::Error { reason })) => {
                warn!(reason = %reason, "relay reported an error");
                continue;
            }
            Ok(Some(RelayEvent::Joined { peer })) => {
                debug!(peer = %peer, "ignoring duplicate Joined");
                continue;
            }
            Ok(None) => {
                debug!("relay closed the control stream");
                break;
            }
            Err(e) => {
                debug!(error = %e, "relay stream failed");
                break;
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

struct QuicRoom {
    room_id: String,
    peer: PeerId,
    connection: PeerConnection,
    tx: Mutex<MessageSender>,
    left: AtomicBool,
    reader: JoinHandle<()>,
}

#[async_trait]
impl Room for QuicRoom {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    fn local_peer(&self) -> &PeerId {
        &self.peer
    }

    async fn send(
        &self,
        action: &str,
        payload: Vec<u8>,
        target: Option<&PeerId>,
    ) -> Result<(), ProtocolError> {
        if self.left.load(Ordering::SeqCst) {
            return Err(ProtocolError::RoomClosed);
        }
        let request = RelayRequest::Send {
            action: action.to_string(),
            payload,
            target: target.cloned(),
        };
        self.tx.lock().await.send(&request).await
    }

    async fn leave(&self) -> Result<(), ProtocolError> {
        if self.left.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.tx.lock().await.send(&RelayRequest::Leave).await;
        self.reader.abort();
        self.connection.close();
        debug!(room = %self.room_id, "left relay room");
        result
    }
}

impl Drop for QuicRoom {
    fn drop(&mut self) {
        self.reader.abort();
        self.connection.close();
    }
}
