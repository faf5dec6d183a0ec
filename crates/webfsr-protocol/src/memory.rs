//! In-process rendezvous backend.
//!
//! Every [`MemoryRendezvous`] clone shares one hub, so two sessions built
//! from clones of the same hub can find each other without any network.
//! The hub is observable: tests inspect room membership, the frames that
//! were sent and the number of joins, and can make the next join fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webfsr_types::PeerId;

use crate::error::ProtocolError;
use crate::rendezvous::{JoinedRoom, Rendezvous, Room, RoomEvent, EVENT_BUFFER};

/// A payload recorded by the hub as it was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub room: String,
    pub from: PeerId,
    pub action: String,
    pub target: Option<PeerId>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct Hub {
    rooms: HashMap<String, HashMap<PeerId, mpsc::Sender<RoomEvent>>>,
    next_peer: u64,
    joins: u64,
    sent: Vec<SentFrame>,
    fail_next_join: Option<String>,
}

impl Hub {
    fn deliver(&self, room: &str, to: &PeerId, event: RoomEvent) {
        let Some(tx) = self.rooms.get(room).and_then(|members| members.get(to)) else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            warn!(room, peer = %to, error = %e, "dropping room event");
        }
    }

    fn others(&self, room: &str, me: &PeerId) -> Vec<PeerId> {
        self.rooms
            .get(room)
            .map(|members| members.keys().filter(|p| *p != me).cloned().collect())
            .unwrap_or_default()
    }

    fn remove(&mut self, room: &str, peer: &PeerId) {
        let Some(members) = self.rooms.get_mut(room) else {
            return;
        };
        if members.remove(peer).is_none() {
            return;
        }
        if members.is_empty() {
            self.rooms.remove(room);
        }
        for other in self.others(room, peer) {
            self.deliver(room, &other, RoomEvent::PeerLeft(peer.clone()));
        }
        debug!(room, peer = %peer, "left memory room");
    }
}

/// In-process rendezvous hub.
#[derive(Clone, Default)]
pub struct MemoryRendezvous {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `join` fail with `reason`.
    pub fn fail_next_join(&self, reason: impl Into<String>) {
        self.hub().fail_next_join = Some(reason.into());
    }

    /// Current members of `room`, sorted.
    pub fn members(&self, room: &str) -> Vec<PeerId> {
        let mut members: Vec<PeerId> = self
            .hub()
            .rooms
            .get(room)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Rooms that currently have at least one member.
    pub fn occupied_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.hub().rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Total memberships across all rooms.
    pub fn membership_count(&self) -> usize {
        self.hub().rooms.values().map(HashMap::len).sum()
    }

    /// Number of successful joins since the hub was created.
    pub fn join_count(&self) -> u64 {
        self.hub().joins
    }

    /// Every frame sent so far, in order.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.hub().sent.clone()
    }

    /// Frames sent on `action` so far.
    pub fn frames_on(&self, action: &str) -> Vec<SentFrame> {
        self.hub()
            .sent
            .iter()
            .filter(|f| f.action == action)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Rendezvous for MemoryRendezvous {
    async fn join(&self, room_id: &str) -> Result<JoinedRoom, ProtocolError> {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let peer = {
            let mut hub = self.hub();
            if let Some(reason) = hub.fail_next_join.take() {
                return Err(ProtocolError::Join(reason));
            }
            hub.next_peer += 1;
            hub.joins += 1;
            let peer = PeerId::new(format!("peer-{}", hub.next_peer));
            for other in hub.others(room_id, &peer) {
                hub.deliver(room_id, &other, RoomEvent::PeerJoined(peer.clone()));
            }
            hub.rooms
                .entry(room_id.to_string())
                .or_default()
                .insert(peer.clone(), tx);
            peer
        };
        debug!(room = room_id, peer = %peer, "joined memory room");

        Ok(JoinedRoom {
            room: Arc::new(MemoryRoom {
                hub: Arc::clone(&self.hub),
                room_id: room_id.to_string(),
                peer,
                left: AtomicBool::new(false),
            }),
            events,
        })
    }
}

struct MemoryRoom {
    hub: Arc<Mutex<Hub>>,
    room_id: String,
    peer: PeerId,
    left: AtomicBool,
}

impl MemoryRoom {
    fn depart(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.hub
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.room_id, &self.peer);
    }
}

#[async_trait]
impl Room for MemoryRoom {
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
        let mut hub = self.hub.lock().unwrap_or_else(PoisonError::into_inner);
        hub.sent.push(SentFrame {
            room: self.room_id.clone(),
            from: self.peer.clone(),
            action: action.to_string(),
            target: target.cloned(),
            payload: payload.clone(),
        });

        let recipients = match target {
            Some(peer) => vec![peer.clone()],
            None => hub.others(&self.room_id, &self.peer),
        };
        for to in recipients {
            hub.deliver(
                &self.room_id,
                &to,
                RoomEvent::Action {
                    name: action.to_string(),
                    payload: payload.clone(),
                    from: self.peer.clone(),
                },
            );
        }
        Ok(())
    }

    async fn leave(&self) -> Result<(), ProtocolError> {
        self.depart();
        Ok(())
    }
}

impl Drop for MemoryRoom {
    fn drop(&mut self) {
        self.depart();
    }
}
