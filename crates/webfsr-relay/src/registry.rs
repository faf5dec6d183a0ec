//! Room membership and routing.
//!
//! The registry only knows each member's outbound queue. Connection tasks
//! own the QUIC streams; the registry decides who hears what.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use webfsr_protocol::RelayEvent;
use webfsr_types::PeerId;

use crate::error::RelayError;

/// Outbound queue depth per member.
pub const MEMBER_BUFFER: usize = 256;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashMap<PeerId, mpsc::Sender<RelayEvent>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to `room` and tell everyone already there.
    pub fn join(
        &mut self,
        room: &str,
        outbound: mpsc::Sender<RelayEvent>,
    ) -> Result<PeerId, RelayError> {
        if room.trim().is_empty() {
            return Err(RelayError::EmptyRoom);
        }
        let peer = PeerId::new(Uuid::new_v4().to_string());
        let members = self.rooms.entry(room.to_string()).or_default();
        for (other, tx) in members.iter() {
            push(tx, other, RelayEvent::PeerJoined(peer.clone()));
        }
        members.insert(peer.clone(), outbound);
        debug!(room, peer = %peer, members = members.len(), "member joined");
        Ok(peer)
    }

    /// Forward a payload from `from` to `target`, or to every other member.
    /// Returns how many members it was queued for.
    pub fn route(
        &self,
        room: &str,
        from: &PeerId,
        action: &str,
        payload: &[u8],
        target: Option<&PeerId>,
    ) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        let event = || RelayEvent::Deliver {
            action: action.to_string(),
            payload: payload.to_vec(),
            from: from.clone(),
        };

        match target {
            Some(target) => match members.get(target) {
                Some(tx) if target != from => usize::from(push(tx, target, event())),
                _ => {
                    debug!(room, target = %target, "dropping payload for unknown member");
                    0
                }
            },
            None => members
                .iter()
                .filter(|(peer, _)| *peer != from)
                .map(|(peer, tx)| push(tx, peer, event()))
                .filter(|queued| *queued)
                .count(),
        }
    }

    /// Remove a member and tell the rest. Empty rooms are dropped.
    pub fn leave(&mut self, room: &str, peer: &PeerId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        if members.remove(peer).is_none() {
            return false;
        }
        for (other, tx) in members.iter() {
            push(tx, other, RelayEvent::PeerLeft(peer.clone()));
        }
        if members.is_empty() {
            self.rooms.remove(room);
            debug!(room, "room emptied");
        }
        debug!(room, peer = %peer, "member left");
        true
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self) -> usize {
        self.rooms.values().map(HashMap::len).sum()
    }

    /// Members of `room`, sorted.
    pub fn members(&self, room: &str) -> Vec<PeerId> {
        let mut members: Vec<PeerId> = self
            .rooms
            .get(room)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}

/// Queue without waiting; a member that cannot keep up loses events.
fn push(tx: &mpsc::Sender<RelayEvent>, to: &PeerId, event: RelayEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(e) => {
            warn!(peer = %to, error = %e, "dropping relay event");
            false
        }
    }
}
