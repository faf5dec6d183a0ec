//! Replaceable callback slots.
//!
//! The room task never captures a caller's closure directly. It looks the
//! current one up here each time it fires, so callers can swap handlers at
//! any point without re-joining anything.

use std::sync::{Arc, PoisonError, RwLock};

use webfsr_types::{ApplicationMessage, PeerId};

pub type PeerCallback = Arc<dyn Fn(&PeerId) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(ApplicationMessage) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Handlers {
    peer_connected: RwLock<Option<PeerCallback>>,
    peer_disconnected: RwLock<Option<PeerCallback>>,
    message: RwLock<Option<MessageCallback>>,
}

fn replace<T>(slot: &RwLock<Option<T>>, value: Option<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

impl Handlers {
    pub fn set_peer_connected(&self, callback: Option<PeerCallback>) {
        replace(&self.peer_connected, callback);
    }

    pub fn set_peer_disconnected(&self, callback: Option<PeerCallback>) {
        replace(&self.peer_disconnected, callback);
    }

    pub fn set_message(&self, callback: Option<MessageCallback>) {
        replace(&self.message, callback);
    }

    // The slot lock is released before the callback runs, so a callback may
    // replace handlers itself.

    pub fn peer_connected(&self, peer: &PeerId) {
        if let Some(callback) = current(&self.peer_connected) {
            callback(peer);
        }
    }

    pub fn peer_disconnected(&self, peer: &PeerId) {
        if let Some(callback) = current(&self.peer_disconnected) {
            callback(peer);
        }
    }

    pub fn message(&self, message: ApplicationMessage) {
        if let Some(callback) = current(&self.message) {
            callback(message);
        }
    }
}
