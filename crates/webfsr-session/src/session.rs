//! Pairing session: joins a room, runs the syn/ack handshake and carries
//! application messages to the single connected peer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use webfsr_protocol::{Action, JoinedRoom, Rendezvous, Room, RoomEvent};
use webfsr_types::{ApplicationMessage, HandshakeMessage, PairingCode, PeerId, Role};

use crate::handlers::{Handlers, MessageCallback, PeerCallback};
use crate::last_code::LastCodeStore;
use crate::state::{SessionEffect, SessionInput, SessionStatus};

/// Action carrying the syn/ack handshake.
pub const HANDSHAKE: Action<HandshakeMessage> = Action::new("handshake");

/// Action carrying application messages.
pub const MESSAGE: Action<ApplicationMessage> = Action::new("message");

/// Pause between tearing a room down and joining the next one.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Builder for [`PairingSession`].
pub struct SessionBuilder {
    role: Role,
    rendezvous: Arc<dyn Rendezvous>,
    code: Option<PairingCode>,
    settle_delay: Duration,
    last_code: Option<Arc<LastCodeStore>>,
}

impl SessionBuilder {
    /// Code a remote joins when `connect` is called without one.
    #[must_use]
    pub fn code(mut self, code: PairingCode) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Record the session's code here whenever a peer connects.
    #[must_use]
    pub fn last_code(mut self, store: Arc<LastCodeStore>) -> Self {
        self.last_code = Some(store);
        self
    }

    pub fn build(self) -> PairingSession {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        PairingSession {
            shared: Arc::new(Shared {
                role: self.role,
                default_code: self.code,
                rendezvous: self.rendezvous,
                settle_delay: self.settle_delay,
                last_code: self.last_code,
                handlers: Handlers::default(),
                status_tx,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }
}

/// One side of a host/remote pairing.
///
/// Cheap to clone; clones drive the same session. At most one room is
/// joined at a time. Transport failures never surface as errors from these
/// methods; they land in [`SessionStatus::error`].
#[derive(Clone)]
pub struct PairingSession {
    shared: Arc<Shared>,
}

struct Shared {
    role: Role,
    default_code: Option<PairingCode>,
    rendezvous: Arc<dyn Rendezvous>,
    settle_delay: Duration,
    last_code: Option<Arc<LastCodeStore>>,
    handlers: Handlers,
    status_tx: watch::Sender<SessionStatus>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    status: SessionStatus,
    /// Bumped on every teardown; room tasks from older generations are stale.
    generation: u64,
    active: Option<ActiveRoom>,
}

struct ActiveRoom {
    room: Arc<dyn Room>,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

struct Outbound {
    target: PeerId,
    message: ApplicationMessage,
}

impl PairingSession {
    pub fn builder(role: Role, rendezvous: Arc<dyn Rendezvous>) -> SessionBuilder {
        SessionBuilder {
            role,
            rendezvous,
            code: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
            last_code: None,
        }
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.shared.lock().status.clone()
    }

    /// Watch every status transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn on_peer_connected(&self, callback: impl Fn(&PeerId) + Send + Sync + 'static) {
        let callback: PeerCallback = Arc::new(callback);
        self.shared.handlers.set_peer_connected(Some(callback));
    }

    pub fn on_peer_disconnected(&self, callback: impl Fn(&PeerId) + Send + Sync + 'static) {
        let callback: PeerCallback = Arc::new(callback);
        self.shared.handlers.set_peer_disconnected(Some(callback));
    }

    pub fn on_message(&self, callback: impl Fn(ApplicationMessage) + Send + Sync + 'static) {
        let callback: MessageCallback = Arc::new(callback);
        self.shared.handlers.set_message(Some(callback));
    }

    /// Drop every registered callback.
    pub fn clear_handlers(&self) {
        self.shared.handlers.set_peer_connected(None);
        self.shared.handlers.set_peer_disconnected(None);
        self.shared.handlers.set_message(None);
    }

    /// Join a room, replacing whatever room was joined before.
    ///
    /// A host without `target` mints a fresh code. A remote without `target`
    /// falls back to the code it was built with, and ends up Disconnected
    /// with an error if it has none. Returns once the join has succeeded or
    /// failed; the handshake completes in the background.
    pub async fn connect(&self, target: Option<PairingCode>) {
        let generation = self.shared.teardown(SessionInput::Teardown).await;
        tokio::time::sleep(self.shared.settle_delay).await;
        Shared::join(&self.shared, generation, target).await;
    }

    /// Bump the retry counter and connect again to the current code.
    pub async fn retry(&self) {
        let code = {
            let mut inner = self.shared.lock();
            inner.status.apply(SessionInput::Retry);
            self.shared.publish(&inner);
            inner.status.code.clone()
        };
        info!(attempt = self.status().reconnect_attempt, "retrying connection");
        self.connect(code).await;
    }

    /// Leave the room and forget the code, peer and error.
    pub async fn disconnect(&self) {
        self.shared.teardown(SessionInput::Disconnect).await;
        info!(role = %self.shared.role, "session disconnected");
    }

    /// Send `message` to the connected peer. Without a peer this does
    /// nothing; messages are never queued for a future peer.
    pub fn send(&self, message: ApplicationMessage) {
        let inner = self.shared.lock();
        let (Some(target), Some(active)) = (inner.status.peer.clone(), inner.active.as_ref()) else {
            trace!(kind = message.kind(), "no connected peer, dropping message");
            return;
        };
        if active.outbound.send(Outbound { target, message }).is_err() {
            debug!("room task has stopped, dropping message");
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.status_tx.send_replace(inner.status.clone());
    }

    /// Invalidate the current generation and leave its room.
    async fn teardown(&self, input: SessionInput) -> u64 {
        let (generation, previous) = {
            let mut inner = self.lock();
            inner.generation += 1;
            let previous = inner.active.take();
            inner.status.apply(input);
            self.publish(&inner);
            (inner.generation, previous)
        };

        if let Some(active) = previous {
            active.task.abort();
            if let Err(e) = active.room.leave().await {
                debug!(room = active.room.room_id(), error = %e, "error while leaving room");
            }
            debug!(room = active.room.room_id(), "left room");
        }
        generation
    }

    async fn join(this: &Arc<Self>, generation: u64, target: Option<PairingCode>) {
        let code = match (this.role, target) {
            (_, Some(code)) => code,
            (Role::Host, None) => PairingCode::generate(),
            (Role::Remote, None) => match this.default_code.clone() {
                Some(code) => code,
                None => {
                    warn!("remote asked to connect without a pairing code");
                    this.apply_if_current(generation, SessionInput::MissingCode);
                    return;
                }
            },
        };

        {
            let mut inner = this.lock();
            if inner.generation != generation || inner.active.is_some() {
                debug!(code = %code, "connect superseded before joining");
                return;
            }
            inner.status.apply(SessionInput::Connect(code.clone()));
            this.publish(&inner);
        }

        info!(role = %this.role, code = %code, "joining room");
        let JoinedRoom { room, events } = match this.rendezvous.join(code.as_str()).await {
            Ok(joined) => joined,
            Err(e) => {
                warn!(code = %code, error = %e, "failed to join room");
                this.apply_if_current(generation, SessionInput::JoinFailed(e.to_string()));
                return;
            }
        };

        let installed = {
            let mut inner = this.lock();
            if inner.generation == generation && inner.active.is_none() {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let task = tokio::spawn(run_room(
                    Arc::downgrade(this),
                    generation,
                    Arc::clone(&room),
                    events,
                    outbound_rx,
                ));
                inner.active = Some(ActiveRoom {
                    room: Arc::clone(&room),
                    outbound: outbound_tx,
                    task,
                });
                true
            } else {
                false
            }
        };

        if installed {
            info!(code = %code, peer = %room.local_peer(), "joined room");
        } else {
            debug!(code = %code, "connect superseded while joining, leaving room");
            if let Err(e) = room.leave().await {
                debug!(error = %e, "error while leaving superseded room");
            }
        }
    }

    fn apply_if_current(&self, generation: u64, input: SessionInput) -> Option<Vec<SessionEffect>> {
        let mut inner = self.lock();
        if inner.generation != generation {
            trace!(?input, "dropping input for stale room");
            return None;
        }
        let effects = inner.status.apply(input);
        self.publish(&inner);
        Some(effects)
    }

    async fn handle_event(&self, generation: u64, room: &dyn Room, event: RoomEvent) {
        let input = match event {
            RoomEvent::PeerJoined(peer) => {
                debug!(peer = %peer, "peer joined room");
                SessionInput::PeerJoined(peer)
            }
            RoomEvent::PeerLeft(peer) => {
                debug!(peer = %peer, "peer left room");
                SessionInput::PeerLeft(peer)
            }
            RoomEvent::Action {
                name,
                payload,
                from,
            } => {
                if HANDSHAKE.matches(&name) {
                    match HANDSHAKE.decode(&payload) {
                        Ok(message) => SessionInput::Handshake { from, message },
                        Err(e) => {
                            debug!(peer = %from, error = %e, "ignoring malformed handshake");
                            return;
                        }
                    }
                } else if MESSAGE.matches(&name) {
                    match MESSAGE.decode(&payload) {
                        Ok(message) => self.deliver(generation, &from, message),
                        Err(e) => debug!(peer = %from, error = %e, "ignoring malformed message"),
                    }
                    return;
                } else {
                    debug!(action = %name, peer = %from, "ignoring unknown action");
                    return;
                }
            }
        };

        if let Some(effects) = self.apply_if_current(generation, input) {
            self.run_effects(Some(room), effects).await;
        }
    }

    fn deliver(&self, generation: u64, from: &PeerId, message: ApplicationMessage) {
        if self.lock().generation != generation {
            return;
        }
        trace!(peer = %from, kind = message.kind(), "message received");
        self.handlers.message(message);
    }

    async fn room_closed(&self, generation: u64) {
        let effects = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            // Our own task is the one finishing; just forget the handle.
            inner.active = None;
            let effects = inner.status.apply(SessionInput::RoomClosed);
            self.publish(&inner);
            effects
        };
        warn!("rendezvous closed the room");
        self.run_effects(None, effects).await;
    }

    async fn run_effects(&self, room: Option<&dyn Room>, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::SendHandshake { message, target } => {
                    let Some(room) = room else { continue };
                    if let Err(e) = HANDSHAKE.send(room, &message, target.as_ref()).await {
                        warn!(?message, error = %e, "failed to send handshake");
                    }
                }
                SessionEffect::PeerConnected(peer) => {
                    info!(role = %self.role, peer = %peer, "peer connected");
                    if let Some(store) = &self.last_code {
                        let code = self.lock().status.code.clone();
                        if code.is_some() {
                            store.set(code);
                        }
                    }
                    self.handlers.peer_connected(&peer);
                }
                SessionEffect::PeerDisconnected(peer) => {
                    info!(role = %self.role, peer = %peer, "peer disconnected");
                    self.handlers.peer_disconnected(&peer);
                }
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = inner.active.take() {
            // The room handle's own Drop releases its membership.
            active.task.abort();
        }
    }
}

/// Drives one joined room until it closes or its session goes away.
async fn run_room(
    shared: Weak<Shared>,
    generation: u64,
    room: Arc<dyn Room>,
    mut events: mpsc::Receiver<RoomEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    // Members already present learn about us from this broadcast; members
    // arriving later get a targeted syn from the PeerJoined transition.
    if let Err(e) = HANDSHAKE.send(room.as_ref(), &HandshakeMessage::Syn, None).await {
        warn!(error = %e, "failed to broadcast syn");
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(shared) = shared.upgrade() else { break };
                match event {
                    Some(event) => shared.handle_event(generation, room.as_ref(), event).await,
                    None => {
                        shared.room_closed(generation).await;
                        break;
                    }
                }
            }
            Some(Outbound { target, message }) = outbound.recv() => {
                if let Err(e) = MESSAGE.send(room.as_ref(), &message, Some(&target)).await {
                    warn!(peer = %target, kind = message.kind(), error = %e, "failed to send message");
                }
            }
        }
    }
}
