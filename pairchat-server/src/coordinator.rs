//! The single authority over matchmaking and session state.
//!
//! Every inbound event, disconnect, and sweeper tick runs as one critical
//! section over [`Engine`]: validate, commit, and decide who to notify. The
//! resulting [`Outbox`] is flushed after the state lock is dropped. A second
//! lock is taken while the state lock is held and kept for the flush, so
//! outboxes leave in the order their transitions were committed. Both locks
//! are acquired before the transition runs: once state is mutated there is no
//! await left, and a cancelled caller cannot lose its deliveries.

use std::time::Duration;

use pairchat_common::{ClientEvent, EndReason, EventParseError, HistoryEntry, ServerEvent};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    error::{ChatError, Result},
    matchmaking::{Pairing, ReadinessQueue},
    registry::{Connection, ConnectionId, Outbox, SessionRegistry},
    sessions::{Participant, SessionStore},
    typing::TypingTracker,
    Identity,
};

struct Engine {
    registry: SessionRegistry,
    queue: ReadinessQueue,
    sessions: SessionStore,
    typing: TypingTracker,
}

pub struct Coordinator {
    state: Mutex<Engine>,
    delivery: Mutex<()>,
}

impl Coordinator {
    pub fn new(typing_quiet: Duration) -> Self {
        Self {
            state: Mutex::new(Engine {
                registry: SessionRegistry::default(),
                queue: ReadinessQueue::default(),
                sessions: SessionStore::default(),
                typing: TypingTracker::new(typing_quiet),
            }),
            delivery: Mutex::new(()),
        }
    }

    async fn commit<T>(&self, transition: impl FnOnce(&mut Engine, &mut Outbox) -> T) -> T {
        let mut engine = self.state.lock().await;
        let order = self.delivery.lock().await;

        let mut outbox = Outbox::default();
        let result = transition(&mut *engine, &mut outbox);

        drop(engine);
        outbox.flush();
        drop(order);

        result
    }

    /// Registers a freshly authenticated connection. A previous connection
    /// for the same identity is superseded; its events are ignored from now on.
    pub async fn connect(&self, identity: Identity, connection: Connection) -> ConnectionId {
        let id = connection.id();
        self.commit(|engine, _| {
            if engine.registry.register(identity.clone(), connection).is_some() {
                info!(identity = %identity, "connection replaced");
            } else {
                info!(identity = %identity, "connected");
            }
        })
        .await;
        id
    }

    /// Dispatches one inbound event from connection `conn`.
    pub async fn handle(&self, identity: &Identity, conn: ConnectionId, event: ClientEvent) {
        self.commit(|engine, outbox| {
            if !engine.registry.is_current(identity, conn) {
                debug!(identity = %identity, "event from superseded connection ignored");
                return;
            }

            let result = match event {
                ClientEvent::RequestPairing => {
                    engine.request_pairing(identity, outbox);
                    Ok(())
                }
                ClientEvent::Message { text } => engine.send_message(identity, text, outbox),
                ClientEvent::Typing => engine.signal_typing(identity, Instant::now(), outbox),
                ClientEvent::Leave => engine.leave(identity, outbox),
            };

            if let Err(err) = result {
                debug!(identity = %identity, error = %err, "event rejected");
                engine.registry.deliver(outbox, identity, ServerEvent::error(err.to_string()));
            }
        })
        .await;
    }

    /// Reports an unparseable frame back to its sender. No state changes.
    pub async fn reject(&self, identity: &Identity, conn: ConnectionId, err: EventParseError) {
        let err = ChatError::from(err);
        self.commit(|engine, outbox| {
            if engine.registry.is_current(identity, conn) {
                warn!(identity = %identity, error = %err, "protocol error");
                engine.registry.deliver(outbox, identity, ServerEvent::error(err.to_string()));
            }
        })
        .await;
    }

    /// Removes the identity from every structure and ends its session, if
    /// any. Returns `false` when `conn` had already been superseded.
    pub async fn disconnect(&self, identity: &Identity, conn: ConnectionId) -> bool {
        self.commit(|engine, outbox| engine.disconnect(identity, conn, outbox))
            .await
    }

    /// Expires quiet typing records and notifies their peers.
    pub async fn expire_typing(&self, now: Instant) -> usize {
        self.commit(|engine, outbox| {
            let expired = engine.typing.expire(now);
            for (owner, peer) in &expired {
                debug!(owner = %owner, peer = %peer, "typing expired");
                engine.registry.deliver(outbox, peer, ServerEvent::TypingEnded);
            }
            expired.len()
        })
        .await
    }

    /// Message log of a live session, for one of its participants only.
    pub async fn history(&self, caller: &Identity, session_id: &str) -> Result<Vec<HistoryEntry>> {
        let engine = self.state.lock().await;
        let session = engine.sessions.get(session_id).ok_or(ChatError::NotFound)?;
        if session.participant(caller).is_none() {
            return Err(ChatError::Authorization);
        }
        Ok(session.history())
    }

    pub async fn connected_identities(&self) -> Vec<Identity> {
        let engine = self.state.lock().await;
        engine.registry.identities().cloned().collect()
    }
}

impl Engine {
    fn label(&self, identity: &Identity) -> Option<String> {
        self.registry.lookup(identity).map(|conn| conn.label().to_string())
    }

    /// The caller's session id and peer, or `NotInSession`.
    fn session_peer(&self, identity: &Identity) -> Result<(String, Participant)> {
        let session_id = self
            .sessions
            .find_session_for(identity)
            .ok_or(ChatError::NotInSession)?;
        let peer = self
            .sessions
            .get(session_id)
            .and_then(|session| session.peer_of(identity))
            .ok_or(ChatError::NotInSession)?;
        Ok((session_id.clone(), peer.clone()))
    }

    fn request_pairing(&mut self, identity: &Identity, outbox: &mut Outbox) {
        if let Ok((session_id, peer)) = self.session_peer(identity) {
            self.registry
                .deliver(outbox, identity, ServerEvent::matched(session_id, peer.label));
            return;
        }

        let Some(label) = self.label(identity) else {
            return;
        };

        loop {
            match self.queue.request(identity) {
                Pairing::Waiting => {
                    debug!(identity = %identity, waiting = self.queue.len(), "waiting for partner");
                    self.registry.deliver(outbox, identity, ServerEvent::Waiting);
                    return;
                }
                Pairing::Matched(partner) => {
                    // Queue entries are removed on disconnect, so this only
                    // trips if that cleanup was skipped.
                    let Some(partner_label) = self.label(&partner) else {
                        warn!(identity = %partner, "unregistered identity in readiness queue");
                        continue;
                    };

                    let session_id = self.sessions.create_session(
                        Participant::new(partner.clone(), partner_label.clone()),
                        Participant::new(identity.clone(), label.clone()),
                    );
                    info!(session_id = %session_id, a = %partner, b = %identity, "matched");

                    self.registry.deliver(
                        outbox,
                        &partner,
                        ServerEvent::matched(session_id.clone(), label),
                    );
                    self.registry.deliver(
                        outbox,
                        identity,
                        ServerEvent::matched(session_id, partner_label),
                    );
                    return;
                }
            }
        }
    }

    fn send_message(
        &mut self,
        identity: &Identity,
        text: String,
        outbox: &mut Outbox,
    ) -> Result<()> {
        let (session_id, peer) = self.session_peer(identity)?;
        let sender_label = self.label(identity).unwrap_or_default();

        if let Some(seq) = self.sessions.append_message(&session_id, identity, text.clone()) {
            debug!(session_id = %session_id, seq, "message relayed");
        }
        self.registry.deliver(
            outbox,
            &peer.identity,
            ServerEvent::message(text, sender_label),
        );

        if self.typing.clear(identity).is_some() {
            self.registry
                .deliver(outbox, &peer.identity, ServerEvent::TypingEnded);
        }
        Ok(())
    }

    fn signal_typing(
        &mut self,
        identity: &Identity,
        now: Instant,
        outbox: &mut Outbox,
    ) -> Result<()> {
        let (_, peer) = self.session_peer(identity)?;
        let sender_label = self.label(identity).unwrap_or_default();

        self.typing.signal(identity, &peer.identity, now);
        self.registry
            .deliver(outbox, &peer.identity, ServerEvent::typing(sender_label));
        Ok(())
    }

    fn leave(&mut self, identity: &Identity, outbox: &mut Outbox) -> Result<()> {
        if let Some(peer) = self.end_session_of(identity) {
            info!(identity = %identity, "left session");
            self.registry.deliver(
                outbox,
                &peer.identity,
                ServerEvent::session_ended(EndReason::PeerLeft),
            );
            self.registry
                .deliver(outbox, identity, ServerEvent::session_ended(EndReason::Left));
            return Ok(());
        }

        if self.queue.remove(identity) {
            self.registry
                .deliver(outbox, identity, ServerEvent::WaitingCancelled);
            return Ok(());
        }

        Err(ChatError::NotInSession)
    }

    fn disconnect(&mut self, identity: &Identity, conn: ConnectionId, outbox: &mut Outbox) -> bool {
        if self.registry.unregister(identity, conn).is_none() {
            debug!(identity = %identity, "superseded connection closed");
            return false;
        }

        self.queue.remove(identity);
        self.typing.clear(identity);

        if let Some(peer) = self.end_session_of(identity) {
            self.registry.deliver(
                outbox,
                &peer.identity,
                ServerEvent::session_ended(EndReason::PeerDisconnected),
            );
        }
        info!(identity = %identity, "disconnected");
        true
    }

    /// Ends the identity's session and silences both typing records, so no
    /// expiry for this pair can fire afterwards.
    fn end_session_of(&mut self, identity: &Identity) -> Option<Participant> {
        let session_id = self.sessions.find_session_for(identity)?.clone();
        let peer = self.sessions.end_session(&session_id, identity)?;
        self.typing.clear(identity);
        self.typing.clear(&peer.identity);
        info!(session_id = %session_id, "session ended");
        Some(peer)
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        for session in self.sessions.iter() {
            let [a, b] = &session.participants;
            assert_ne!(a.identity, b.identity, "session with one participant");
            for p in [a, b] {
                let id = &p.identity;
                assert!(seen.insert(id.clone()), "{id} in two sessions");
                assert!(!self.queue.contains(id), "{id} waiting and in session");
                assert!(self.registry.lookup(id).is_some(), "{id} in session but gone");
                assert_eq!(self.sessions.find_session_for(&p.identity), Some(&session.id));
            }
        }
        for waiting in self.queue.iter() {
            assert!(self.registry.lookup(waiting).is_some(), "{} waiting but gone", waiting);
        }
    }
}
