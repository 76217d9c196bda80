//! Live chat sessions and their message logs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pairchat_common::HistoryEntry;
use tracing::debug;

use crate::Identity;

pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: Identity,
    pub label: String,
}

impl Participant {
    pub fn new(identity: Identity, label: impl Into<String>) -> Self {
        Self {
            identity,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggedMessage {
    pub seq: u64,
    pub sender: Identity,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: SessionId,
    pub participants: [Participant; 2],
    pub messages: Vec<LoggedMessage>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn participant(&self, identity: &Identity) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.identity == identity)
    }

    pub fn peer_of(&self, identity: &Identity) -> Option<&Participant> {
        self.participant(identity)?;
        self.participants.iter().find(|p| &p.identity != identity)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|msg| HistoryEntry {
                seq: msg.seq,
                sender_label: self
                    .participant(&msg.sender)
                    .map(|p| p.label.clone())
                    .unwrap_or_default(),
                text: msg.text.clone(),
                sent_at: msg.sent_at,
            })
            .collect()
    }
}

/// Sessions by id, plus an identity → session index for the relay path.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, ChatSession>,
    by_identity: HashMap<Identity, SessionId>,
}

impl SessionStore {
    /// Creates a session for two distinct identities, neither of which may
    /// already be in a session. The caller checks both conditions.
    pub fn create_session(&mut self, a: Participant, b: Participant) -> SessionId {
        debug_assert_ne!(a.identity, b.identity);
        debug_assert!(!self.by_identity.contains_key(&a.identity));
        debug_assert!(!self.by_identity.contains_key(&b.identity));

        let id: SessionId = nanoid::nanoid!(12);
        self.by_identity.insert(a.identity.clone(), id.clone());
        self.by_identity.insert(b.identity.clone(), id.clone());
        self.sessions.insert(
            id.clone(),
            ChatSession {
                id: id.clone(),
                participants: [a, b],
                messages: Vec::new(),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn find_session_for(&self, identity: &Identity) -> Option<&SessionId> {
        self.by_identity.get(identity)
    }

    pub fn get(&self, session_id: &str) -> Option<&ChatSession> {
        self.sessions.get(session_id)
    }

    /// Appends to the log and returns the message's sequence position.
    pub fn append_message(
        &mut self,
        session_id: &str,
        sender: &Identity,
        text: impl Into<String>,
    ) -> Option<u64> {
        let session = self.sessions.get_mut(session_id)?;
        session.participant(sender)?;

        let seq = session.messages.len() as u64;
        session.messages.push(LoggedMessage {
            seq,
            sender: sender.clone(),
            text: text.into(),
            sent_at: Utc::now(),
        });
        Some(seq)
    }

    /// Removes the session and returns the participant other than `ending`.
    /// Later calls for the same id return `None`.
    pub fn end_session(&mut self, session_id: &str, ending: &Identity) -> Option<Participant> {
        let session = self.sessions.remove(session_id)?;
        for participant in &session.participants {
            self.by_identity.remove(&participant.identity);
        }
        let lasted = Utc::now().signed_duration_since(session.created_at);
        debug!(
            session_id,
            messages = session.messages.len(),
            lasted_secs = lasted.num_seconds(),
            "session removed"
        );

        let [a, b] = session.participants;
        if &a.identity == ending {
            Some(b)
        } else {
            Some(a)
        }
    }

    pub fn history(&self, session_id: &str) -> Option<Vec<HistoryEntry>> {
        self.get(session_id).map(ChatSession::history)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatSession> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(store: &mut SessionStore) -> SessionId {
        store.create_session(
            Participant::new(Identity::from("a"), "A"),
            Participant::new(Identity::from("b"), "B"),
        )
    }

    #[test]
    fn create_indexes_both_participants() {
        let mut store = SessionStore::default();
        let id = pair(&mut store);

        assert_eq!(store.find_session_for(&Identity::from("a")), Some(&id));
        assert_eq!(store.find_session_for(&Identity::from("b")), Some(&id));
        assert_eq!(store.find_session_for(&Identity::from("c")), None);

        let session = store.get(&id).unwrap();
        assert_eq!(session.peer_of(&Identity::from("a")).unwrap().label, "B");
        assert!(session.peer_of(&Identity::from("c")).is_none());
    }

    #[test]
    fn history_preserves_append_order() {
        let mut store = SessionStore::default();
        let id = pair(&mut store);
        let a = Identity::from("a");
        let b = Identity::from("b");

        assert_eq!(store.append_message(&id, &a, "hi"), Some(0));
        assert_eq!(store.append_message(&id, &a, "anyone?"), Some(1));
        assert_eq!(store.append_message(&id, &b, "hello"), Some(2));

        let history = store.history(&id).unwrap();
        let log: Vec<_> = history
            .iter()
            .map(|e| (e.sender_label.as_str(), e.text.as_str()))
            .collect();
        assert_eq!(log, vec![("A", "hi"), ("A", "anyone?"), ("B", "hello")]);
    }

    #[test]
    fn non_participant_cannot_append() {
        let mut store = SessionStore::default();
        let id = pair(&mut store);
        assert_eq!(store.append_message(&id, &Identity::from("c"), "intrude"), None);
        assert_eq!(store.append_message("missing", &Identity::from("a"), "hi"), None);
    }

    #[test]
    fn end_session_is_once_only() {
        let mut store = SessionStore::default();
        let id = pair(&mut store);

        let other = store.end_session(&id, &Identity::from("b"));
        assert_eq!(other.map(|p| p.identity), Some(Identity::from("a")));
        assert!(store.end_session(&id, &Identity::from("b")).is_none());
        assert!(store.find_session_for(&Identity::from("a")).is_none());
        assert!(store.history(&id).is_none());
        assert!(store.is_empty());
    }
}
