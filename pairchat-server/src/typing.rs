//! Short-lived typing indicators.
//!
//! Time is passed in by the caller so the sweeper and tests share one clock.

use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingRecord {
    pub peer: Identity,
    pub last_signaled: Instant,
}

/// At most one record per owner.
#[derive(Debug)]
pub struct TypingTracker {
    records: HashMap<Identity, TypingRecord>,
    quiet: Duration,
}

impl TypingTracker {
    pub fn new(quiet: Duration) -> Self {
        Self {
            records: HashMap::new(),
            quiet,
        }
    }

    pub fn signal(&mut self, owner: &Identity, peer: &Identity, now: Instant) {
        self.records.insert(
            owner.clone(),
            TypingRecord {
                peer: peer.clone(),
                last_signaled: now,
            },
        );
    }

    /// Removes the owner's record, returning the peer it pointed at.
    /// Clearing an absent record is a no-op.
    pub fn clear(&mut self, owner: &Identity) -> Option<Identity> {
        self.records.remove(owner).map(|record| record.peer)
    }

    /// Removes every record quiet for longer than the interval and returns
    /// `(owner, peer)` for each.
    pub fn expire(&mut self, now: Instant) -> Vec<(Identity, Identity)> {
        let quiet = self.quiet;
        let mut expired = Vec::new();
        self.records.retain(|owner, record| {
            if now.saturating_duration_since(record.last_signaled) > quiet {
                expired.push((owner.clone(), record.peer.clone()));
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn get(&self, owner: &Identity) -> Option<&TypingRecord> {
        self.records.get(owner)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
