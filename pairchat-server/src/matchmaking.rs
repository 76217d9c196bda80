//! FIFO readiness queue.

use std::collections::VecDeque;

use crate::Identity;

/// Outcome of a pairing request against the readiness queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairing {
    /// The partner has already been taken off the queue
    Matched(Identity),
    Waiting,
}

/// Identities that asked to be paired and have no partner yet, oldest first.
#[derive(Debug, Default)]
pub struct ReadinessQueue {
    waiting: VecDeque<Identity>,
}

impl ReadinessQueue {
    /// Pairs `identity` with the longest-waiting other identity, or enqueues it.
    ///
    /// A repeated request from an identity that is already waiting leaves the
    /// queue untouched.
    pub fn request(&mut self, identity: &Identity) -> Pairing {
        if self.contains(identity) {
            return Pairing::Waiting;
        }

        match self.waiting.pop_front() {
            Some(partner) => Pairing::Matched(partner),
            None => {
                self.waiting.push_back(identity.clone());
                Pairing::Waiting
            }
        }
    }

    pub fn remove(&mut self, identity: &Identity) -> bool {
        match self.waiting.iter().position(|waiting| waiting == identity) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.waiting.contains(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.waiting.iter()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
