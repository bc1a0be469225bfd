//! Session registry: which topics currently have a live directory and
//! pipe listener.
//!
//! Owned and mutated by the dispatch loop only. Each active session holds a
//! child of the process shutdown token; a listener observes that token and
//! nothing else, so deactivating a topic never races with the listener.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub struct SessionRegistry {
    shutdown: CancellationToken,
    sessions: BTreeMap<String, CancellationToken>,
}

impl SessionRegistry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            sessions: BTreeMap::new(),
        }
    }

    /// Mark `topic` active. Returns `true` only if this call activated it,
    /// meaning the caller must start its listener.
    pub fn ensure_active(&mut self, topic: &str) -> bool {
        if self.sessions.contains_key(topic) {
            return false;
        }
        self.sessions
            .insert(topic.to_string(), self.shutdown.child_token());
        true
    }

    /// Remove `topic`. Its listener exits before forwarding another line.
    pub fn deactivate(&mut self, topic: &str) {
        if let Some(token) = self.sessions.remove(topic) {
            token.cancel();
        }
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.sessions.contains_key(topic)
    }

    /// Token the listener for `topic` watches.
    pub fn session_token(&self, topic: &str) -> Option<CancellationToken> {
        self.sessions.get(topic).cloned()
    }

    /// Active topics in sorted order.
    pub fn active_topics(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}
