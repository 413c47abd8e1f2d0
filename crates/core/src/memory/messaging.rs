//! # Coordination Messaging
//!
//! Best-effort message exchange between agents on top of a
//! [`CoordinationStore`]. Messages are filed under the recipient:
//!
//! ```text
//! agent/{recipient}/coordination/messages/{sender}
//! agent/broadcast/coordination/messages/{sender}   (no recipient)
//! ```
//!
//! Nothing here returns an error: failed sends are logged and failed reads
//! come back empty.

use std::sync::Arc;

use chrono::Utc;
use glob::Pattern;
use serde_json::{json, Value};

use super::store::CoordinationStore;
use crate::models::CoordinationMessage;

pub const BROADCAST: &str = "broadcast";

pub fn message_key(recipient: &str, sender: &str) -> String {
    format!("agent/{}/coordination/messages/{}", recipient, sender)
}

/// Per-agent handle for sending and receiving coordination messages
#[derive(Clone)]
pub struct Messenger {
    agent_id: String,
    store: Arc<dyn CoordinationStore>,
}

impl Messenger {
    pub fn new(agent_id: impl Into<String>, store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            agent_id: agent_id.into(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Send a message. Returns whether the store accepted it.
    #[tracing::instrument(skip(self, message), fields(agent_id = %self.agent_id))]
    pub async fn send(&self, message: &CoordinationMessage) -> bool {
        let recipient = message.to_agent.as_deref().unwrap_or(BROADCAST);
        let key = message_key(recipient, &message.from_agent);

        let payload = match serde_json::to_value(message) {
            Ok(value) => json!({ "message": value, "timestamp": Utc::now().to_rfc3339() }),
            Err(e) => {
                tracing::warn!("failed to encode coordination message: {}", e);
                return false;
            }
        };

        match self.store.store(&key, payload).await {
            Ok(()) => {
                tracing::debug!(key = %key, "coordination message sent");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, "failed to send coordination message: {}", e);
                false
            }
        }
    }

    /// Messages addressed to this agent, from one sender or from everyone,
    /// followed by broadcasts. The agent's own broadcasts are skipped.
    #[tracing::instrument(skip(self), fields(agent_id = %self.agent_id))]
    pub async fn receive(&self, from_agent: Option<&str>) -> Vec<CoordinationMessage> {
        // Ids are matched literally; only the "any sender" wildcard is a glob
        let sender = from_agent.map_or_else(|| "*".to_string(), Pattern::escape);
        let recipient = Pattern::escape(&self.agent_id);
        let mut messages = self.read(&message_key(&recipient, &sender)).await;

        let broadcasts = self.read(&message_key(BROADCAST, &sender)).await;
        messages.extend(
            broadcasts
                .into_iter()
                .filter(|m| m.from_agent != self.agent_id),
        );
        messages
    }

    async fn read(&self, pattern: &str) -> Vec<CoordinationMessage> {
        let values = match self.store.retrieve(pattern).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(pattern, "failed to read coordination messages: {}", e);
                return Vec::new();
            }
        };

        values
            .into_iter()
            .filter_map(|entry| decode(entry, pattern))
            .collect()
    }
}

fn decode(entry: Value, pattern: &str) -> Option<CoordinationMessage> {
    let message = entry.get("message")?.clone();
    match serde_json::from_value(message) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(pattern, "skipping malformed coordination message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WorkerError};
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CoordinationStore for BrokenStore {
        async fn store(&self, _key: &str, _value: Value) -> Result<()> {
            Err(WorkerError::Store("disk full".into()))
        }

        async fn retrieve(&self, _pattern: &str) -> Result<Vec<Value>> {
            Err(WorkerError::Store("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_direct_and_broadcast_delivery() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
        let alice = Messenger::new("alice", store.clone());
        let bob = Messenger::new("bob", store.clone());
        let carol = Messenger::new("carol", store);

        assert!(alice.send(&CoordinationMessage::new("alice", json!("hi bob")).to("bob")).await);
        assert!(carol.send(&CoordinationMessage::new("carol", json!("hi bob too")).to("bob")).await);
        assert!(alice.send(&CoordinationMessage::new("alice", json!("all hands"))).await);

        let all = bob.receive(None).await;
        let contents: Vec<_> = all.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec![json!("hi bob"), json!("hi bob too"), json!("all hands")]);

        let from_carol = bob.receive(Some("carol")).await;
        assert_eq!(from_carol.len(), 1);
        assert_eq!(from_carol[0].from_agent, "carol");

        // Own broadcasts are not echoed back
        assert!(alice.receive(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_ids_with_glob_characters_match_literally() {
        let store = Arc::new(InMemoryStore::new());
        let coder = Messenger::new("coder[1]", store.clone());
        let a = Messenger::new("a", store.clone());
        let other = Messenger::new("coder1", store.clone());
        let starred = Messenger::new("r*", store.clone());
        let r2 = Messenger::new("r2", store);

        assert!(a.send(&CoordinationMessage::new("a", json!("for coder[1]")).to("coder[1]")).await);
        assert!(a.send(&CoordinationMessage::new("a", json!("for coder1")).to("coder1")).await);
        assert!(starred.send(&CoordinationMessage::new("r*", json!("star")).to("coder[1]")).await);
        assert!(r2.send(&CoordinationMessage::new("r2", json!("two")).to("coder[1]")).await);

        let inbox = coder.receive(None).await;
        let contents: Vec<_> = inbox.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec![json!("for coder[1]"), json!("star"), json!("two")]);

        let from_starred = coder.receive(Some("r*")).await;
        assert_eq!(from_starred.len(), 1);
        assert_eq!(from_starred[0].content, json!("star"));

        assert!(coder.receive(Some("[")).await.is_empty());
        assert_eq!(other.receive(None).await[0].content, json!("for coder1"));
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        let messenger = Messenger::new("alice", Arc::new(BrokenStore));

        assert!(!messenger.send(&CoordinationMessage::new("alice", json!(1))).await);
        assert!(messenger.receive(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        store
            .store(&message_key("bob", "mallory"), json!({"message": "not a message"}))
            .await
            .unwrap();
        let bob = Messenger::new("bob", store);

        assert!(bob.receive(Some("mallory")).await.is_empty());
    }
}
