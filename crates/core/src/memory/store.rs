//! # Coordination Store
//!
//! Append-only key/value store shared between agents. Keys are
//! slash-separated paths (`agent/{id}/coordination/messages/{from}`) and
//! retrieval accepts glob patterns where `*` stays inside one segment.

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Result, WorkerError};

/// Shared store agents use to exchange advisory data
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Append `value` under `key`. Earlier values under the same key are kept.
    async fn store(&self, key: &str, value: Value) -> Result<()>;

    /// All values whose key matches `pattern`, in insertion order
    async fn retrieve(&self, pattern: &str) -> Result<Vec<Value>>;
}

/// Compiled key pattern
pub struct KeyPattern {
    pattern: Pattern,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| WorkerError::Store(format!("invalid key pattern '{}': {}", pattern, e)))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.matches_with(
            key,
            MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        )
    }

    /// Literal text before the first wildcard, for prefix pre-filtering
    pub fn literal_prefix(raw: &str) -> &str {
        let end = raw.find(['*', '?', '[']).unwrap_or(raw.len());
        &raw[..end]
    }
}

/// Process-local store for tests and one-shot runs.
///
/// Entries are never evicted, so a long-running worker would grow it
/// without bound; workers default to [`SqliteStore`](super::SqliteStore).
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<(String, Value)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn store(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.push((key.to_string(), value));
        Ok(())
    }

    async fn retrieve(&self, pattern: &str) -> Result<Vec<Value>> {
        let matcher = KeyPattern::new(pattern)?;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, _)| matcher.matches(key))
            .map(|(_, value)| value.clone())
            .collect())
    }
}
