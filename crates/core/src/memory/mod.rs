//! # Coordination Memory
//!
//! Shared key/value store and the messaging layer agents build on it.
//!
//! ## Backends
//!
//! - [`InMemoryStore`] - process-local, for tests and one-shot runs
//! - [`SqliteStore`] - `.hive/coordination.db`, shared across processes

pub mod messaging;
pub mod sqlite_store;
pub mod store;

use std::sync::Arc;

pub use messaging::{message_key, Messenger, BROADCAST};
pub use sqlite_store::SqliteStore;
pub use store::{CoordinationStore, InMemoryStore, KeyPattern};

use crate::config::{MemoryBackend, MemoryConfig};
use crate::error::Result;

/// Open the store selected by `config`
pub fn open_store(config: &MemoryConfig) -> Result<Arc<dyn CoordinationStore>> {
    match config.backend {
        MemoryBackend::Sqlite => Ok(Arc::new(SqliteStore::open_at(
            &config.path,
            &config.namespace,
        )?)),
        MemoryBackend::InMemory => Ok(Arc::new(InMemoryStore::new())),
    }
}
