mod memory;
mod taken;
mod wal_kv;

pub use memory::MemoryKv;
pub use taken::{KvTakenDates, DEFAULT_KEY, DEFAULT_NAMESPACE};
pub use wal_kv::WalKv;

use std::io;

use async_trait::async_trait;

use crate::model::{PriorityClass, Ts};

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// Stored value could not be decoded.
    Corrupt(String),
    /// Background writer is gone.
    Closed(&'static str),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::Corrupt(msg) => write!(f, "store value corrupt: {msg}"),
            StoreError::Closed(msg) => write!(f, "store closed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Namespaced key-value persistence. Values are opaque strings.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, namespace: &str, key: &str, value: String) -> Result<(), StoreError>;
}

/// Per-class reservation list the allocator reads and rewrites.
#[async_trait]
pub trait TakenDateStore: Send + Sync {
    /// Empty if the class was never used.
    async fn load(&self, class: PriorityClass) -> Result<Vec<Ts>, StoreError>;

    /// Replace the stored sequence for `class` with `taken`. No merging.
    async fn save(&self, class: PriorityClass, taken: &[Ts]) -> Result<(), StoreError>;
}
