use async_trait::async_trait;
use dashmap::DashMap;

use super::{KeyValueStore, StoreError};

/// Volatile key-value store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<(String, String), String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn put(&self, namespace: &str, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}
