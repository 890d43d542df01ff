use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::{PriorityClass, TakenDateSet, Ts};

use super::{KeyValueStore, StoreError, TakenDateStore};

pub const DEFAULT_NAMESPACE: &str = "postslot";
pub const DEFAULT_KEY: &str = "taken_dates";

/// Keeps the whole [`TakenDateSet`] as one JSON document under a fixed
/// `(namespace, key)`.
///
/// Saving one class rewrites the document, so saves are serialized here;
/// otherwise two classes saving at once would drop one of the updates.
pub struct KvTakenDates {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
    key: String,
    document: Mutex<()>,
}

impl KvTakenDates {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_location(kv, DEFAULT_NAMESPACE, DEFAULT_KEY)
    }

    pub fn with_location(
        kv: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
            key: key.into(),
            document: Mutex::new(()),
        }
    }

    pub async fn load_all(&self) -> Result<TakenDateSet, StoreError> {
        match self.kv.get(&self.namespace, &self.key).await? {
            None => Ok(TakenDateSet::new()),
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                StoreError::Corrupt(format!("{}/{}: {e}", self.namespace, self.key))
            }),
        }
    }
}

#[async_trait]
impl TakenDateStore for KvTakenDates {
    async fn load(&self, class: PriorityClass) -> Result<Vec<Ts>, StoreError> {
        Ok(self.load_all().await?.get(class).to_vec())
    }

    async fn save(&self, class: PriorityClass, taken: &[Ts]) -> Result<(), StoreError> {
        let _doc = self.document.lock().await;
        let mut set = self.load_all().await?;
        set.set(class, taken.to_vec());
        let json = serde_json::to_string(&set)
            .map_err(|e| StoreError::Corrupt(format!("encode taken dates: {e}")))?;
        self.kv.put(&self.namespace, &self.key, json).await
    }
}
