//! In-memory object store.

use std::collections::BTreeMap;
use std::sync::Arc;
use super::{ObjectStore, Payload, Result};
use super::trait_::{validate_bucket, validate_key};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

/// Object store keeping every object in memory.
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys stored in a bucket, sorted.
    pub async fn list_keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_stream(&self, bucket: &str, key: &str, mut payload: Payload) -> Result<()> {
        validate_bucket(bucket)?;
        validate_key(key)?;

        let mut body = Vec::new();
        payload.read_to_end(&mut body).await?;
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        Ok(self
            .objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }
}
