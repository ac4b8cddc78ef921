//! In-memory object store, used for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::common::error::{PipelineError, PipelineResult};

use super::domain::{ObjectMeta, ObjectStore, StorePath};

type Objects = BTreeMap<(String, String), Vec<u8>>;

/// Thread-safe map from `(bucket, key)` to object bytes.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<Objects>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, path: &StorePath) -> PipelineResult<MutexGuard<'_, Objects>> {
        self.objects
            .lock()
            .map_err(|_| PipelineError::store(path, "store mutex poisoned"))
    }

    /// Number of stored objects across all buckets.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> PipelineResult<Vec<ObjectMeta>> {
        let scope = StorePath::new(bucket, prefix);
        let objects = self.lock(&scope)?;
        Ok(objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(scope.key()))
            .map(|((_, key), body)| ObjectMeta {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect())
    }

    fn get(&self, path: &StorePath) -> PipelineResult<Vec<u8>> {
        self.lock(path)?
            .get(&(path.bucket().to_string(), path.key().to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::store(path, "no such object"))
    }

    fn put(&self, path: &StorePath, body: &[u8]) -> PipelineResult<()> {
        self.lock(path)?.insert(
            (path.bucket().to_string(), path.key().to_string()),
            body.to_vec(),
        );
        Ok(())
    }
}
