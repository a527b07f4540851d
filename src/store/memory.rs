// src/store/memory.rs

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{ArtifactSink, ArtifactStore, ArtifactWriter, WriterLocks};
use crate::errors::Result;
use crate::types::{ArtifactKey, BoxFuture};

type Published = Arc<Mutex<HashMap<ArtifactKey, Vec<u8>>>>;

/// In-memory artifact store for tests.
///
/// Cloning shares the underlying map, so a test can keep a handle while the
/// scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    published: Published,
    locks: Arc<WriterLocks>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `key` directly, as if an earlier run had produced it.
    pub fn insert(&self, key: ArtifactKey, content: impl Into<Vec<u8>>) {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.insert(key, content.into());
    }

    /// Make every subsequent write fail, to exercise storage error paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<ArtifactKey> {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = published.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, key: &ArtifactKey) -> bool {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.contains_key(key)
    }

    fn open_for_write<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<ArtifactWriter>> {
        Box::pin(async move {
            let lock = self.locks.acquire(key).await;
            let sink = MemorySink {
                key: key.clone(),
                buf: Vec::new(),
                published: Arc::clone(&self.published),
                fail: self.fail_writes.load(Ordering::SeqCst),
            };
            Ok(ArtifactWriter::new(key.clone(), Box::new(sink), lock))
        })
    }

    fn read<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            Ok(published.get(key).cloned())
        })
    }

    fn path_of(&self, key: &ArtifactKey) -> PathBuf {
        PathBuf::from("memory").join(key.relative_path())
    }
}

struct MemorySink {
    key: ArtifactKey,
    buf: Vec<u8>,
    published: Published,
    fail: bool,
}

impl ArtifactSink for MemorySink {
    fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            if self.fail {
                return Err(io::Error::other("simulated disk full"));
            }
            self.buf.extend_from_slice(chunk);
            Ok(())
        })
    }

    fn publish(self: Box<Self>) -> BoxFuture<'static, io::Result<()>> {
        Box::pin(async move {
            if self.fail {
                return Err(io::Error::other("simulated disk full"));
            }
            let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            published.insert(self.key.clone(), self.buf.clone());
            Ok(())
        })
    }

    fn discard(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entity;
    use std::time::Duration;

    #[tokio::test]
    async fn second_writer_waits_for_first() {
        let store = MemoryArtifactStore::new();
        let key = ArtifactKey::trigger_record(&Entity::new("GRB1").unwrap());

        let first = store.open_for_write(&key).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), store.open_for_write(&key)).await;
        assert!(second.is_err(), "second writer must block while first is open");

        first.commit().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), store.open_for_write(&key)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let store = MemoryArtifactStore::new();
        let key = ArtifactKey::trigger_record(&Entity::new("GRB1").unwrap());
        store.fail_writes(true);

        let err = store.write_bytes(&key, b"{}").await.unwrap_err();
        assert!(matches!(err, crate::errors::TrigdagError::StorageWrite { .. }));
        assert!(!store.exists(&key));
    }
}
