// src/store/mod.rs

//! Artifact store: the single owner of "is this output done?" state.
//!
//! - [`ArtifactStore`] is the abstract interface used by the scheduler and
//!   by task actions.
//! - [`fs::FsArtifactStore`] is the production implementation, rooted at a
//!   base directory with one subtree per entity.
//! - [`memory::MemoryArtifactStore`] keeps everything in memory for tests.
//!
//! Writes always go through an [`ArtifactWriter`]. Bytes are staged and only
//! become visible to [`ArtifactStore::exists`] on [`ArtifactWriter::commit`];
//! a writer dropped without committing (error, cancellation) leaves nothing
//! behind.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::errors::{Result, TrigdagError};
use crate::types::{ArtifactKey, BoxFuture};

pub mod fs;
pub mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Key/value facts persisted as small JSON documents.
pub type Metadata = BTreeMap<String, String>;

/// Abstract artifact store.
pub trait ArtifactStore: Send + Sync + Debug {
    /// True iff the artifact's completion marker is present.
    fn exists(&self, key: &ArtifactKey) -> bool;

    /// Acquire the (exclusive, per-key) write handle for `key`.
    fn open_for_write<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<ArtifactWriter>>;

    /// Read a published artifact. `None` if it is not (fully) present.
    fn read<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Where the payload of `key` lives (or would live).
    fn path_of(&self, key: &ArtifactKey) -> PathBuf;

    /// Stage, write and publish a whole payload in one go.
    fn write_bytes<'a>(&'a self, key: &'a ArtifactKey, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut writer = self.open_for_write(key).await?;
            writer.write(bytes).await?;
            writer.commit().await
        })
    }

    /// Persist a derived fact such as `{"trigdat_version": "v01"}`.
    fn record_metadata<'a>(
        &'a self,
        key: &'a ArtifactKey,
        value: &'a Metadata,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let bytes = serde_json::to_vec_pretty(value)?;
            self.write_bytes(key, &bytes).await
        })
    }

    fn read_metadata<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<Option<Metadata>>> {
        Box::pin(async move {
            match self.read(key).await? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            }
        })
    }
}

/// Backend-specific staging area behind an [`ArtifactWriter`].
pub trait ArtifactSink: Send {
    fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Make the staged payload visible, completion marker last.
    fn publish(self: Box<Self>) -> BoxFuture<'static, io::Result<()>>;

    /// Throw the staged payload away. Must not block for long; runs in `Drop`.
    fn discard(self: Box<Self>);
}

/// Scoped write handle for one artifact.
///
/// Holds the per-key writer lock for its whole lifetime.
pub struct ArtifactWriter {
    key: ArtifactKey,
    sink: Option<Box<dyn ArtifactSink>>,
    bytes_written: u64,
    _lock: OwnedMutexGuard<()>,
}

impl Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("key", &self.key)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl ArtifactWriter {
    pub fn new(key: ArtifactKey, sink: Box<dyn ArtifactSink>, lock: OwnedMutexGuard<()>) -> Self {
        Self {
            key,
            sink: Some(sink),
            bytes_written: 0,
            _lock: lock,
        }
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| TrigdagError::storage(&self.key, "writer already finished"))?;
        sink.write_chunk(chunk)
            .await
            .map_err(|e| TrigdagError::storage(&self.key, e))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Publish the staged payload atomically.
    pub async fn commit(mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| TrigdagError::storage(&self.key, "writer already finished"))?;
        sink.publish()
            .await
            .map_err(|e| TrigdagError::storage(&self.key, e))?;
        debug!(key = %self.key, bytes = self.bytes_written, "artifact published");
        Ok(())
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            debug!(key = %self.key, "discarding uncommitted artifact");
            sink.discard();
        }
    }
}

/// Per-key writer locks: at most one open writer per [`ArtifactKey`].
#[derive(Debug, Default)]
pub struct WriterLocks {
    locks: Mutex<HashMap<ArtifactKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriterLocks {
    pub async fn acquire(&self, key: &ArtifactKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on can go.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
