// src/store/fs.rs

//! Filesystem-backed artifact store.
//!
//! Layout: `<base>/<entity>/<kind subdir>/<file>`, with a hidden completion
//! marker `.<file>.complete` next to each payload. Payloads are staged as
//! `.<file>.partial-<uuid>` and renamed into place on commit, so a reader
//! either sees the previous complete payload or the new complete payload.
//! The staging file is only created by the first written byte, and staging
//! files left behind by a crashed run are swept when the key is next opened.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ArtifactSink, ArtifactStore, ArtifactWriter, WriterLocks};
use crate::errors::{Result, TrigdagError};
use crate::types::{ArtifactKey, BoxFuture};

#[derive(Debug)]
pub struct FsArtifactStore {
    base_dir: PathBuf,
    locks: WriterLocks,
}

impl FsArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: WriterLocks::default(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn marker_path(&self, key: &ArtifactKey) -> PathBuf {
        self.path_of(key)
            .with_file_name(format!(".{}.complete", key.file_name()))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, key: &ArtifactKey) -> bool {
        self.marker_path(key).is_file()
    }

    fn open_for_write<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<ArtifactWriter>> {
        Box::pin(async move {
            let lock = self.locks.acquire(key).await;

            let payload = self.path_of(key);
            let dir = payload
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.base_dir.clone());

            // With the key locked, any staging file for it is a leftover.
            sweep_partials(&dir, &key.file_name()).await;

            let staging = dir.join(format!(".{}.partial-{}", key.file_name(), Uuid::new_v4()));
            debug!(key = %key, staging = ?staging, "opened artifact for write");

            let sink = FsSink {
                file: None,
                dir,
                staging,
                payload,
                marker: self.marker_path(key),
            };
            Ok(ArtifactWriter::new(key.clone(), Box::new(sink), lock))
        })
    }

    fn read<'a>(&'a self, key: &'a ArtifactKey) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            if !self.exists(key) {
                return Ok(None);
            }
            let bytes = fs::read(self.path_of(key)).await?;
            Ok(Some(bytes))
        })
    }

    fn path_of(&self, key: &ArtifactKey) -> PathBuf {
        self.base_dir.join(key.relative_path())
    }
}

/// Remove `.<file_name>.partial-*` files in `dir`. Missing dirs are fine.
async fn sweep_partials(dir: &Path, file_name: &str) {
    let prefix = format!(".{file_name}.partial-");
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(()) => debug!(staging = ?path, "removed stale staging file"),
            Err(e) => warn!(staging = ?path, error = %e, "failed to remove stale staging file"),
        }
    }
}

struct FsSink {
    /// Created on the first chunk.
    file: Option<fs::File>,
    dir: PathBuf,
    staging: PathBuf,
    payload: PathBuf,
    marker: PathBuf,
}

impl FsSink {
    async fn staging_file(&mut self) -> io::Result<&mut fs::File> {
        if self.file.is_none() {
            fs::create_dir_all(&self.dir).await?;
            self.file = Some(fs::File::create(&self.staging).await?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file unavailable"))
    }
}

impl ArtifactSink for FsSink {
    fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { self.staging_file().await?.write_all(chunk).await })
    }

    fn publish(mut self: Box<Self>) -> BoxFuture<'static, io::Result<()>> {
        Box::pin(async move {
            // Empty payloads still go through a staging file.
            let file = self.staging_file().await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(self.file.take());

            if let Err(e) = fs::rename(&self.staging, &self.payload).await {
                let _ = fs::remove_file(&self.staging).await;
                return Err(e);
            }

            // Marker goes last: until it exists the artifact is absent.
            fs::write(&self.marker, b"").await
        })
    }

    fn discard(mut self: Box<Self>) {
        if self.file.take().is_none() {
            return;
        }
        match std::fs::remove_file(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(staging = ?self.staging, error = %e, "failed to remove staging file"),
        }
    }
}
