//! Local storage abstraction and backends.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// A writable byte sink. Dropping it releases the underlying resource, so
/// every exit path of a store attempt cleans up.
pub type StorageSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors returned by a [`RecordingStorage`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// The sink could not be created at the given path.
    #[error("Failed to create sink at `{path}`: {source}")]
    Create { path: PathBuf, source: io::Error },

    /// A write, flush or shutdown on an open sink failed.
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn create(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Create {
            path: path.into(),
            source,
        }
    }
}

/// Storage backend that opens writable sinks for target paths.
///
/// The download workers treat every storage failure as transient, so a
/// malformed target path is not validated up front; it simply surfaces here
/// as a create error.
#[async_trait]
pub trait RecordingStorage: Send + Sync {
    /// Opens a sink at `path`. The caller writes, flushes, then shuts the
    /// sink down; a completed shutdown marks the content as stored.
    async fn create(&self, path: &Path) -> Result<StorageSink, StorageError>;
}

/// Filesystem-backed storage using `tokio::fs`.
///
/// Missing parent directories are created on demand.
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecordingStorage for FsStorage {
    async fn create(&self, path: &Path) -> Result<StorageSink, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StorageError::create(path, source))?;
            }
        }
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|source| StorageError::create(path, source))?;
        Ok(Box::new(file))
    }
}

/// In-memory storage keeping stored files in a shared map.
///
/// Content becomes visible in the map once its sink has been shut down, i.e.
/// once the store step completed. Clones share the same map, so a caller can
/// hold one handle for inspection while the downloader owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content stored at `path`, if a sink for it completed.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    /// Number of completed stores.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

#[async_trait]
impl RecordingStorage for MemoryStorage {
    async fn create(&self, path: &Path) -> Result<StorageSink, StorageError> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            buf: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }
}

struct MemorySink {
    path: PathBuf,
    buf: Vec<u8>,
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let content = std::mem::take(&mut this.buf);
        this.files.lock().insert(this.path.clone(), content);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        let mut sink = storage.create(Path::new("/rec/a.wav")).await.unwrap();

        sink.write_all(b"payload").await.unwrap();
        sink.flush().await.unwrap();
        sink.shutdown().await.unwrap();

        assert_eq!(storage.file("/rec/a.wav").unwrap(), b"payload");
        assert_eq!(storage.file_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_storage_incomplete_sink_stores_nothing() {
        let storage = MemoryStorage::new();
        {
            let mut sink = storage.create(Path::new("/rec/b.wav")).await.unwrap();
            sink.write_all(b"partial").await.unwrap();
            // Dropped without shutdown, e.g. a failed store attempt.
        }
        assert!(storage.file("/rec/b.wav").is_none());
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_fs_storage_writes_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/rec.wav");

        let storage = FsStorage::new();
        let mut sink = storage.create(&path).await.unwrap();
        sink.write_all(b"wave data").await.unwrap();
        sink.flush().await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"wave data");
    }
}
