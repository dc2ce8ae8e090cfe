//! Object Store Abstraction
//!
//! Key/bytes storage underneath the metric, state, and profile stores.
//!
//! Implementations:
//! - `InMemoryObjectStore`: For unit tests and DST
//! - `LocalFsObjectStore`: For development and single-node deployments
//! - `SimulatedObjectStore`: Fault-injecting wrapper (see `simulated_store`)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by object store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = IoResult<T>> + Send + 'a>>;

/// Metadata for a stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Object store abstraction trait
///
/// Missing keys surface as `ErrorKind::NotFound` from `get` and `rename`.
pub trait ObjectStore: Send + Sync + 'static {
    /// Put an object (create or overwrite)
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Get an object's contents
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Delete an object; deleting a missing key succeeds
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// List objects with a prefix, sorted by key
    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<ObjectMeta>>;

    /// Rename/move an object, replacing any existing target
    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, ()>;
}

/// Shared, runtime-selected backend
pub type SharedObjectStore = Arc<dyn ObjectStore>;

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        (**self).put(key, data)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        (**self).get(key)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        (**self).delete(key)
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<ObjectMeta>> {
        (**self).list(prefix)
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, ()> {
        (**self).rename(from, to)
    }
}

// ============================================================================
// InMemoryObjectStore - For tests and DST
// ============================================================================

/// In-memory object store; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored objects (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Raw bytes without going through the async API (for testing)
    pub fn snapshot(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().insert(key.to_string(), data.to_vec());
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .cloned()
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<ObjectMeta>> {
        Box::pin(async move {
            let data = self.data.read();
            let mut objects: Vec<ObjectMeta> = data
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| ObjectMeta {
                    key: k.clone(),
                    size_bytes: v.len() as u64,
                })
                .collect();

            objects.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(objects)
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut data = self.data.write();
            match data.remove(from) {
                Some(obj) => {
                    data.insert(to.to_string(), obj);
                    Ok(())
                }
                None => Err(IoError::new(
                    ErrorKind::NotFound,
                    format!("Source key not found: {}", from),
                )),
            }
        })
    }
}

// ============================================================================
// LocalFsObjectStore - For development
// ============================================================================

/// Local filesystem object store; keys map to paths under `base_path`
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    async fn ensure_parent(path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn walk_dir(dir: &Path, base: &Path, prefix: &str, objects: &mut Vec<ObjectMeta>) -> IoResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            walk_dir(&path, base, prefix, objects)?;
        } else if path.is_file() {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let key = relative.to_string_lossy().replace('\\', "/");

            if key.starts_with(prefix) {
                objects.push(ObjectMeta {
                    key,
                    size_bytes: std::fs::metadata(&path)?.len(),
                });
            }
        }
    }
    Ok(())
}

impl ObjectStore for LocalFsObjectStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            Self::ensure_parent(&path).await?;
            tokio::fs::write(&path, data).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move { tokio::fs::read(self.full_path(key)).await })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.full_path(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<ObjectMeta>> {
        Box::pin(async move {
            let base = self.base_path.clone();
            let prefix = prefix.to_string();

            // Directory walking is blocking; keep it off the async workers.
            tokio::task::spawn_blocking(move || {
                let prefix_path = base.join(&prefix);
                let search_dir = if prefix_path.is_dir() {
                    prefix_path
                } else {
                    prefix_path.parent().unwrap_or(&base).to_path_buf()
                };

                let mut objects = Vec::new();
                if search_dir.exists() {
                    walk_dir(&search_dir, &base, &prefix, &mut objects)?;
                }
                objects.sort_by(|a, b| a.key.cmp(&b.key));
                Ok(objects)
            })
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))?
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let to_path = self.full_path(to);
            Self::ensure_parent(&to_path).await?;
            tokio::fs::rename(self.full_path(from), &to_path).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_put_get() {
        let store = InMemoryObjectStore::new();

        store.put("test/key1", b"hello world").await.unwrap();
        let data = store.get("test/key1").await.unwrap();

        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_inmemory_get_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inmemory_list() {
        let store = InMemoryObjectStore::new();

        store.put("metrics/d1/002", b"data2").await.unwrap();
        store.put("metrics/d1/001", b"data1").await.unwrap();
        store.put("state/d1.json", b"data3").await.unwrap();

        let objects = store.list("metrics/").await.unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "metrics/d1/001");
        assert_eq!(objects[1].key, "metrics/d1/002");
    }

    #[tokio::test]
    async fn test_inmemory_rename_replaces_target() {
        let store = InMemoryObjectStore::new();

        store.put("state/d1.json", b"old").await.unwrap();
        store.put("state/d1.json.tmp", b"new").await.unwrap();
        store.rename("state/d1.json.tmp", "state/d1.json").await.unwrap();

        assert_eq!(store.snapshot("state/d1.json").unwrap(), b"new");
        assert!(store.snapshot("state/d1.json.tmp").is_none());
    }

    #[tokio::test]
    async fn test_arc_dyn_store_delegates() {
        let inner = InMemoryObjectStore::new();
        let shared: SharedObjectStore = Arc::new(inner.clone());

        shared.put("k", b"v").await.unwrap();
        assert_eq!(inner.snapshot("k").unwrap(), b"v");
        shared.delete("k").await.unwrap();
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_localfs_put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        store.put("metrics/d1/001.json", b"one").await.unwrap();
        store.put("metrics/d1/002.json", b"two").await.unwrap();
        store.put("state/d1.json", b"state").await.unwrap();

        assert_eq!(store.get("metrics/d1/001.json").await.unwrap(), b"one");
        let missing = store.get("state/d2.json").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let objects = store.list("metrics/d1/").await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["metrics/d1/001.json", "metrics/d1/002.json"]);
        assert!(objects.iter().all(|o| o.size_bytes == 3));
    }

    #[tokio::test]
    async fn test_localfs_rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        store.put("state/d1.json.tmp", b"data").await.unwrap();
        store.rename("state/d1.json.tmp", "state/d1.json").await.unwrap();
        assert_eq!(store.get("state/d1.json").await.unwrap(), b"data");

        store.delete("state/d1.json").await.unwrap();
        store.delete("state/d1.json").await.unwrap();
        assert!(store.get("state/d1.json").await.is_err());
    }
}
