//! Session persistence.
//!
//! The connection manager keeps three independent string records (the
//! endpoint, the claimed configuration and the token) under the keys in
//! [`fakts_protocol::constants`]. Values are opaque JSON strings; callers
//! validate them after reading.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::PoisonError;

use tracing::{debug, warn};

/// Errors from session stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Boxed future returned by [`SessionStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Async key-value storage for session records.
///
/// Removing an absent key is not an error.
pub trait SessionStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// In-memory store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: std::sync::RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SessionStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        let value = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Box::pin(async { Ok(()) })
    }
}

/// Store backed by a single JSON object file.
///
/// Entries are cached in memory and every change replaces the file through
/// a sibling temp file and a rename. A file that does not parse on open is
/// moved aside to `<name>.corrupt` and the store starts empty.
pub struct FileStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens a store at `path`, loading existing entries from disk.
    ///
    /// Only I/O errors fail; unparsable contents are discarded.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: tokio::sync::Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = sibling(&self.path, "tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, entries = map.len(), "persisted session store");
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            // Held across the write so concurrent updates land in order.
            let mut map = self.entries.lock().await;
            map.insert(key.to_string(), value.to_string());
            self.persist(&map).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.entries.lock().await;
            if map.remove(key).is_none() {
                return Ok(());
            }
            self.persist(&map).await
        })
    }
}

fn load_entries(path: &Path) -> Result<HashMap<String, String>, StoreError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str::<HashMap<String, String>>(&data) {
        Ok(entries) => {
            debug!(path = ?path, entries = entries.len(), "loaded session store");
            Ok(entries)
        }
        Err(e) => {
            let aside = sibling(path, "corrupt");
            warn!(path = ?path, moved_to = ?aside, error = %e, "session store unreadable, starting empty");
            std::fs::rename(path, &aside)?;
            Ok(HashMap::new())
        }
    }
}

/// `session.json` -> `session.json.<suffix>` in the same directory.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Returns the default session file path.
pub fn default_session_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("fakts").join("session.json"))
}

/// Returns the platform-specific config directory.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, FileStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path().join("session.json")).unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn memory_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("fakts").await.unwrap(), None);

        store.set("fakts", "{}").await.unwrap();
        assert_eq!(store.get("fakts").await.unwrap().as_deref(), Some("{}"));

        store.remove("fakts").await.unwrap();
        store.remove("fakts").await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn file_store_starts_empty() {
        let (_tmp, store) = test_store();
        assert_eq!(store.get("token").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn file_store_persists_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("session.json");

        {
            let store = FileStore::open(path.clone()).unwrap();
            store.set("endpoint", r#"{"base_url":"http://a/"}"#).await.unwrap();
            store.set("token", r#"{"access_token":"t"}"#).await.unwrap();
        }

        let reloaded = FileStore::open(path).unwrap();
        assert_eq!(
            reloaded.get("endpoint").await.unwrap().as_deref(),
            Some(r#"{"base_url":"http://a/"}"#)
        );
        assert!(reloaded.get("token").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_store_overwrite_and_remove() {
        let (_tmp, store) = test_store();
        store.set("token", "old").await.unwrap();
        store.set("token", "new").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("new"));

        store.remove("token").await.unwrap();
        store.remove("missing").await.unwrap();
        assert_eq!(store.get("token").await.unwrap(), None);

        let reloaded = FileStore::open(store.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn torn_file_is_moved_aside() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");
        {
            let store = FileStore::open(path.clone()).unwrap();
            store.set("fakts", r#"{"auth":{"client_id":"c"}}"#).await.unwrap();
            store.set("token", r#"{"access_token":"t"}"#).await.unwrap();
        }
        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();

        let store = FileStore::open(path.clone()).unwrap();

        assert_eq!(store.get("fakts").await.unwrap(), None);
        assert_eq!(store.get("token").await.unwrap(), None);
        assert!(!path.exists());
        assert!(tmp.path().join("session.json.corrupt").exists());

        store.set("endpoint", "{}").await.unwrap();
        let reloaded = FileStore::open(path).unwrap();
        assert_eq!(reloaded.get("endpoint").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn writes_leave_no_temp_file() {
        let (tmp, store) = test_store();
        store.set("token", "t").await.unwrap();
        store.remove("token").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
    }

    #[test]
    fn default_path_ends_with_session_file() {
        if let Some(path) = default_session_path() {
            assert!(path.ends_with("fakts/session.json"));
        }
    }
}
