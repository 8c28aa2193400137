//! Local key-value persistence.
//!
//! A small JSON file mapping string keys to arbitrary JSON values. It holds
//! per-user watchlists (`watchlist_<username>`) and the last session.

use crate::error::Result;
use crate::session::Session;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const CURRENT_USER_KEY: &str = "currentUser";
const AUTH_FLAG_KEY: &str = "isAuthenticated";

/// Storage key of a user's watchlist.
pub fn watchlist_key(username: &str) -> String {
    format!("watchlist_{}", username)
}

/// JSON file-backed key-value store.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl KvStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Map::new()
        };
        debug!("Opened key-value store at {}", path.display());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize a value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.entries
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Serialize and write a value, flushing the file.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.entries
            .insert(key.to_string(), serde_json::to_value(value)?);
        self.flush()
    }

    /// Remove a key. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Market pair IDs on the user's watchlist.
    pub fn load_watchlist(&self, username: &str) -> Result<Vec<String>> {
        Ok(self.get(&watchlist_key(username))?.unwrap_or_default())
    }

    pub fn save_watchlist(&mut self, username: &str, pairs: &[String]) -> Result<()> {
        self.set(&watchlist_key(username), &pairs)
    }

    /// Add a pair to the watchlist. Returns false if it was already there.
    pub fn watch(&mut self, username: &str, pair_id: &str) -> Result<bool> {
        let mut pairs = self.load_watchlist(username)?;
        if pairs.iter().any(|p| p == pair_id) {
            return Ok(false);
        }
        pairs.push(pair_id.to_string());
        self.save_watchlist(username, &pairs)?;
        Ok(true)
    }

    /// Remove a pair from the watchlist. Returns false if it was absent.
    pub fn unwatch(&mut self, username: &str, pair_id: &str) -> Result<bool> {
        let mut pairs = self.load_watchlist(username)?;
        let before = pairs.len();
        pairs.retain(|p| p != pair_id);
        if pairs.len() == before {
            return Ok(false);
        }
        self.save_watchlist(username, &pairs)?;
        Ok(true)
    }

    /// The persisted session, if any.
    pub fn current_user(&self) -> Result<Option<Session>> {
        self.get(CURRENT_USER_KEY)
    }

    /// Persist the session and mark it authenticated.
    pub fn set_current_user(&mut self, session: &Session) -> Result<()> {
        self.entries
            .insert(CURRENT_USER_KEY.to_string(), serde_json::to_value(session)?);
        self.entries
            .insert(AUTH_FLAG_KEY.to_string(), Value::Bool(session.is_authenticated()));
        self.flush()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.entries.get(AUTH_FLAG_KEY), Some(Value::Bool(true)))
    }

    /// Forget the session. Watchlists are kept.
    pub fn clear_session(&mut self) -> Result<()> {
        self.entries.remove(CURRENT_USER_KEY);
        self.entries.remove(AUTH_FLAG_KEY);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        // Replace atomically via rename
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create_test_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("storage.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_watchlist_key() {
        assert_eq!(watchlist_key("alice"), "watchlist_alice");
    }

    #[test]
    fn test_watchlist_persists_across_reopen() {
        let (dir, mut store) = create_test_store();
        assert!(store.watch("alice", "btc-usdt").unwrap());
        assert!(store.watch("alice", "eth-usdt").unwrap());
        assert!(!store.watch("alice", "btc-usdt").unwrap());
        assert!(store.unwatch("alice", "eth-usdt").unwrap());
        assert!(!store.unwatch("alice", "sol-usdt").unwrap());

        let reopened = KvStore::open(dir.path().join("storage.json")).unwrap();
        assert_eq!(
            reopened.load_watchlist("alice").unwrap(),
            vec!["btc-usdt".to_string()]
        );
        assert!(reopened.load_watchlist("bob").unwrap().is_empty());
        assert!(reopened.contains("watchlist_alice"));
    }

    #[test]
    fn test_session_round_trip() {
        let (_dir, mut store) = create_test_store();
        assert!(!store.is_authenticated());
        assert_eq!(store.current_user().unwrap(), None);

        let session = Session::new("alice").with_token("abc");
        store.set_current_user(&session).unwrap();
        assert!(store.is_authenticated());
        assert_eq!(store.current_user().unwrap(), Some(session));

        store.save_watchlist("alice", &["btc-usdt".to_string()]).unwrap();
        store.clear_session().unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(store.load_watchlist("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            KvStore::open(&path),
            Err(crate::Error::Serialization(_))
        ));
    }
}
