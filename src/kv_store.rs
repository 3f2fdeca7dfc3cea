//! Namespaced key-value storage for client-side state: last-submit
//! timestamps per client, edited email templates and email styles.
//!
//! Two backends ship: [`InMemoryKeyValueStore`] and [`FileKeyValueStore`],
//! which keeps one JSON document per namespace under a directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::ServiceError;

static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_\-]{1,64}$").expect("namespace pattern is valid"));

#[derive(Debug, Error)]
pub enum KeyValueError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
}

impl From<KeyValueError> for ServiceError {
    fn from(err: KeyValueError) -> Self {
        match err {
            KeyValueError::InvalidNamespace(ns) => {
                ServiceError::InternalError(format!("invalid storage namespace {ns}"))
            }
            other => ServiceError::InternalError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KeyValueError>;
    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeyValueError>;
    /// All entries of a namespace, ordered by key
    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>, KeyValueError>;
    /// Returns whether an entry was removed
    async fn remove(&self, namespace: &str, key: &str) -> Result<bool, KeyValueError>;
    /// Drops every entry for which `keep(key, value)` is false; returns how many went
    async fn retain(
        &self,
        namespace: &str,
        keep: &(dyn for<'a, 'b> Fn(&'a str, &'b str) -> bool + Send + Sync),
    ) -> Result<usize, KeyValueError>;
}

fn check_namespace(namespace: &str) -> Result<(), KeyValueError> {
    if NAMESPACE_PATTERN.is_match(namespace) {
        Ok(())
    } else {
        Err(KeyValueError::InvalidNamespace(namespace.to_string()))
    }
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
) -> Result<Option<T>, KeyValueError> {
    match store.get(namespace, key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<(), KeyValueError> {
    let raw = serde_json::to_string(value)?;
    store.set(namespace, key, &raw).await
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    namespaces: DashMap<String, BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KeyValueError> {
        check_namespace(namespace)?;
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeyValueError> {
        check_namespace(namespace)?;
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>, KeyValueError> {
        check_namespace(namespace)?;
        Ok(self
            .namespaces
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool, KeyValueError> {
        check_namespace(namespace)?;
        Ok(self
            .namespaces
            .get_mut(namespace)
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn retain(
        &self,
        namespace: &str,
        keep: &(dyn for<'a, 'b> Fn(&'a str, &'b str) -> bool + Send + Sync),
    ) -> Result<usize, KeyValueError> {
        check_namespace(namespace)?;
        Ok(self
            .namespaces
            .get_mut(namespace)
            .map(|mut entries| {
                let before = entries.len();
                entries.retain(|k, v| keep(k, v));
                before - entries.len()
            })
            .unwrap_or(0))
    }
}

/// JSON-file backend: `<dir>/<namespace>.json` holds an object of entries.
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, KeyValueError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "opened file key-value store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    async fn load(&self, namespace: &str) -> Result<BTreeMap<String, String>, KeyValueError> {
        check_namespace(namespace)?;
        match tokio::fs::read(self.path_for(namespace)).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!(namespace, error = %e, "corrupt key-value namespace file");
                KeyValueError::from(e)
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(
        &self,
        namespace: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), KeyValueError> {
        let path = self.path_for(namespace);
        let tmp = self.dir.join(format!(".{namespace}.json.tmp"));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, KeyValueError> {
        Ok(self.load(namespace).await?.remove(key))
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeyValueError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(namespace).await?;
        entries.insert(key.to_string(), value.to_string());
        self.store(namespace, &entries).await
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, String)>, KeyValueError> {
        Ok(self.load(namespace).await?.into_iter().collect())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool, KeyValueError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(namespace).await?;
        let removed = entries.remove(key).is_some();
        if removed {
            self.store(namespace, &entries).await?;
        }
        Ok(removed)
    }

    async fn retain(
        &self,
        namespace: &str,
        keep: &(dyn for<'a, 'b> Fn(&'a str, &'b str) -> bool + Send + Sync),
    ) -> Result<usize, KeyValueError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(namespace).await?;
        let before = entries.len();
        entries.retain(|k, v| keep(k, v));
        let removed = before - entries.len();
        if removed > 0 {
            self.store(namespace, &entries).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_namespaces_are_isolated() {
        let store = InMemoryKeyValueStore::new();
        store.set("email_templates", "a", "1").await.unwrap();
        store.set("email_styles", "a", "2").await.unwrap();

        assert_eq!(
            store.get("email_templates", "a").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(store.list("email_styles").await.unwrap().len(), 1);
        assert!(store.remove("email_templates", "a").await.unwrap());
        assert!(!store.remove("email_templates", "a").await.unwrap());
        assert!(store.get("email_templates", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_path_like_namespaces() {
        let store = InMemoryKeyValueStore::new();
        let err = store.set("../etc", "k", "v").await.unwrap_err();
        assert!(matches!(err, KeyValueError::InvalidNamespace(_)));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKeyValueStore::open(dir.path()).await.unwrap();
            store.set("submission_throttle", "client-1", "42").await.unwrap();
            store.set("submission_throttle", "client-0", "7").await.unwrap();
        }

        let store = FileKeyValueStore::open(dir.path()).await.unwrap();
        let entries = store.list("submission_throttle").await.unwrap();
        assert_eq!(
            entries,
            vec![
                ("client-0".to_string(), "7".to_string()),
                ("client-1".to_string(), "42".to_string()),
            ]
        );
        assert!(store.get("email_styles", "current").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retain_drops_rejected_entries_in_both_backends() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileKeyValueStore::open(dir.path()).await.unwrap();
        let memory = InMemoryKeyValueStore::new();
        let stores: [&dyn KeyValueStore; 2] = [&memory, &file];

        for store in stores {
            for (key, value) in [("old-1", "1"), ("fresh", "90"), ("old-2", "5")] {
                store.set("submission_throttle", key, value).await.unwrap();
            }
            let keep = |_: &str, value: &str| value.parse::<u32>().map_or(false, |v| v > 10);
            assert_eq!(store.retain("submission_throttle", &keep).await.unwrap(), 2);
            assert_eq!(
                store.list("submission_throttle").await.unwrap(),
                vec![("fresh".to_string(), "90".to_string())]
            );
            assert_eq!(store.retain("submission_throttle", &keep).await.unwrap(), 0);
        }

        let reopened = FileKeyValueStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list("submission_throttle").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn json_helpers_round_trip_typed_values() {
        let store = InMemoryKeyValueStore::new();
        set_json(&store, "email_styles", "current", &vec![1u8, 2, 3])
            .await
            .unwrap();
        let back: Option<Vec<u8>> = get_json(&store, "email_styles", "current").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }
}
