//! In-memory keyed stores for tests and embedding.
//!
//! [`MemoryBackend`] owns a set of namespaces, each a `BTreeMap` of
//! JSON-encoded values behind a shared `RwLock`. Handles returned by
//! [`MemoryBackend::namespace`] see each other's writes, like connections
//! to the same database. Values are serialized on write so the in-memory
//! backend exercises the same encoding paths as the SQLite backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::{KeyedStore, NamespaceAdmin, NamespaceDeletion, StoreValue};

type Namespaces = HashMap<String, BTreeMap<String, String>>;

#[derive(Default)]
struct MemoryInner {
    namespaces: RwLock<Namespaces>,
    failing: AtomicBool,
    deletes_blocked: AtomicBool,
    pending_deletes: RwLock<HashSet<String>>,
}

/// Shared in-memory storage for any number of namespaces.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a typed handle onto the namespace `name`.
    pub fn namespace<T: StoreValue>(&self, name: impl Into<String>) -> InMemoryKeyedStore<T> {
        InMemoryKeyedStore {
            backend: self.clone(),
            namespace: name.into(),
            _marker: PhantomData,
        }
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Simulate open connections: namespace deletion is deferred until
    /// unblocked.
    pub fn set_deletes_blocked(&self, blocked: bool) {
        self.inner.deletes_blocked.store(blocked, Ordering::SeqCst);
        if !blocked {
            let pending: Vec<String> = match self.inner.pending_deletes.write() {
                Ok(mut p) => p.drain().collect(),
                Err(_) => return,
            };
            if let Ok(mut map) = self.inner.namespaces.write() {
                for name in pending {
                    map.remove(&name);
                }
            }
        }
    }

    /// Names of namespaces that currently hold at least one key, sorted.
    pub fn namespace_names(&self) -> Vec<String> {
        let map = match self.inner.namespaces.read() {
            Ok(map) => map,
            Err(_) => return Vec::new(),
        };
        let mut names: Vec<String> = map
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Write raw JSON under a key, bypassing typed encoding. Used to seed
    /// legacy or malformed records.
    pub fn put_raw(&self, namespace: &str, key: &str, json: impl Into<String>) -> StoreResult<()> {
        let mut map = self.write_map()?;
        map.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), json.into());
        Ok(())
    }

    /// Read the raw JSON stored under a key.
    pub fn get_raw(&self, namespace: &str, key: &str) -> StoreResult<Option<String>> {
        let map = self.read_map()?;
        Ok(map.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend set to fail".into()));
        }
        Ok(())
    }

    fn read_map(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Namespaces>> {
        self.inner
            .namespaces
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write_map(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Namespaces>> {
        self.inner
            .namespaces
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("namespaces", &self.namespace_names())
            .finish()
    }
}

#[async_trait]
impl NamespaceAdmin for MemoryBackend {
    async fn delete_namespace(&self, name: &str) -> StoreResult<NamespaceDeletion> {
        self.check_available()?;
        if self.inner.deletes_blocked.load(Ordering::SeqCst) {
            self.inner
                .pending_deletes
                .write()
                .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?
                .insert(name.to_string());
            return Ok(NamespaceDeletion::Pending);
        }
        self.write_map()?.remove(name);
        Ok(NamespaceDeletion::Deleted)
    }
}

/// Typed handle onto one namespace of a [`MemoryBackend`].
pub struct InMemoryKeyedStore<T> {
    backend: MemoryBackend,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for InMemoryKeyedStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> InMemoryKeyedStore<T> {
    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.backend
            .read_map()
            .map(|map| map.get(&self.namespace).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Returns `true` if the namespace holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for InMemoryKeyedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyedStore")
            .field("namespace", &self.namespace)
            .field("key_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl<T: StoreValue> KeyedStore<T> for InMemoryKeyedStore<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        self.backend.check_available()?;
        let raw = {
            let map = self.backend.read_map()?;
            map.get(&self.namespace).and_then(|ns| ns.get(key)).cloned()
        };
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &T) -> StoreResult<()> {
        self.backend.check_available()?;
        let json = serde_json::to_string(value)?;
        self.backend
            .write_map()?
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), json);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.backend.check_available()?;
        if let Some(ns) = self.backend.write_map()?.get_mut(&self.namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.backend.check_available()?;
        let map = self.backend.read_map()?;
        Ok(map
            .get(&self.namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.backend.check_available()?;
        if let Some(ns) = self.backend.write_map()?.get_mut(&self.namespace) {
            ns.clear();
        }
        Ok(())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
