use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreResult;

/// Bound for values that can live in a keyed store.
pub trait StoreValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Async key/value persistence over a single entity type within one
/// namespace.
///
/// All implementations must satisfy these invariants:
/// - Every call is a single atomic transaction.
/// - `list()` returns keys in ascending order.
/// - Underlying transport failures are returned as `Err`, never swallowed.
#[async_trait]
pub trait KeyedStore<T: StoreValue>: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<T>>;

    /// Create or overwrite the value stored under `key`.
    async fn set(&self, key: &str, value: &T) -> StoreResult<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// All keys in the namespace, ascending.
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Remove every key in the namespace.
    async fn clear(&self) -> StoreResult<()>;

    /// Namespace this handle addresses.
    fn namespace(&self) -> &str;
}

/// Outcome of [`NamespaceAdmin::delete_namespace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceDeletion {
    /// The namespace and all its keys are gone.
    Deleted,
    /// The engine deferred deletion because other connections are open.
    /// Callers treat this as success.
    Pending,
}

/// Out-of-band administration of whole namespaces.
#[async_trait]
pub trait NamespaceAdmin: Send + Sync {
    /// Remove an entire logical store.
    async fn delete_namespace(&self, name: &str) -> StoreResult<NamespaceDeletion>;
}
