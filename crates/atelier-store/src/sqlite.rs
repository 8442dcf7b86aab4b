//! SQLite-backed keyed stores.
//!
//! Each namespace is a table `kv_<name>_<hash>` with `(key TEXT PRIMARY KEY,
//! value TEXT)`. Values are stored as JSON text. Every operation runs on the
//! blocking pool, opens its own connection, performs one transaction, and
//! drops the connection when done.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{KeyedStore, NamespaceAdmin, NamespaceDeletion, StoreValue};

/// How long a regular transaction waits on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry schedule for namespace deletions deferred by open connections.
const DEFERRED_DROP_ATTEMPTS: u32 = 10;
const DEFERRED_DROP_BACKOFF: Duration = Duration::from_millis(200);

/// A SQLite database file holding any number of namespaces.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    path: Arc<PathBuf>,
}

impl SqliteBackend {
    /// Point at a database file. The file and its parent directory are created
    /// lazily by the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a typed handle onto the namespace `name`.
    pub fn namespace<T: StoreValue>(&self, name: impl Into<String>) -> SqliteKeyedStore<T> {
        let namespace = name.into();
        SqliteKeyedStore {
            table: table_name(&namespace),
            namespace,
            path: Arc::clone(&self.path),
            ready: Arc::new(OnceCell::new()),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl NamespaceAdmin for SqliteBackend {
    async fn delete_namespace(&self, name: &str) -> StoreResult<NamespaceDeletion> {
        let path = Arc::clone(&self.path);
        let table = table_name(name);
        let outcome = run_blocking({
            let path = Arc::clone(&path);
            let table = table.clone();
            move || try_drop_table(&path, &table)
        })
        .await?;

        if outcome == NamespaceDeletion::Pending {
            debug!(namespace = name, "namespace deletion deferred by open connections");
            let namespace = name.to_string();
            tokio::spawn(async move {
                for _ in 0..DEFERRED_DROP_ATTEMPTS {
                    tokio::time::sleep(DEFERRED_DROP_BACKOFF).await;
                    let attempt = run_blocking({
                        let path = Arc::clone(&path);
                        let table = table.clone();
                        move || try_drop_table(&path, &table)
                    })
                    .await;
                    match attempt {
                        Ok(NamespaceDeletion::Deleted) => {
                            debug!(namespace = %namespace, "deferred namespace deletion completed");
                            return;
                        }
                        Ok(NamespaceDeletion::Pending) => continue,
                        Err(e) => {
                            warn!(namespace = %namespace, error = %e, "deferred namespace deletion failed");
                            return;
                        }
                    }
                }
                warn!(namespace = %namespace, "namespace deletion still blocked; giving up");
            });
        }

        Ok(outcome)
    }
}

/// Typed handle onto one namespace of a [`SqliteBackend`].
///
/// Table creation is memoized per handle: the first caller pays for it and
/// concurrent first callers await the same setup. A handle must not be used
/// after its namespace is deleted; open a fresh one instead.
pub struct SqliteKeyedStore<T> {
    namespace: String,
    table: String,
    path: Arc<PathBuf>,
    ready: Arc<OnceCell<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteKeyedStore<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            table: self.table.clone(),
            path: Arc::clone(&self.path),
            ready: Arc::clone(&self.ready),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SqliteKeyedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKeyedStore")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .finish()
    }
}

impl<T> SqliteKeyedStore<T> {
    async fn ensure_table(&self) -> StoreResult<()> {
        self.ready
            .get_or_try_init(|| {
                let path = Arc::clone(&self.path);
                let table = self.table.clone();
                let namespace = self.namespace.clone();
                async move {
                    run_blocking(move || {
                        if let Some(parent) = path.parent() {
                            if !parent.as_os_str().is_empty() {
                                std::fs::create_dir_all(parent)?;
                            }
                        }
                        let conn = open(&path)?;
                        conn.execute_batch(&format!(
                            "CREATE TABLE IF NOT EXISTS {table} (
                                key   TEXT PRIMARY KEY NOT NULL,
                                value TEXT NOT NULL
                            )"
                        ))
                        .map_err(|e| tx_error(&namespace, e))?;
                        debug!(namespace = %namespace, "namespace table ready");
                        Ok(())
                    })
                    .await
                }
            })
            .await
            .map(|_| ())
    }

    /// Run `op` inside one transaction on a fresh connection.
    async fn transact<R, F>(&self, op: F) -> StoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&rusqlite::Transaction<'_>, &str) -> rusqlite::Result<R> + Send + 'static,
    {
        self.ensure_table().await?;
        let path = Arc::clone(&self.path);
        let table = self.table.clone();
        let namespace = self.namespace.clone();
        run_blocking(move || {
            let mut conn = open(&path)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| tx_error(&namespace, e))?;
            let out = op(&tx, &table).map_err(|e| tx_error(&namespace, e))?;
            tx.commit().map_err(|e| tx_error(&namespace, e))?;
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl<T: StoreValue> KeyedStore<T> for SqliteKeyedStore<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let key = key.to_string();
        let raw: Option<String> = self
            .transact(move |tx, table| {
                tx.query_row(
                    &format!("SELECT value FROM {table} WHERE key = ?1"),
                    [&key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;
        let key = key.to_string();
        self.transact(move |tx, table| {
            tx.execute(
                &format!(
                    "INSERT INTO {table} (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                ),
                rusqlite::params![key, json],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.transact(move |tx, table| {
            tx.execute(&format!("DELETE FROM {table} WHERE key = ?1"), [&key])
                .map(|_| ())
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        self.transact(|tx, table| {
            let mut stmt = tx.prepare(&format!("SELECT key FROM {table} ORDER BY key ASC"))?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.transact(|tx, table| tx.execute(&format!("DELETE FROM {table}"), []).map(|_| ()))
            .await
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Map a namespace name to a safe, collision-free table identifier.
fn table_name(namespace: &str) -> String {
    let sanitized: String = namespace
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let digest = blake3::hash(namespace.as_bytes());
    format!("kv_{sanitized}_{}", &hex::encode(digest.as_bytes())[..8])
}

fn open(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    Ok(conn)
}

fn try_drop_table(path: &Path, table: &str) -> StoreResult<NamespaceDeletion> {
    if !path.exists() {
        return Ok(NamespaceDeletion::Deleted);
    }
    let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;
    conn.busy_timeout(Duration::ZERO)
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    match conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}")) {
        Ok(()) => Ok(NamespaceDeletion::Deleted),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            Ok(NamespaceDeletion::Pending)
        }
        Err(e) => Err(tx_error(table, e)),
    }
}

fn tx_error(namespace: &str, e: rusqlite::Error) -> StoreError {
    StoreError::Transaction {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    }
}

async fn run_blocking<R, F>(f: F) -> StoreResult<R>
where
    R: Send + 'static,
    F: FnOnce() -> StoreResult<R> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
}
