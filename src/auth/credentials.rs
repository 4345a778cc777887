// Credential persistence in a SQLite key/value table

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::types::StoredTokenData;

/// Key under which the current token is persisted
pub const TOKEN_KEY: &str = "graphql:auth:token";

/// Process-wide holder of the current token
///
/// Cheap to clone; all clones share the same state. Reads are served from memory,
/// writes swap memory and persist to SQLite under one lock so a session survives restarts.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    conn: Mutex<Connection>,

    /// Current token; the sender doubles as the change feed for observers
    current: watch::Sender<Option<String>>,

    path: Option<PathBuf>,
}

impl CredentialStore {
    /// Open (or create) the store at a SQLite database path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create credential directory: {}", parent.display())
            })?;
        }

        tracing::info!("Loading credentials from SQLite: {}", path.display());
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Store backed by an in-memory database; nothing outlives the process
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        let token = load_token(&conn);
        let (current, _) = watch::channel(token);

        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                current,
                path,
            }),
        })
    }

    /// Current token, or `None` when the session is unauthenticated
    pub fn get_token(&self) -> Option<String> {
        self.inner.current.borrow().clone()
    }

    /// Replace the current token; `None` or an empty string clears it
    ///
    /// Both copies are updated under the connection lock, so concurrent writers land in
    /// the same order in memory and on disk. The in-memory value is swapped before
    /// persisting; a failed write still takes effect for this process and is reported.
    pub fn set_token(&self, token: Option<String>) -> Result<()> {
        let token = token.filter(|t| !t.is_empty());

        let conn = self
            .inner
            .conn
            .lock()
            .map_err(|_| anyhow!("Credential store connection lock poisoned"))?;

        self.inner.current.send_replace(token.clone());

        match token {
            Some(token) => {
                let value = serde_json::to_string(&StoredTokenData {
                    token,
                    saved_at: Some(Utc::now().to_rfc3339()),
                })
                .context("Failed to serialize token data")?;

                conn.execute(
                    "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    [TOKEN_KEY, value.as_str()],
                )
                .context("Failed to persist token")?;
            }
            None => {
                conn.execute("DELETE FROM auth_kv WHERE key = ?1", [TOKEN_KEY])
                    .context("Failed to delete persisted token")?;
            }
        }

        Ok(())
    }

    /// Drop the current token (logout)
    pub fn clear(&self) -> Result<()> {
        self.set_token(None)
    }

    /// Watch for credential changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.inner.current.subscribe()
    }

    /// Database file backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.inner.path)
            .field("authenticated", &self.inner.current.borrow().is_some())
            .finish()
    }
}

/// Read the persisted token; anything unreadable counts as absent
fn load_token(conn: &Connection) -> Option<String> {
    let value: Option<String> = match conn
        .query_row(
            "SELECT value FROM auth_kv WHERE key = ?1",
            [TOKEN_KEY],
            |row| row.get(0),
        )
        .optional()
    {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted token, treating as absent");
            return None;
        }
    };

    let value = value?;
    match serde_json::from_str::<StoredTokenData>(&value) {
        Ok(data) if !data.token.is_empty() => Some(data.token),
        Ok(_) => {
            tracing::warn!("Persisted token is empty, treating as absent");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Persisted token is corrupt, treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir()
            .join(format!("gql-auth-link-{}", uuid::Uuid::new_v4()))
            .join("auth.sqlite3")
    }

    #[test]
    fn test_empty_store_is_unauthenticated() {
        let store = CredentialStore::in_memory().unwrap();
        assert_eq!(store.get_token(), None);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_set_and_clear() {
        let store = CredentialStore::in_memory().unwrap();
        store.set_token(Some("t1".to_string())).unwrap();
        assert_eq!(store.get_token(), Some("t1".to_string()));

        store.set_token(Some("t2".to_string())).unwrap();
        assert_eq!(store.get_token(), Some("t2".to_string()));

        store.clear().unwrap();
        assert_eq!(store.get_token(), None);
    }

    #[test]
    fn test_empty_string_clears() {
        let store = CredentialStore::in_memory().unwrap();
        store.set_token(Some("t1".to_string())).unwrap();
        store.set_token(Some(String::new())).unwrap();
        assert_eq!(store.get_token(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let store = CredentialStore::in_memory().unwrap();
        let other = store.clone();
        store.set_token(Some("shared".to_string())).unwrap();
        assert_eq!(other.get_token(), Some("shared".to_string()));
    }

    #[test]
    fn test_token_survives_reopen() {
        let path = temp_db();
        {
            let store = CredentialStore::open(&path).unwrap();
            store.set_token(Some("persisted".to_string())).unwrap();
        }

        let store = CredentialStore::open(&path).unwrap();
        assert_eq!(store.get_token(), Some("persisted".to_string()));

        store.clear().unwrap();
        drop(store);
        let store = CredentialStore::open(&path).unwrap();
        assert_eq!(store.get_token(), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_value_is_absent() {
        let path = temp_db();
        {
            let store = CredentialStore::open(&path).unwrap();
            store.set_token(Some("ok".to_string())).unwrap();
        }
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "UPDATE auth_kv SET value = 'not json' WHERE key = ?1",
                [TOKEN_KEY],
            )
            .unwrap();
        }

        let store = CredentialStore::open(&path).unwrap();
        assert_eq!(store.get_token(), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_empty_persisted_token_is_absent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)",
            [TOKEN_KEY, r#"{"token":""}"#],
        )
        .unwrap();

        assert_eq!(load_token(&conn), None);
    }

    #[test]
    fn test_racing_writers_keep_memory_and_disk_in_step() {
        let path = temp_db();
        let store = CredentialStore::open(&path).unwrap();

        for round in 0..200 {
            let barrier = Arc::new(std::sync::Barrier::new(2));
            let writer = {
                let (store, barrier) = (store.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    store.set_token(Some(format!("token-{}", round))).unwrap();
                })
            };
            barrier.wait();
            store.clear().unwrap();
            writer.join().unwrap();

            let disk = load_token(&Connection::open(&path).unwrap());
            assert_eq!(store.get_token(), disk, "diverged in round {}", round);
        }

        drop(store);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let store = CredentialStore::in_memory().unwrap();
        let mut rx = store.subscribe();
        assert_eq!(*rx.borrow(), None);

        store.set_token(Some("fresh".to_string())).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some("fresh".to_string()));

        store.clear().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), None);
    }
}
