//! SQLite-backed key-value store.
//!
//! Emulates the scalar / set / sorted-set model with three tables. Each
//! [`WriteBatch`] runs inside one SQLite transaction, so a file's index
//! update is all-or-nothing even though the wider index is not.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::backend::{KvStore, ScoredMember, StoreError, StoreResult, WriteBatch, WriteOp};

/// Bumped when the table layout changes.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        key   TEXT PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sets (
        key    TEXT NOT NULL,
        member TEXT NOT NULL,
        PRIMARY KEY (key, member)
    );
    CREATE TABLE IF NOT EXISTS zsets (
        key    TEXT NOT NULL,
        member TEXT NOT NULL,
        score  REAL NOT NULL,
        PRIMARY KEY (key, member)
    );
    CREATE INDEX IF NOT EXISTS zsets_by_score ON zsets (key, score, member);
";

/// Persistent [`KvStore`] on a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] when the file cannot be opened or its
    /// schema is newer than this build understands.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        log::debug!("Opened SQLite index at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Propagates SQLite initialization errors.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        if path.is_some() {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            log::trace!("SQLite journal mode: {mode}");
        }

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::Unavailable(format!(
                "index schema version {version} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn apply_op(tx: &rusqlite::Transaction<'_>, op: &WriteOp) -> rusqlite::Result<()> {
    match op {
        WriteOp::Set { key, value } => {
            tx.prepare_cached("DELETE FROM sets WHERE key = ?1")?
                .execute([key])?;
            tx.prepare_cached("DELETE FROM zsets WHERE key = ?1")?
                .execute([key])?;
            tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?
                .execute(params![key, value])?;
        }
        WriteOp::Delete { key } => {
            for sql in [
                "DELETE FROM kv WHERE key = ?1",
                "DELETE FROM sets WHERE key = ?1",
                "DELETE FROM zsets WHERE key = ?1",
            ] {
                tx.prepare_cached(sql)?.execute([key])?;
            }
        }
        WriteOp::SetAdd { key, member } => {
            tx.prepare_cached("INSERT OR IGNORE INTO sets (key, member) VALUES (?1, ?2)")?
                .execute(params![key, member])?;
        }
        WriteOp::SetRemove { key, member } => {
            tx.prepare_cached("DELETE FROM sets WHERE key = ?1 AND member = ?2")?
                .execute(params![key, member])?;
        }
        WriteOp::ZAdd { key, member, score } => {
            tx.prepare_cached(
                "INSERT INTO zsets (key, member, score) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key, member) DO UPDATE SET score = excluded.score",
            )?
            .execute(params![key, member, score])?;
        }
        WriteOp::ZRemove { key, member } => {
            tx.prepare_cached("DELETE FROM zsets WHERE key = ?1 AND member = ?2")?
                .execute(params![key, member])?;
        }
    }
    Ok(())
}

impl KvStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn ping(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let value = conn
            .prepare_cached("SELECT value FROM kv WHERE key = ?1")?
            .query_row([key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found: bool = conn
            .prepare_cached(
                "SELECT EXISTS (SELECT 1 FROM kv WHERE key = ?1)
                     OR EXISTS (SELECT 1 FROM sets WHERE key = ?1)
                     OR EXISTS (SELECT 1 FROM zsets WHERE key = ?1)",
            )?
            .query_row([key], |row| row.get(0))?;
        Ok(found)
    }

    fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT member FROM sets WHERE key = ?1 ORDER BY member")?;
        let members = stmt
            .query_map([key], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(members)
    }

    fn zrange(&self, key: &str) -> StoreResult<Vec<ScoredMember>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT member, score FROM zsets WHERE key = ?1 ORDER BY score, member",
        )?;
        let members = stmt
            .query_map([key], |row| {
                Ok(ScoredMember {
                    member: row.get(0)?,
                    score: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let len = prefix.chars().count() as i64;
        let mut stmt = conn.prepare_cached(
            "SELECT key FROM kv WHERE substr(key, 1, ?2) = ?1
             UNION SELECT key FROM sets WHERE substr(key, 1, ?2) = ?1
             UNION SELECT key FROM zsets WHERE substr(key, 1, ?2) = ?1
             ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix, len], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for op in batch.ops() {
            apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}
