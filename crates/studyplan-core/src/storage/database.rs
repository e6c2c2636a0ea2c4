//! SQLite-backed snapshot slot.
//!
//! Provides persistent storage for:
//! - The resumable snapshot of the active session (one key per user slot)
//! - Plans started from this machine, so a later process can resolve them

use std::path::Path;

use rusqlite::{params, Connection};

use super::{data_dir, Snapshot, SnapshotStore};
use crate::error::{Result, SessionError};
use crate::session::SessionPlan;

const PLAN_KEY_PREFIX: &str = "plan:";

/// SQLite key-value store holding one snapshot slot.
pub struct SqliteSnapshotStore {
    conn: Connection,
    slot: String,
}

impl SqliteSnapshotStore {
    /// Open the database at `~/.config/studyplan/studyplan.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(slot: impl Into<String>) -> Result<Self> {
        let dir = data_dir().map_err(|e| SessionError::PersistenceFailure(e.to_string()))?;
        Self::open_at(dir.join("studyplan.db"), slot)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>, slot: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            slot: slot.into(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory(slot: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            slot: slot.into(),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Keep a copy of `plan` so `resume` can find it after a restart.
    pub fn remember_plan(&self, plan: &SessionPlan) -> Result<()> {
        let json = serde_json::to_string(plan)
            .map_err(|e| SessionError::PersistenceFailure(format!("encode plan: {e}")))?;
        self.kv_set(&plan_key(&plan.id), &json)?;
        Ok(())
    }

    /// Look up a remembered plan. Undecodable entries count as missing.
    pub fn lookup_plan(&self, plan_id: &str) -> Result<Option<SessionPlan>> {
        let Some(json) = self.kv_get(&plan_key(plan_id))? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(plan) => Ok(Some(plan)),
            Err(e) => {
                tracing::warn!(plan_id, error = %e, "ignoring unreadable stored plan");
                Ok(None)
            }
        }
    }

    pub fn forget_plan(&self, plan_id: &str) -> Result<()> {
        self.kv_delete(&plan_key(plan_id))?;
        Ok(())
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        let encoded = snapshot.encode()?;
        self.kv_set(&self.slot, &encoded)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        match self.kv_get(&self.slot)? {
            Some(raw) => Snapshot::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.kv_delete(&self.slot)?;
        Ok(())
    }
}

fn plan_key(plan_id: &str) -> String {
    format!("{PLAN_KEY_PREFIX}{plan_id}")
}
