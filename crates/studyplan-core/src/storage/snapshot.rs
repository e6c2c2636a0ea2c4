//! Resumable session snapshot and its JSON codec.
//!
//! The snapshot carries only what is needed to rebuild the runtime state.
//! The running flag is deliberately absent: a resumed session is always
//! paused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::CompletionRecord;

/// Current snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub session_id: String,
    pub task_cursor: usize,
    pub remaining_seconds: u64,
    pub task_start_remaining: u64,
    #[serde(default)]
    pub completions: Vec<CompletionRecord>,
    pub saved_at: DateTime<Utc>,
}

/// Only the version field, so unknown layouts are rejected before the
/// full decode reports a confusing missing-field error.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl Snapshot {
    pub fn new(
        session_id: String,
        task_cursor: usize,
        remaining_seconds: u64,
        task_start_remaining: u64,
        completions: Vec<CompletionRecord>,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id,
            task_cursor,
            remaining_seconds,
            task_start_remaining,
            completions,
            saved_at,
        }
    }

    /// Serialize to the stored JSON form.
    ///
    /// # Errors
    /// Returns [`SessionError::PersistenceFailure`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SessionError::PersistenceFailure(format!("encode snapshot: {e}")))
    }

    /// Parse the stored JSON form.
    ///
    /// # Errors
    /// Returns [`SessionError::PersistenceFailure`] for malformed JSON or a
    /// version this build does not understand.
    pub fn decode(raw: &str) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_str(raw)
            .map_err(|e| SessionError::PersistenceFailure(format!("decode snapshot: {e}")))?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(SessionError::PersistenceFailure(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                probe.version
            )));
        }
        serde_json::from_str(raw)
            .map_err(|e| SessionError::PersistenceFailure(format!("decode snapshot: {e}")))
    }
}
