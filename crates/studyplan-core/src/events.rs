use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reporter::TaskStatusUpdate;
use crate::session::{CompletionRecord, SessionPhase, SessionSummary};

/// Every session state change produces an Event.
/// The CLI prints them; the live runtime broadcasts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: String,
        scheduled_duration_secs: u64,
        tasks_planned: usize,
        at: DateTime<Utc>,
    },
    /// A persisted session was picked up again after a restart.
    SessionResumed {
        session_id: String,
        remaining_seconds: u64,
        task_cursor: usize,
        at: DateTime<Utc>,
    },
    TimerRunning {
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    Ticked {
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        record: CompletionRecord,
        task_cursor: usize,
        all_tasks_done: bool,
        at: DateTime<Utc>,
    },
    TaskSkipped {
        task_id: String,
        task_cursor: usize,
        all_tasks_done: bool,
        at: DateTime<Utc>,
    },
    SessionFinalized {
        summary: SessionSummary,
        updated_tasks: Vec<TaskStatusUpdate>,
        at: DateTime<Utc>,
    },
    /// Finalize was attempted but the report failed; retry is possible.
    FinalizeFailed {
        session_id: String,
        error: String,
        /// The stored snapshot lags memory; a crash now loses recent progress.
        snapshot_stale: bool,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        session_id: String,
        discarded_completions: usize,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: SessionPhase,
        session_id: Option<String>,
        remaining_seconds: u64,
        scheduled_duration_secs: u64,
        task_cursor: usize,
        tasks_planned: usize,
        current_task: Option<String>,
        completed: usize,
        at: DateTime<Utc>,
    },
}
