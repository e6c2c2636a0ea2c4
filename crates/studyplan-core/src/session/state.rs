//! Session runtime state and its transitions.
//!
//! Everything here is plain data. No timers, no storage, no network: the
//! controller decides when to call these and what to do with the outcome.
//!
//! ## Time accounting
//!
//! ```text
//! scheduled ──tick──▶ remaining ──complete──▶ record.time_spent = task_start_remaining - remaining
//!                                            task_start_remaining = remaining
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::{SessionPlan, Task};
use crate::error::{Result, SessionError};
use crate::storage::Snapshot;

/// One finished task. Title and estimate are copied at completion time so
/// later edits to the task do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub task_id: String,
    pub task_title: String,
    pub time_spent_seconds: u64,
    pub estimated_time_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

/// Terminal artifact handed back after a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub tasks_completed_count: usize,
    pub tasks_planned_count: usize,
    pub actual_duration_seconds: u64,
    pub scheduled_duration_seconds: u64,
    pub completions: Vec<CompletionRecord>,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running (or already at zero); nothing changed.
    Ignored,
    /// One second elapsed.
    Counted { remaining_seconds: u64 },
    /// This tick took the budget to zero.
    BudgetExhausted,
}

/// Result of moving the cursor past the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAdvance {
    pub task_id: String,
    pub task_cursor: usize,
    /// The cursor reached the end of the plan.
    pub all_tasks_done: bool,
}

/// Live state of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRuntimeState {
    session_id: String,
    scheduled_duration: u64,
    remaining_seconds: u64,
    task_cursor: usize,
    task_start_remaining: u64,
    is_running: bool,
    completions: Vec<CompletionRecord>,
}

impl SessionRuntimeState {
    /// Build the initial state for `plan`. The timer starts paused.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidPlan`] if the plan fails validation.
    pub fn start(plan: &SessionPlan) -> Result<Self> {
        plan.validate()?;
        Ok(Self {
            session_id: plan.id.clone(),
            scheduled_duration: plan.scheduled_duration,
            remaining_seconds: plan.scheduled_duration,
            task_cursor: 0,
            task_start_remaining: plan.scheduled_duration,
            is_running: false,
            completions: Vec::new(),
        })
    }

    /// Rebuild state from a persisted snapshot. The timer always comes back
    /// paused since no ticks were delivered while the process was gone.
    ///
    /// # Errors
    /// Returns [`SessionError::PersistenceFailure`] if the snapshot does not
    /// belong to `plan` or violates the state invariants.
    pub fn restore(snapshot: &Snapshot, plan: &SessionPlan) -> Result<Self> {
        let reject = |detail: String| {
            Err(SessionError::PersistenceFailure(format!(
                "snapshot for session '{}' does not fit its plan: {detail}",
                snapshot.session_id
            )))
        };

        if snapshot.session_id != plan.id {
            return reject(format!("plan id is '{}'", plan.id));
        }
        if snapshot.remaining_seconds > plan.scheduled_duration {
            return reject(format!(
                "remaining {}s exceeds scheduled {}s",
                snapshot.remaining_seconds, plan.scheduled_duration
            ));
        }
        if snapshot.task_start_remaining < snapshot.remaining_seconds
            || snapshot.task_start_remaining > plan.scheduled_duration
        {
            return reject(format!(
                "task start mark {}s is outside [{}, {}]",
                snapshot.task_start_remaining, snapshot.remaining_seconds, plan.scheduled_duration
            ));
        }
        if snapshot.task_cursor > plan.task_count() {
            return reject(format!(
                "cursor {} is past {} planned tasks",
                snapshot.task_cursor,
                plan.task_count()
            ));
        }
        if snapshot.completions.len() > snapshot.task_cursor {
            return reject(format!(
                "{} completions recorded but cursor is {}",
                snapshot.completions.len(),
                snapshot.task_cursor
            ));
        }

        Ok(Self {
            session_id: snapshot.session_id.clone(),
            scheduled_duration: plan.scheduled_duration,
            remaining_seconds: snapshot.remaining_seconds,
            task_cursor: snapshot.task_cursor,
            task_start_remaining: snapshot.task_start_remaining,
            is_running: false,
            completions: snapshot.completions.clone(),
        })
    }

    /// Capture the fields needed to rebuild this state later.
    pub fn to_snapshot(&self, saved_at: DateTime<Utc>) -> Snapshot {
        Snapshot::new(
            self.session_id.clone(),
            self.task_cursor,
            self.remaining_seconds,
            self.task_start_remaining,
            self.completions.clone(),
            saved_at,
        )
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn scheduled_duration(&self) -> u64 {
        self.scheduled_duration
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.scheduled_duration - self.remaining_seconds
    }

    pub fn task_cursor(&self) -> usize {
        self.task_cursor
    }

    pub fn task_start_remaining(&self) -> u64 {
        self.task_start_remaining
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn completions(&self) -> &[CompletionRecord] {
        &self.completions
    }

    pub fn current_task<'p>(&self, plan: &'p SessionPlan) -> Option<&'p Task> {
        plan.task(self.task_cursor)
    }

    pub fn tasks_remaining(&self, plan: &SessionPlan) -> usize {
        plan.task_count().saturating_sub(self.task_cursor)
    }

    pub fn all_tasks_done(&self, plan: &SessionPlan) -> bool {
        self.task_cursor >= plan.task_count()
    }

    /// Seconds spent on the current task so far.
    pub fn current_task_elapsed(&self) -> u64 {
        self.task_start_remaining - self.remaining_seconds
    }

    pub fn summary(&self, plan: &SessionPlan) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            tasks_completed_count: self.completions.len(),
            tasks_planned_count: plan.task_count(),
            actual_duration_seconds: self.elapsed_seconds(),
            scheduled_duration_seconds: self.scheduled_duration,
            completions: self.completions.clone(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running || self.remaining_seconds == 0 {
            return TickOutcome::Ignored;
        }
        self.remaining_seconds -= 1;
        if self.remaining_seconds == 0 {
            TickOutcome::BudgetExhausted
        } else {
            TickOutcome::Counted {
                remaining_seconds: self.remaining_seconds,
            }
        }
    }

    /// Flip the running flag. Returns the new value.
    pub fn toggle_running(&mut self) -> bool {
        self.is_running = !self.is_running;
        self.is_running
    }

    pub fn stop(&mut self) {
        self.is_running = false;
    }

    /// Record the current task as done and move on.
    ///
    /// # Errors
    /// Returns [`SessionError::PreconditionViolation`] when every planned
    /// task has already been completed or skipped.
    pub fn complete_current_task(
        &mut self,
        plan: &SessionPlan,
        completed_at: DateTime<Utc>,
    ) -> Result<TaskAdvance> {
        let task = self.current_task_or_err(plan, "complete task")?;
        let record = CompletionRecord {
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            time_spent_seconds: self.current_task_elapsed(),
            estimated_time_minutes: task.effective_estimate_min(),
            completed_at,
        };
        self.completions.push(record);
        Ok(self.advance(plan))
    }

    /// Move past the current task without recording a completion.
    ///
    /// # Errors
    /// Returns [`SessionError::PreconditionViolation`] when every planned
    /// task has already been completed or skipped.
    pub fn skip_current_task(&mut self, plan: &SessionPlan) -> Result<TaskAdvance> {
        self.current_task_or_err(plan, "skip task")?;
        Ok(self.advance(plan))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn current_task_or_err<'p>(
        &self,
        plan: &'p SessionPlan,
        operation: &'static str,
    ) -> Result<&'p Task> {
        self.current_task(plan).ok_or_else(|| {
            SessionError::precondition(
                operation,
                format!("all {} planned tasks are already done", plan.task_count()),
            )
        })
    }

    fn advance(&mut self, plan: &SessionPlan) -> TaskAdvance {
        let task_id = plan
            .task(self.task_cursor)
            .map(|t| t.id.clone())
            .unwrap_or_default();
        self.task_cursor += 1;
        self.task_start_remaining = self.remaining_seconds;
        TaskAdvance {
            task_id,
            task_cursor: self.task_cursor,
            all_tasks_done: self.all_tasks_done(plan),
        }
    }
}

/// Render a countdown as `MM:SS`, or `H:MM:SS` once it reaches an hour.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}
