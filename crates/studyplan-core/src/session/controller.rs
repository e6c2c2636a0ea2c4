//! Session controller.
//!
//! Wires the clock, the runtime state and the two external collaborators
//! (snapshot store, completion reporter) into one lifecycle. Every
//! state-changing call commits in memory first, then writes a snapshot.
//!
//! ## Phases
//!
//! ```text
//! Idle -start/resume-> Paused <-toggle-> Running
//! Paused|Running -finalize-> Finalizing -> Idle
//!                                      \-> FinalizeFailed -finalize-> ...
//! Paused|Running -cancel-> Idle
//! ```
//!
//! Running out of budget on a tick finalizes automatically. Running out of
//! tasks does not: the caller ends the session explicitly.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::ClockSource;
use super::plan::SessionPlan;
use super::state::{SessionRuntimeState, SessionSummary, TickOutcome};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::reporter::{CompletionReport, CompletionReporter, TaskStatusUpdate};
use crate::storage::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Paused,
    Running,
    /// Report in flight.
    Finalizing,
    /// Report failed. Only `finalize()` is accepted until it succeeds.
    FinalizeFailed,
}

impl SessionPhase {
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Paused | SessionPhase::Running)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Paused => "paused",
            SessionPhase::Running => "running",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::FinalizeFailed => "finalize failed",
        };
        f.write_str(name)
    }
}

/// What a successful finalize hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedSession {
    pub summary: SessionSummary,
    /// Task statuses returned by the reporter, for the caller to apply.
    pub updated_tasks: Vec<TaskStatusUpdate>,
}

impl FinalizedSession {
    pub fn to_event(&self) -> SessionEvent {
        SessionEvent::SessionFinalized {
            summary: self.summary.clone(),
            updated_tasks: self.updated_tasks.clone(),
            at: Utc::now(),
        }
    }
}

struct ActiveSession {
    plan: SessionPlan,
    state: SessionRuntimeState,
}

pub struct SessionController<S, R, C> {
    store: S,
    reporter: R,
    clock: C,
    phase: SessionPhase,
    active: Option<ActiveSession>,
    /// Last snapshot write failed; the stored copy lags the in-memory state.
    snapshot_stale: bool,
}

impl<S, R, C> SessionController<S, R, C>
where
    S: SnapshotStore,
    R: CompletionReporter,
    C: ClockSource,
{
    pub fn new(store: S, reporter: R, clock: C) -> Self {
        Self {
            store,
            reporter,
            clock,
            phase: SessionPhase::Idle,
            active: None,
            snapshot_stale: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn state(&self) -> Option<&SessionRuntimeState> {
        self.active.as_ref().map(|a| &a.state)
    }

    pub fn plan(&self) -> Option<&SessionPlan> {
        self.active.as_ref().map(|a| &a.plan)
    }

    /// Whether the stored snapshot is known to lag the in-memory state.
    pub fn snapshot_stale(&self) -> bool {
        self.snapshot_stale
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Build a full state snapshot event.
    pub fn snapshot_event(&self) -> SessionEvent {
        let active = self.active.as_ref();
        SessionEvent::StateSnapshot {
            phase: self.phase,
            session_id: active.map(|a| a.state.session_id().to_string()),
            remaining_seconds: active.map_or(0, |a| a.state.remaining_seconds()),
            scheduled_duration_secs: active.map_or(0, |a| a.state.scheduled_duration()),
            task_cursor: active.map_or(0, |a| a.state.task_cursor()),
            tasks_planned: active.map_or(0, |a| a.plan.task_count()),
            current_task: active
                .and_then(|a| a.state.current_task(&a.plan))
                .map(|t| t.title.clone()),
            completed: active.map_or(0, |a| a.state.completions().len()),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Pick up a persisted session, if any. Call once, before any user action.
    ///
    /// `resolve` maps the stored session id back to its plan. If it cannot,
    /// or the snapshot no longer fits the plan, the snapshot is discarded and
    /// the controller stays idle.
    ///
    /// # Errors
    /// Returns [`SessionError::PersistenceFailure`] if the slot cannot be read,
    /// and a precondition violation if a session is already active.
    pub fn resume<F>(&mut self, resolve: F) -> Result<Option<SessionEvent>>
    where
        F: FnOnce(&str) -> Option<SessionPlan>,
    {
        self.require_phase("resume session", &[SessionPhase::Idle])?;

        let Some(snapshot) = self.store.load()? else {
            return Ok(None);
        };

        let restored = match resolve(&snapshot.session_id) {
            Some(plan) => SessionRuntimeState::restore(&snapshot, &plan).map(|state| (plan, state)),
            None => Err(SessionError::PersistenceFailure(format!(
                "plan '{}' can no longer be resolved",
                snapshot.session_id
            ))),
        };

        match restored {
            Ok((plan, state)) => {
                let event = SessionEvent::SessionResumed {
                    session_id: state.session_id().to_string(),
                    remaining_seconds: state.remaining_seconds(),
                    task_cursor: state.task_cursor(),
                    at: Utc::now(),
                };
                info!(
                    session_id = state.session_id(),
                    remaining = state.remaining_seconds(),
                    cursor = state.task_cursor(),
                    "resumed session"
                );
                self.active = Some(ActiveSession { plan, state });
                self.phase = SessionPhase::Paused;
                Ok(Some(event))
            }
            Err(e) => {
                warn!(session_id = %snapshot.session_id, error = %e, "discarding snapshot");
                self.store.clear()?;
                Ok(None)
            }
        }
    }

    /// Begin a session from `plan`. The timer starts paused.
    ///
    /// # Errors
    /// [`SessionError::InvalidPlan`] for a bad plan, a precondition violation
    /// if a session is already active, or a persistence failure if the
    /// initial snapshot cannot be written (the session is still started).
    pub fn start(&mut self, plan: SessionPlan) -> Result<SessionEvent> {
        self.require_phase("start session", &[SessionPhase::Idle])?;
        let state = SessionRuntimeState::start(&plan)?;

        let event = SessionEvent::SessionStarted {
            session_id: plan.id.clone(),
            scheduled_duration_secs: plan.scheduled_duration,
            tasks_planned: plan.task_count(),
            at: Utc::now(),
        };
        info!(
            session_id = %plan.id,
            scheduled = plan.scheduled_duration,
            tasks = plan.task_count(),
            "session started"
        );
        self.active = Some(ActiveSession { plan, state });
        self.phase = SessionPhase::Paused;
        self.persist()?;
        Ok(event)
    }

    /// Pause a running timer or start a paused one.
    pub fn toggle_timer(&mut self) -> Result<SessionEvent> {
        const OP: &str = "toggle timer";
        self.require_phase(OP, &[SessionPhase::Paused, SessionPhase::Running])?;
        let active = self.active_mut(OP)?;
        if active.state.remaining_seconds() == 0 {
            return Err(SessionError::precondition(
                OP,
                "the time budget is used up; finalize the session",
            ));
        }

        let running = active.state.toggle_running();
        let remaining_seconds = active.state.remaining_seconds();
        let at = Utc::now();
        let event = if running {
            self.clock.subscribe();
            self.phase = SessionPhase::Running;
            SessionEvent::TimerRunning {
                remaining_seconds,
                at,
            }
        } else {
            self.clock.unsubscribe();
            self.phase = SessionPhase::Paused;
            SessionEvent::TimerPaused {
                remaining_seconds,
                at,
            }
        };
        debug!(running, remaining = remaining_seconds, "timer toggled");
        self.persist()?;
        Ok(event)
    }

    /// Apply one clock tick. Returns `SessionFinalized` on the tick that
    /// exhausts the budget, `Ticked` otherwise.
    ///
    /// # Errors
    /// Precondition violation when not running; on exhaustion, whatever
    /// [`SessionController::finalize`] returns.
    pub async fn on_tick(&mut self) -> Result<SessionEvent> {
        const OP: &str = "apply tick";
        self.require_phase(OP, &[SessionPhase::Running])?;
        let active = self.active_mut(OP)?;

        match active.state.tick() {
            TickOutcome::Counted { remaining_seconds } => {
                self.persist()?;
                Ok(SessionEvent::Ticked {
                    remaining_seconds,
                    at: Utc::now(),
                })
            }
            TickOutcome::BudgetExhausted => {
                info!(session_id = active.state.session_id(), "time budget exhausted");
                active.state.stop();
                self.clock.unsubscribe();
                self.phase = SessionPhase::Paused;
                // The finalize outcome matters more than this write; finalize
                // retries it if it fails.
                let _ = self.persist();
                let finalized = self.finalize().await?;
                Ok(finalized.to_event())
            }
            TickOutcome::Ignored => Ok(SessionEvent::Ticked {
                remaining_seconds: active.state.remaining_seconds(),
                at: Utc::now(),
            }),
        }
    }

    /// Record the current task as done. Reaching the end of the plan does
    /// not end the session.
    pub fn complete_current_task(&mut self) -> Result<SessionEvent> {
        const OP: &str = "complete task";
        self.require_phase(OP, &[SessionPhase::Paused, SessionPhase::Running])?;
        let active = self.active_mut(OP)?;

        let advance = active.state.complete_current_task(&active.plan, Utc::now())?;
        let record = active
            .state
            .completions()
            .last()
            .cloned()
            .ok_or_else(|| SessionError::precondition(OP, "completion was not recorded"))?;
        info!(
            task_id = %record.task_id,
            spent = record.time_spent_seconds,
            all_done = advance.all_tasks_done,
            "task completed"
        );
        let event = SessionEvent::TaskCompleted {
            record,
            task_cursor: advance.task_cursor,
            all_tasks_done: advance.all_tasks_done,
            at: Utc::now(),
        };
        self.persist()?;
        Ok(event)
    }

    /// Move past the current task without recording it.
    pub fn skip_current_task(&mut self) -> Result<SessionEvent> {
        const OP: &str = "skip task";
        self.require_phase(OP, &[SessionPhase::Paused, SessionPhase::Running])?;
        let active = self.active_mut(OP)?;

        let advance = active.state.skip_current_task(&active.plan)?;
        info!(task_id = %advance.task_id, all_done = advance.all_tasks_done, "task skipped");
        let event = SessionEvent::TaskSkipped {
            task_id: advance.task_id,
            task_cursor: advance.task_cursor,
            all_tasks_done: advance.all_tasks_done,
            at: Utc::now(),
        };
        self.persist()?;
        Ok(event)
    }

    /// End the session and report it.
    ///
    /// On success the snapshot is cleared and the controller returns to idle.
    /// On failure the controller stays in `FinalizeFailed` with the snapshot
    /// intact; calling `finalize` again retries the report.
    ///
    /// # Errors
    /// [`SessionError::ReportingFailure`] if the reporter fails, or a
    /// precondition violation when there is no session to finalize.
    pub async fn finalize(&mut self) -> Result<FinalizedSession> {
        const OP: &str = "finalize session";
        self.require_phase(
            OP,
            &[
                SessionPhase::Paused,
                SessionPhase::Running,
                SessionPhase::Finalizing,
                SessionPhase::FinalizeFailed,
            ],
        )?;
        self.clock.unsubscribe();
        let active = self.active_mut(OP)?;
        active.state.stop();
        let summary = active.state.summary(&active.plan);
        self.phase = SessionPhase::Finalizing;

        if self.snapshot_stale {
            // A retry must find the completions even if this process dies.
            let _ = self.persist();
        }

        let report = CompletionReport::from_summary(&summary);
        info!(
            session_id = %summary.session_id,
            actual = summary.actual_duration_seconds,
            completed = summary.tasks_completed_count,
            "reporting session"
        );

        let ack = match self.reporter.report(&report).await {
            Ok(ack) => ack,
            Err(e) => {
                self.phase = SessionPhase::FinalizeFailed;
                warn!(session_id = %summary.session_id, error = %e, "completion report failed");
                return Err(e.into());
            }
        };

        // The report is accepted; a leftover snapshot must not turn this into
        // a failure or the caller would report twice.
        if let Err(e) = self.store.clear() {
            warn!(session_id = %summary.session_id, error = %e, "could not clear snapshot after finalize");
        }
        self.active = None;
        self.snapshot_stale = false;
        self.phase = SessionPhase::Idle;
        info!(session_id = %summary.session_id, "session finalized");

        Ok(FinalizedSession {
            summary,
            updated_tasks: ack.updated_tasks,
        })
    }

    /// Abandon the session. Nothing is reported; completions are discarded.
    ///
    /// # Errors
    /// Precondition violation unless paused or running; a persistence failure
    /// if the snapshot cannot be cleared (the session is still abandoned).
    pub fn cancel(&mut self) -> Result<SessionEvent> {
        const OP: &str = "cancel session";
        self.require_phase(OP, &[SessionPhase::Paused, SessionPhase::Running])?;
        self.clock.unsubscribe();
        let active = self
            .active
            .take()
            .ok_or_else(|| SessionError::precondition(OP, "no active session"))?;
        self.phase = SessionPhase::Idle;
        self.snapshot_stale = false;

        let event = SessionEvent::SessionCancelled {
            session_id: active.state.session_id().to_string(),
            discarded_completions: active.state.completions().len(),
            at: Utc::now(),
        };
        info!(session_id = active.state.session_id(), "session cancelled");
        self.store.clear()?;
        Ok(event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn require_phase(&self, operation: &'static str, allowed: &[SessionPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionError::precondition(
                operation,
                format!("session is {}", self.phase),
            ))
        }
    }

    fn active_mut(&mut self, operation: &'static str) -> Result<&mut ActiveSession> {
        self.active
            .as_mut()
            .ok_or_else(|| SessionError::precondition(operation, "no active session"))
    }

    /// Write the current state to the store.
    fn persist(&mut self) -> Result<()> {
        let Some(active) = &self.active else {
            return Ok(());
        };
        let snapshot = active.state.to_snapshot(Utc::now());
        match self.store.save(&snapshot) {
            Ok(()) => {
                self.snapshot_stale = false;
                Ok(())
            }
            Err(e) => {
                self.snapshot_stale = true;
                warn!(session_id = %snapshot.session_id, error = %e, "snapshot write failed");
                Err(e)
            }
        }
    }
}
