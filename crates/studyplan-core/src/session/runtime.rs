//! Live session runtime.
//!
//! One tokio task owns the controller and applies commands and clock ticks
//! strictly one at a time, so a tick can never interleave with a user
//! action. Callers talk to it through a cloneable [`SessionHandle`]; every
//! event the controller produces is also broadcast, which is how observers
//! learn about the automatic finalize when the budget runs out.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::{ClockTick, IntervalClock};
use super::controller::{FinalizedSession, SessionController, SessionPhase};
use super::plan::SessionPlan;
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::reporter::CompletionReporter;
use crate::storage::SnapshotStore;

const COMMAND_QUEUE: usize = 32;
const EVENT_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start(SessionPlan, Reply<SessionEvent>),
    Toggle(Reply<SessionEvent>),
    Complete(Reply<SessionEvent>),
    Skip(Reply<SessionEvent>),
    Finalize(Reply<FinalizedSession>),
    Cancel(Reply<SessionEvent>),
    Status(Reply<SessionEvent>),
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Move `controller` onto its own task. `ticks` is the receiver paired
    /// with the controller's [`IntervalClock`]. Must be called inside a
    /// tokio runtime.
    pub fn spawn<S, R>(
        controller: SessionController<S, R, IntervalClock>,
        ticks: mpsc::UnboundedReceiver<ClockTick>,
    ) -> (Self, JoinHandle<()>)
    where
        S: SnapshotStore + 'static,
        R: CompletionReporter + 'static,
    {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let actor = SessionActor {
            controller,
            events: events.clone(),
        };
        let task = tokio::spawn(actor.run(command_rx, ticks));
        (Self { commands, events }, task)
    }

    /// Receive every event from now on. Slow receivers may observe
    /// `RecvError::Lagged` for skipped tick events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn start(&self, plan: SessionPlan) -> Result<SessionEvent> {
        self.request("start session", |reply| Command::Start(plan, reply))
            .await
    }

    pub async fn toggle_timer(&self) -> Result<SessionEvent> {
        self.request("toggle timer", Command::Toggle).await
    }

    pub async fn complete_current_task(&self) -> Result<SessionEvent> {
        self.request("complete task", Command::Complete).await
    }

    pub async fn skip_current_task(&self) -> Result<SessionEvent> {
        self.request("skip task", Command::Skip).await
    }

    pub async fn finalize(&self) -> Result<FinalizedSession> {
        self.request("finalize session", Command::Finalize).await
    }

    pub async fn cancel(&self) -> Result<SessionEvent> {
        self.request("cancel session", Command::Cancel).await
    }

    /// Current state as a `StateSnapshot` event.
    pub async fn status(&self) -> Result<SessionEvent> {
        self.request("read status", Command::Status).await
    }

    async fn request<T>(
        &self,
        operation: &'static str,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let stopped = || SessionError::precondition(operation, "session runtime has stopped");
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }
}

struct SessionActor<S, R> {
    controller: SessionController<S, R, IntervalClock>,
    events: broadcast::Sender<SessionEvent>,
}

impl<S, R> SessionActor<S, R>
where
    S: SnapshotStore,
    R: CompletionReporter,
{
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut ticks: mpsc::UnboundedReceiver<ClockTick>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(tick) = ticks.recv() => self.handle_tick(tick).await,
            }
        }
        debug!("session runtime stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start(plan, reply) => {
                let result = self.controller.start(plan);
                self.respond(reply, result);
            }
            Command::Toggle(reply) => {
                let result = self.controller.toggle_timer();
                self.respond(reply, result);
            }
            Command::Complete(reply) => {
                let result = self.controller.complete_current_task();
                self.respond(reply, result);
            }
            Command::Skip(reply) => {
                let result = self.controller.skip_current_task();
                self.respond(reply, result);
            }
            Command::Cancel(reply) => {
                let result = self.controller.cancel();
                self.respond(reply, result);
            }
            Command::Status(reply) => {
                let _ = reply.send(Ok(self.controller.snapshot_event()));
            }
            Command::Finalize(reply) => {
                let result = self.controller.finalize().await;
                match &result {
                    Ok(finalized) => self.publish(finalized.to_event()),
                    Err(e) => self.publish_finalize_failure(e),
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_tick(&mut self, tick: ClockTick) {
        if !self.controller.is_running() || tick.generation != self.controller.clock().generation()
        {
            debug!(generation = tick.generation, "dropping stale tick");
            return;
        }
        match self.controller.on_tick().await {
            Ok(event) => self.publish(event),
            Err(e) if self.controller.phase() == SessionPhase::FinalizeFailed => {
                self.publish_finalize_failure(&e);
            }
            Err(e) => warn!(error = %e, "tick failed"),
        }
    }

    fn respond(&self, reply: Reply<SessionEvent>, result: Result<SessionEvent>) {
        if let Ok(event) = &result {
            self.publish(event.clone());
        }
        let _ = reply.send(result);
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_finalize_failure(&self, error: &SessionError) {
        let Some(state) = self.controller.state() else {
            return;
        };
        self.publish(SessionEvent::FinalizeFailed {
            session_id: state.session_id().to_string(),
            error: error.to_string(),
            snapshot_stale: self.controller.snapshot_stale(),
            at: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReporterError;
    use crate::reporter::{CompletionReport, ReportAck};
    use crate::session::Task;
    use crate::storage::MemorySnapshotStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast::error::RecvError;

    #[derive(Clone, Default)]
    struct CountingReporter {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CompletionReporter for CountingReporter {
        async fn report(&self, _report: &CompletionReport) -> Result<ReportAck, ReporterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReporterError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(ReportAck::default())
        }
    }

    fn spawn(store: MemorySnapshotStore, reporter: CountingReporter) -> SessionHandle {
        let (clock, ticks) = IntervalClock::new(Duration::from_secs(1));
        let controller = SessionController::new(store, reporter, clock);
        SessionHandle::spawn(controller, ticks).0
    }

    fn plan() -> SessionPlan {
        SessionPlan::new(
            "plan-1",
            3600,
            vec![Task::new("t1", "Outline", 15), Task::new("t2", "Draft", 45)],
        )
    }

    fn remaining(event: &SessionEvent) -> u64 {
        match event {
            SessionEvent::StateSnapshot {
                remaining_seconds, ..
            } => *remaining_seconds,
            other => panic!("expected StateSnapshot, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_only_count_while_running() {
        let handle = spawn(MemorySnapshotStore::new(), CountingReporter::default());
        handle.start(plan()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remaining(&handle.status().await.unwrap()), 3600);

        handle.toggle_timer().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.toggle_timer().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(remaining(&handle.status().await.unwrap()), 3598);

        handle.toggle_timer().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(remaining(&handle.status().await.unwrap()), 3597);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_runs_out_and_finalizes_once() {
        let store = MemorySnapshotStore::new();
        let reporter = CountingReporter::default();
        let handle = spawn(store.clone(), reporter.clone());
        let mut events = handle.subscribe();

        handle.start(plan()).await.unwrap();
        handle.toggle_timer().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600_500)).await;

        let event = handle.complete_current_task().await.unwrap();
        match event {
            SessionEvent::TaskCompleted { record, task_cursor, .. } => {
                assert_eq!(record.time_spent_seconds, 600);
                assert_eq!(task_cursor, 1);
            }
            other => panic!("expected TaskCompleted, got {other:?}"),
        }
        assert_eq!(remaining(&handle.status().await.unwrap()), 3000);

        let summary = loop {
            match events.recv().await {
                Ok(SessionEvent::SessionFinalized { summary, .. }) => break summary,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("runtime stopped before finalizing"),
            }
        };
        assert_eq!(summary.actual_duration_seconds, 3600);
        assert_eq!(summary.tasks_completed_count, 1);
        assert_eq!(summary.tasks_planned_count, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reporter.calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
        assert!(matches!(
            handle.status().await.unwrap(),
            SessionEvent::StateSnapshot { phase: SessionPhase::Idle, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_all_handles_drop() {
        let (clock, ticks) = IntervalClock::new(Duration::from_secs(1));
        let controller = SessionController::new(
            MemorySnapshotStore::new(),
            CountingReporter::default(),
            clock,
        );
        let (handle, task) = SessionHandle::spawn(controller, ticks);
        handle.start(plan()).await.unwrap();
        handle.toggle_timer().await.unwrap();

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn status_is_a_reply_not_a_broadcast() {
        let handle = spawn(MemorySnapshotStore::new(), CountingReporter::default());
        handle.start(plan()).await.unwrap();
        let mut events = handle.subscribe();

        assert_eq!(remaining(&handle.status().await.unwrap()), 3600);
        assert!(matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn failed_finalize_event_flags_a_lagging_snapshot() {
        let store = MemorySnapshotStore::new();
        let reporter = CountingReporter::default();
        reporter.fail.store(true, Ordering::SeqCst);
        let handle = spawn(store.clone(), reporter.clone());
        handle.start(plan()).await.unwrap();

        store.set_fail_writes(true);
        let err = handle.complete_current_task().await.unwrap_err();
        assert!(matches!(err, SessionError::PersistenceFailure(_)));

        let mut events = handle.subscribe();
        assert!(handle.finalize().await.unwrap_err().is_retryable());
        match events.recv().await.unwrap() {
            SessionEvent::FinalizeFailed { snapshot_stale, .. } => assert!(snapshot_stale),
            other => panic!("expected FinalizeFailed, got {other:?}"),
        }

        store.set_fail_writes(false);
        reporter.fail.store(false, Ordering::SeqCst);
        let finalized = handle.finalize().await.unwrap();
        assert_eq!(finalized.summary.tasks_completed_count, 1);
        assert_eq!(reporter.calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }
}
