use std::path::PathBuf;

use clap::Subcommand;
use serde::Deserialize;
use studyplan_core::reporter::keyring_store;
use studyplan_core::{
    format_clock, ClockSource, Config, HttpCompletionReporter, IntervalClock, ManualClock,
    SessionController, SessionEvent, SessionHandle, SessionPhase, SessionPlan, SnapshotStore,
    SqliteSnapshotStore, Task,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

type Controller<C> = SessionController<SqliteSnapshotStore, HttpCompletionReporter, C>;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a session from a plan file (JSON)
    Start {
        /// Path to the plan file
        #[arg(long)]
        plan: PathBuf,
    },
    /// Record the current task as done
    Complete,
    /// Move past the current task without recording it
    Skip,
    /// Show the persisted session
    Status {
        /// Print the raw state event
        #[arg(long)]
        json: bool,
    },
    /// End the session and report it
    Finalize,
    /// Abandon the session without reporting
    Cancel,
    /// Run the live countdown in this terminal
    Run,
}

/// Plan file layout. `id` is optional; a fresh one is generated when absent.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanFile {
    #[serde(default)]
    id: Option<String>,
    scheduled_duration: u64,
    #[serde(default)]
    tasks_planned: Vec<Task>,
}

impl PlanFile {
    fn into_plan(self) -> SessionPlan {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        SessionPlan::new(id, self.scheduled_duration, self.tasks_planned)
    }
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match action {
            SessionAction::Run => run_live(&config).await,
            other => run_once(&config, other).await,
        }
    })
}

/// The reporter token comes from STUDYPLAN_REPORTER_TOKEN when set, else the
/// OS keyring.
fn reporter_token() -> Option<String> {
    std::env::var("STUDYPLAN_REPORTER_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .or_else(keyring_store::reporter_token)
}

/// Open the slot and pick up whatever session it holds.
fn open_controller<C: ClockSource>(
    config: &Config,
    clock: C,
) -> Result<Controller<C>, Box<dyn std::error::Error>> {
    let store = SqliteSnapshotStore::open(config.session.slot.clone())?;
    let plan = match store.load()? {
        Some(snapshot) => store.lookup_plan(&snapshot.session_id)?,
        None => None,
    };
    let reporter = HttpCompletionReporter::from_config(&config.reporter, reporter_token())?;

    let mut controller = SessionController::new(store, reporter, clock);
    if controller.resume(move |_| plan)?.is_some() {
        tracing::debug!("picked up persisted session");
    }
    Ok(controller)
}

fn print_event(event: &SessionEvent) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

fn forget_plan<C: ClockSource>(controller: &Controller<C>, plan_id: &str) {
    if let Err(e) = controller.store().forget_plan(plan_id) {
        tracing::warn!(plan_id, error = %e, "could not drop remembered plan");
    }
}

async fn run_once(
    config: &Config,
    action: SessionAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = open_controller(config, ManualClock::new())?;
    let plan_id = controller.plan().map(|p| p.id.clone());

    match action {
        SessionAction::Start { plan } => {
            let content = std::fs::read_to_string(&plan)
                .map_err(|e| format!("cannot read {}: {e}", plan.display()))?;
            let file: PlanFile = serde_json::from_str(&content)
                .map_err(|e| format!("invalid plan file {}: {e}", plan.display()))?;
            let plan = file.into_plan();
            plan.validate()?;
            if controller.phase() == SessionPhase::Idle {
                controller.store().remember_plan(&plan)?;
            }
            let event = controller.start(plan)?;
            print_event(&event)?;
        }
        SessionAction::Complete => print_event(&controller.complete_current_task()?)?,
        SessionAction::Skip => print_event(&controller.skip_current_task()?)?,
        SessionAction::Status { json } => {
            if json {
                print_event(&controller.snapshot_event())?;
            } else {
                print_status(&controller);
            }
        }
        SessionAction::Finalize => {
            let finalized = match controller.finalize().await {
                Ok(finalized) => finalized,
                Err(e) => {
                    if controller.snapshot_stale() {
                        eprintln!("warning: saved session is behind; unsaved progress is lost on exit");
                    }
                    return Err(e.into());
                }
            };
            if let Some(id) = &plan_id {
                forget_plan(&controller, id);
            }
            print_event(&finalized.to_event())?;
        }
        SessionAction::Cancel => {
            let event = controller.cancel()?;
            if let Some(id) = &plan_id {
                forget_plan(&controller, id);
            }
            print_event(&event)?;
        }
        SessionAction::Run => return Err("live mode cannot run as a one-shot command".into()),
    }
    Ok(())
}

fn print_status<C: ClockSource>(controller: &Controller<C>) {
    let (Some(plan), Some(state)) = (controller.plan(), controller.state()) else {
        println!("no active session");
        return;
    };

    println!("session:   {} ({})", state.session_id(), controller.phase());
    println!(
        "plan:      {} tasks, {} min estimated",
        plan.task_count(),
        plan.total_estimate_min()
    );
    println!(
        "remaining: {} of {}",
        format_clock(state.remaining_seconds()),
        format_clock(state.scheduled_duration())
    );
    match state.current_task(plan) {
        Some(task) => println!(
            "task:      {}/{} {} ({} min est., {} spent)",
            state.task_cursor() + 1,
            plan.task_count(),
            task.title,
            task.effective_estimate_min(),
            format_clock(state.current_task_elapsed())
        ),
        None => println!("task:      all {} tasks done", plan.task_count()),
    }
    for record in state.completions() {
        println!(
            "  done {} {} in {}",
            record.completed_at.with_timezone(&chrono::Local).format("%H:%M"),
            record.task_title,
            format_clock(record.time_spent_seconds)
        );
    }
}

const LIVE_HELP: &str = "keys: p=pause/resume  c=complete  s=skip  f=finalize  x=cancel  ?=status  q=quit";

async fn run_live(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (clock, ticks) = IntervalClock::new(config.session.tick_interval());
    let controller = open_controller(config, clock)?;
    let Some(plan_id) = controller.plan().map(|p| p.id.clone()) else {
        return Err("no active session; run `studyplan session start --plan <file>` first".into());
    };

    let (handle, task) = SessionHandle::spawn(controller, ticks);
    let mut events = handle.subscribe();
    eprintln!("{LIVE_HELP}");
    handle.toggle_timer().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ended = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch(&handle, line.trim()).await {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if render(&event)? {
                        ended = true;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Leave the session paused so the snapshot reads the same as memory.
    if !ended {
        if let Ok(SessionEvent::StateSnapshot {
            phase: SessionPhase::Running,
            ..
        }) = handle.status().await
        {
            handle.toggle_timer().await?;
        }
    }
    // Events already published when the loop stopped still get printed.
    while let Ok(event) = events.try_recv() {
        if render(&event)? {
            ended = true;
        }
    }
    drop(handle);
    drop(events);
    task.await?;

    if ended {
        let store = SqliteSnapshotStore::open(config.session.slot.clone())?;
        store.forget_plan(&plan_id)?;
    }
    Ok(())
}

/// Apply one key command. Returns false when the user quits.
async fn dispatch(handle: &SessionHandle, input: &str) -> bool {
    let result = match input {
        "" => return true,
        "q" => return false,
        "p" => handle.toggle_timer().await.map(|_| ()),
        "c" => handle.complete_current_task().await.map(|_| ()),
        "s" => handle.skip_current_task().await.map(|_| ()),
        "f" => handle.finalize().await.map(|_| ()),
        "x" => handle.cancel().await.map(|_| ()),
        "?" => match handle.status().await {
            Ok(event) => {
                eprintln!();
                if let Err(e) = print_event(&event) {
                    eprintln!("error: {e}");
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        other => {
            eprintln!("unknown key '{other}'; {LIVE_HELP}");
            return true;
        }
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
    true
}

/// Print one event. Returns true once the session has ended.
fn render(event: &SessionEvent) -> Result<bool, Box<dyn std::error::Error>> {
    match event {
        SessionEvent::Ticked {
            remaining_seconds, ..
        } => {
            eprint!("\r{} remaining ", format_clock(*remaining_seconds));
            Ok(false)
        }
        SessionEvent::SessionFinalized { .. } | SessionEvent::SessionCancelled { .. } => {
            eprintln!();
            print_event(event)?;
            Ok(true)
        }
        _ => {
            eprintln!();
            print_event(event)?;
            Ok(false)
        }
    }
}
