mod clock;
mod controller;
mod plan;
mod runtime;
mod state;

pub use clock::{ClockSource, ClockTick, IntervalClock, ManualClock};
pub use controller::{FinalizedSession, SessionController, SessionPhase};
pub use plan::{SessionPlan, Task, USER_ESTIMATE_RANGE};
pub use runtime::SessionHandle;
pub use state::{
    format_clock, CompletionRecord, SessionRuntimeState, SessionSummary, TaskAdvance, TickOutcome,
};
