//! # Studyplan Core Library
//!
//! This library runs study sessions: it takes an ordered task list and a
//! time budget and turns them into a live, resumable countdown that tracks
//! time per task and reports the result when the session ends.
//!
//! ## Architecture
//!
//! - **Session State**: plain data plus pure transitions (tick, toggle,
//!   complete, skip). No timers or I/O.
//! - **Session Controller**: applies transitions, writes a snapshot after
//!   each one, and finalizes through the completion reporter.
//! - **Session Runtime**: a tokio task that owns the controller and
//!   serializes user commands with clock ticks.
//! - **Storage**: single-slot snapshot stores (SQLite, in-memory) and
//!   TOML-based configuration.
//! - **Reporter**: HTTP client for the task service's completion endpoint.
//!
//! ## Key Components
//!
//! - [`SessionController`]: session lifecycle state machine
//! - [`SessionHandle`]: handle to a live, clock-driven session
//! - [`SqliteSnapshotStore`]: durable snapshot slot
//! - [`HttpCompletionReporter`]: completion endpoint client
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod reporter;
pub mod session;
pub mod storage;

pub use error::{ConfigError, ReporterError, Result, SessionError};
pub use events::SessionEvent;
pub use reporter::{
    CompletionReport, CompletionReporter, HttpCompletionReporter, ReportAck, TaskStatusUpdate,
};
pub use session::{
    format_clock, ClockSource, CompletionRecord, FinalizedSession, IntervalClock, ManualClock,
    SessionController, SessionHandle, SessionPhase, SessionPlan, SessionRuntimeState,
    SessionSummary, Task,
};
pub use storage::{Config, MemorySnapshotStore, Snapshot, SnapshotStore, SqliteSnapshotStore};
