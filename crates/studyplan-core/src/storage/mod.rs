mod config;
pub mod database;
pub mod memory;
pub mod snapshot;

pub use config::{Config, LogConfig, ReporterConfig, SessionConfig};
pub use database::SqliteSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};

use std::path::PathBuf;

use crate::error::Result;

/// Durable single-slot home for the resumable session snapshot.
///
/// Last write wins. Implementations must store a snapshot whole or not at
/// all so a reader never sees a half-applied transition.
pub trait SnapshotStore: Send {
    fn save(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn load(&self) -> Result<Option<Snapshot>>;

    fn clear(&mut self) -> Result<()>;
}

/// Returns `~/.config/studyplan[-dev]/` based on STUDYPLAN_ENV.
///
/// Set STUDYPLAN_ENV=dev to use the development data directory, or
/// STUDYPLAN_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = data_dir_path();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Where [`data_dir`] points, without creating it.
pub(crate) fn data_dir_path() -> PathBuf {
    match std::env::var_os("STUDYPLAN_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STUDYPLAN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("studyplan-dev")
            } else {
                base_dir.join("studyplan")
            }
        }
    }
}
