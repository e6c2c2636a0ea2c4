//! In-process snapshot slot.
//!
//! Clones share the same slot, so a test (or an embedding host) can keep a
//! handle after moving the store into a controller, and a second controller
//! built from the same handle behaves like a restarted process.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Snapshot, SnapshotStore};
use crate::error::{Result, SessionError};

#[derive(Debug, Default)]
struct Slot {
    encoded: Mutex<Option<String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Slot>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` and `clear` fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.slot.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn write_count(&self) -> usize {
        self.slot.writes.load(Ordering::SeqCst)
    }

    /// Raw stored JSON, if any.
    pub fn raw(&self) -> Option<String> {
        self.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_none()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.slot
            .encoded
            .lock()
            .map_err(|_| SessionError::PersistenceFailure("snapshot slot poisoned".into()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.slot.fail_writes.load(Ordering::SeqCst) {
            return Err(SessionError::PersistenceFailure(
                "snapshot slot is not writable".into(),
            ));
        }
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.check_writable()?;
        let encoded = snapshot.encode()?;
        *self.lock()? = Some(encoded);
        self.slot.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        match self.lock()?.as_deref() {
            Some(raw) => Snapshot::decode(raw).map(Some),
            None => Ok(None),
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        *self.lock()? = None;
        Ok(())
    }
}
