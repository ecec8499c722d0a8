//! Lifecycle state shared between the owner and the worker thread.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutorState {
    /// No worker exists.
    Idle = 0,
    /// Worker running with a pending wait.
    Armed = 1,
    /// Worker running, wait cancelled until `resume`.
    Paused = 2,
    /// `stop` in progress; the worker is being torn down.
    Stopping = 3,
}

impl ExecutorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecutorState::Armed,
            2 => ExecutorState::Paused,
            3 => ExecutorState::Stopping,
            _ => ExecutorState::Idle,
        }
    }

    /// Armed or paused.
    pub fn is_running(self) -> bool {
        matches!(self, ExecutorState::Armed | ExecutorState::Paused)
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorState::Idle => write!(f, "idle"),
            ExecutorState::Armed => write!(f, "armed"),
            ExecutorState::Paused => write!(f, "paused"),
            ExecutorState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Atomic cell holding an [`ExecutorState`].
///
/// Transitions go through [`AtomicState::transition`] so that a check and
/// the following update cannot interleave with another thread.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ExecutorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ExecutorState {
        ExecutorState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: ExecutorState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` -> `to`. Returns false if the current state is not `from`.
    pub(crate) fn transition(&self, from: ExecutorState, to: ExecutorState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(ExecutorState::Idle)
    }
}
