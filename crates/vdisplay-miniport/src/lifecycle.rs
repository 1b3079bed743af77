use std::sync::atomic::{AtomicU8, Ordering};

/// Adapter lifecycle as seen by the runtime.
///
/// `Uninitialized` and `Removed` never live inside a context: they describe handles that were never
/// issued or whose context has already been destroyed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Added = 1,
    Started = 2,
    Stopped = 3,
    Removed = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Added,
            2 => Self::Started,
            3 => Self::Stopped,
            4 => Self::Removed,
            _ => Self::Uninitialized,
        }
    }

    pub fn can_start(self) -> bool {
        matches!(self, Self::Added | Self::Stopped)
    }

    pub fn can_stop(self) -> bool {
        self == Self::Started
    }

    pub fn can_remove(self) -> bool {
        matches!(self, Self::Added | Self::Stopped)
    }
}

/// Lock-free cell so dispatch paths can read the state while a lifecycle call is in progress.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `next` and return the previous state.
    pub(crate) fn set(&self, next: LifecycleState) -> LifecycleState {
        LifecycleState::from_u8(self.0.swap(next as u8, Ordering::AcqRel))
    }
}
