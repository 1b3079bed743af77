//! Per-source state: current mode, VidPN commitment and present progress.
//!
//! Each source guards its state with its own mutex. Handlers hold it only while reading or
//! updating the fields and drop it before any runtime callback.

use std::sync::{Mutex, PoisonError};

use vdisplay_ddi::{DisplayMode, PresentSubmission, RequestKind, VidPnPath};

use crate::error::{DdiError, Result};
use crate::pool::{PoolAllocation, PoolError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct CommittedPath {
    pub target_id: u32,
    pub mode: DisplayMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SourceState {
    pub current_mode: Option<DisplayMode>,
    pub committed: Option<CommittedPath>,
    pub frames: u64,
    pub last_fence: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct VideoPresentSource {
    id: u32,
    state: Mutex<SourceState>,
    storage: Mutex<Option<PoolAllocation>>,
}

impl VideoPresentSource {
    pub(crate) fn new(id: u32, storage: PoolAllocation) -> Self {
        Self {
            id,
            state: Mutex::new(SourceState::default()),
            storage: Mutex::new(Some(storage)),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn snapshot(&self) -> Result<SourceState> {
        Ok(self.state.lock()?.clone())
    }

    pub(crate) fn set_mode(&self, mode: DisplayMode) -> Result<()> {
        let mut state = self.state.lock()?;
        state.current_mode = Some(mode);
        if let Some(committed) = state.committed.as_mut() {
            committed.mode = mode;
        }
        Ok(())
    }

    /// Pin `path` to this source, or unpin it when `path` is `None`.
    pub(crate) fn commit(&self, path: Option<VidPnPath>) -> Result<()> {
        let mut state = self.state.lock()?;
        match path {
            Some(path) => {
                state.committed = Some(CommittedPath {
                    target_id: path.target_id,
                    mode: path.source_mode,
                });
                state.current_mode = Some(path.source_mode);
            }
            None => state.committed = None,
        }
        Ok(())
    }

    /// Record a present and return its frame number (1-based).
    pub(crate) fn present(&self, submission: PresentSubmission) -> Result<u64> {
        let mut state = self.state.lock()?;
        let committed = state.committed.ok_or(DdiError::WrongSourceState {
            kind: RequestKind::Present,
            source_id: self.id,
            reason: "no VidPN committed",
        })?;
        if (submission.width, submission.height) != (committed.mode.width, committed.mode.height) {
            return Err(DdiError::InvalidParameter(
                "present size does not match the committed mode",
            ));
        }
        if state.last_fence.is_some_and(|last| submission.fence <= last) {
            return Err(DdiError::InvalidParameter("present fence did not advance"));
        }
        state.frames += 1;
        state.last_fence = Some(submission.fence);
        Ok(state.frames)
    }

    /// Return the per-source storage block. Safe to call more than once.
    pub(crate) fn release_storage(&self) -> std::result::Result<(), PoolError> {
        let storage = self
            .storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match storage {
            Some(storage) => storage.release(),
            None => Ok(()),
        }
    }
}
