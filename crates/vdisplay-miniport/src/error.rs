use thiserror::Error;
use vdisplay_ddi::{DevicePowerState, DisplayMode, NtStatus, RequestKind};
use vdisplay_edid::EdidError;

use crate::lifecycle::LifecycleState;
use crate::pool::PoolError;

pub type Result<T> = std::result::Result<T, DdiError>;

/// Every way a DDI call can fail below the status-code boundary.
///
/// Each variant maps onto exactly one [`NtStatus`] via [`DdiError::status`]; entry points convert
/// at the boundary and nothing underneath returns raw status codes.
#[derive(Debug, Error)]
pub enum DdiError {
    #[error("allocation failed: {0}")]
    OutOfResources(#[source] PoolError),

    #[error("adapter registry is full")]
    RegistryExhausted,

    #[error("{call} is not legal in state {state:?}")]
    WrongLifecycleState {
        call: &'static str,
        state: LifecycleState,
    },

    #[error("{kind:?} is not legal on source {source_id}: {reason}")]
    WrongSourceState {
        kind: RequestKind,
        source_id: u32,
        reason: &'static str,
    },

    #[error("{kind:?} requires power state D0 (adapter is in {state:?})")]
    PoweredDown {
        kind: RequestKind,
        state: DevicePowerState,
    },

    #[error("video present source {source_id} out of range (adapter has {count})")]
    InvalidSource { source_id: u32, count: u32 },

    #[error("child uid {child_uid} out of range (adapter has {count})")]
    InvalidChild { child_uid: u32, count: u32 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("mode {0:?} is not in the source mode set")]
    UnsupportedMode(DisplayMode),

    #[error("monitor descriptor unavailable: {0}")]
    Descriptor(#[from] EdidError),

    #[error("in-flight dispatches did not drain within {timeout_ms} ms")]
    DrainTimeout { timeout_ms: u64 },

    #[error("resource release failed: {0}")]
    ReleaseFailed(#[source] PoolError),

    #[error("adapter state lock poisoned")]
    LockPoisoned,
}

impl DdiError {
    pub fn status(&self) -> NtStatus {
        match self {
            Self::OutOfResources(_) | Self::RegistryExhausted => NtStatus::InsufficientResources,
            Self::WrongLifecycleState { .. }
            | Self::WrongSourceState { .. }
            | Self::PoweredDown { .. } => NtStatus::InvalidDeviceState,
            Self::InvalidSource { .. } | Self::InvalidChild { .. } | Self::InvalidParameter(_) => {
                NtStatus::InvalidParameter
            }
            Self::UnsupportedMode(_) | Self::Descriptor(_) => NtStatus::NotSupported,
            Self::DrainTimeout { .. } => NtStatus::DeviceBusy,
            Self::ReleaseFailed(_) | Self::LockPoisoned => NtStatus::Unsuccessful,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for DdiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

/// Collapse an internal result into the status the runtime sees.
pub(crate) fn to_status(result: Result<()>) -> NtStatus {
    match result {
        Ok(()) => NtStatus::Success,
        Err(err) => err.status(),
    }
}
