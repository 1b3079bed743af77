//! Virtual display miniport: the adapter side of the display driver interface.
//!
//! [`Miniport`] is the driver object. The runtime (or a test standing in for it) drives each
//! adapter through `AddDevice → StartDevice → DispatchIoRequest* → StopDevice → RemoveDevice`
//! using the entry points in [`Miniport::initialization_data`]. Every call returns an
//! [`NtStatus`](vdisplay_ddi::NtStatus); internal failures are [`DdiError`]s mapped at that
//! boundary.
//!
//! The number of sources and children, the mode set and the monitor identity come from
//! [`AdapterConfig`]. Long-lived allocations go through a [`PoolAllocator`] so tests can count
//! them with [`TrackingPool`].
#![forbid(unsafe_code)]

mod config;
mod context;
mod dispatch;
mod error;
mod gate;
mod lifecycle;
mod manager;
mod miniport;
mod pool;
mod source;
mod vidpn;

pub use config::{
    AdapterConfig, ConfigError, CONFIG_ENV_VAR, MAX_CHILDREN, MAX_MODE_DIMENSION,
    MAX_STOP_DRAIN_TIMEOUT_MS, MAX_VIDEO_PRESENT_SOURCES,
};
pub use dispatch::DispatchSnapshot;
pub use error::{DdiError, Result};
pub use lifecycle::LifecycleState;
pub use miniport::Miniport;
pub use pool::{
    PoolAllocation, PoolAllocator, PoolError, PoolTag, SystemPool, TrackingPool, CONTEXT_TAG,
    SOURCE_TAG,
};
