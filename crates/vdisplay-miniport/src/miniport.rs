use std::sync::Arc;

use vdisplay_ddi::{
    DriverInitializationData, DxgkStartInfo, DxgkrnlInterface, MiniportHandle, NtStatus,
    PhysicalDeviceObject, VideoRequestPacket, DXGKDDI_INTERFACE_VERSION_VISTA,
};

use crate::config::{AdapterConfig, ConfigError};
use crate::context::AdapterContext;
use crate::dispatch::{self, DispatchSnapshot};
use crate::error::{to_status, DdiError, Result};
use crate::lifecycle::LifecycleState;
use crate::manager::AdapterManager;
use crate::pool::PoolAllocator;

/// The display miniport driver object.
///
/// One `Miniport` serves every adapter the runtime adds. Its methods are the DDI entry points:
/// each one takes the opaque [`MiniportHandle`] issued by [`Miniport::add_device`] and returns an
/// [`NtStatus`]. Calls that are not legal in the adapter's current lifecycle state fail with
/// [`NtStatus::InvalidDeviceState`] and change nothing.
pub struct Miniport {
    adapters: AdapterManager,
}

impl Miniport {
    /// Create the driver object. `config` fixes the source/child counts and mode set for every
    /// adapter it will add; `pool` backs all context and per-source allocations.
    pub fn new(
        config: AdapterConfig,
        pool: Arc<dyn PoolAllocator>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            adapters: AdapterManager::new(config, pool),
        })
    }

    /// The registration table handed to the runtime.
    pub fn initialization_data() -> DriverInitializationData<Self> {
        DriverInitializationData {
            version: DXGKDDI_INTERFACE_VERSION_VISTA,
            add_device: Self::add_device,
            start_device: Self::start_device,
            stop_device: Self::stop_device,
            remove_device: Self::remove_device,
            dispatch_io_request: Self::dispatch_io_request,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        self.adapters.config()
    }

    /// `DxgkDdiAddDevice`. On success `handle` receives the new adapter's handle.
    pub fn add_device(
        &self,
        pdo: PhysicalDeviceObject,
        handle: &mut Option<MiniportHandle>,
    ) -> NtStatus {
        match self.adapters.create(pdo) {
            Ok(ctx) => {
                *handle = Some(ctx.handle());
                NtStatus::Success
            }
            Err(err) => {
                let status = err.status();
                tracing::debug!(pdo = ?pdo, %status, "DxgkDdiAddDevice failed: {err}");
                status
            }
        }
    }

    /// `DxgkDdiStartDevice`. On success the two counts receive the adapter's source and child
    /// counts; on failure they are left as they were.
    pub fn start_device(
        &self,
        handle: MiniportHandle,
        start_info: &DxgkStartInfo,
        dxgk: &DxgkrnlInterface,
        number_of_video_present_sources: &mut u32,
        number_of_children: &mut u32,
    ) -> NtStatus {
        let result = self.with_context(handle, "DxgkDdiStartDevice", |ctx| {
            let (sources, children) = ctx.start(start_info, dxgk)?;
            *number_of_video_present_sources = sources;
            *number_of_children = children;
            Ok(())
        });
        report("DxgkDdiStartDevice", handle, result)
    }

    /// `DxgkDdiStopDevice`.
    ///
    /// Returns [`NtStatus::DeviceBusy`] with the adapter still started if in-flight dispatches
    /// outlast the configured drain window.
    pub fn stop_device(&self, handle: MiniportHandle) -> NtStatus {
        let result = self.with_context(handle, "DxgkDdiStopDevice", |ctx| ctx.stop());
        report("DxgkDdiStopDevice", handle, result)
    }

    /// `DxgkDdiRemoveDevice`. Removing an unknown or already removed handle succeeds and does
    /// nothing.
    pub fn remove_device(&self, handle: MiniportHandle) -> NtStatus {
        let Some(ctx) = self.adapters.get(handle) else {
            tracing::debug!(adapter = %handle, "DxgkDdiRemoveDevice on a dead handle ignored");
            return NtStatus::Success;
        };
        let result = ctx.begin_remove().and_then(|()| {
            self.adapters
                .destroy(handle)
                .map_err(DdiError::ReleaseFailed)
        });
        report("DxgkDdiRemoveDevice", handle, result)
    }

    /// `DxgkDdiDispatchIoRequest`. On success `packet.response` is filled in.
    pub fn dispatch_io_request(
        &self,
        handle: MiniportHandle,
        source_id: u32,
        packet: &mut VideoRequestPacket,
    ) -> NtStatus {
        let result = self.with_context(handle, "DxgkDdiDispatchIoRequest", |ctx| {
            dispatch::dispatch(ctx, source_id, packet)
        });
        report("DxgkDdiDispatchIoRequest", handle, result)
    }

    /// Lifecycle state of `handle`. Handles never issued are `Uninitialized`; handles whose
    /// adapter has been removed are `Removed`.
    pub fn state(&self, handle: MiniportHandle) -> LifecycleState {
        self.adapters.state(handle)
    }

    /// Number of live adapter contexts.
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn dispatch_stats(&self, handle: MiniportHandle) -> Option<DispatchSnapshot> {
        self.adapters.get(handle).map(|ctx| ctx.stats.snapshot())
    }

    fn with_context(
        &self,
        handle: MiniportHandle,
        call: &'static str,
        f: impl FnOnce(&AdapterContext) -> Result<()>,
    ) -> Result<()> {
        match self.adapters.get(handle) {
            Some(ctx) => f(&ctx),
            None => Err(DdiError::WrongLifecycleState {
                call,
                state: self.adapters.state(handle),
            }),
        }
    }
}

fn report(call: &'static str, handle: MiniportHandle, result: Result<()>) -> NtStatus {
    if let Err(err) = &result {
        tracing::debug!(adapter = %handle, status = %err.status(), "{call} failed: {err}");
    }
    to_status(result)
}
