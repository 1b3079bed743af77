//! Types exchanged between the display runtime and the adapter at registration and start time.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::request::VideoRequestPacket;
use crate::status::NtStatus;

/// `DXGKDDI_INTERFACE_VERSION_VISTA`: the contract revision this adapter implements.
pub const DXGKDDI_INTERFACE_VERSION_VISTA: u32 = 0x1052;

/// Opaque reference to the physical device object supplied by the runtime at add time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysicalDeviceObject(pub u64);

/// Opaque "miniport device context" handle returned by `AddDevice`.
///
/// Handles are never reused, so a handle that outlives its adapter cannot alias another one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MiniportHandle(NonZeroU64);

impl MiniportHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for MiniportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiniportHandle({:#x})", self.0)
    }
}

impl fmt::Display for MiniportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Start parameters (`DXGK_START_INFO`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DxgkStartInfo {
    pub required_dma_queue_entry: u32,
    pub adapter_guid: [u8; 16],
}

impl Default for DxgkStartInfo {
    fn default() -> Self {
        Self {
            required_dma_queue_entry: 1,
            adapter_guid: [0; 16],
        }
    }
}

/// Runtime services the adapter may call back into.
///
/// Implementations can re-enter the adapter (for example to issue another dispatch), so the
/// adapter must not hold any of its own locks while calling these.
pub trait DxgkrnlCallbacks: Send + Sync {
    /// `DxgkCbNotifyInterrupt` for a retired present on `source_id`.
    fn notify_present_complete(&self, source_id: u32, fence: u64);
}

/// Callbacks that ignore every notification.
#[derive(Debug, Default)]
pub struct NullDxgkrnlCallbacks;

impl DxgkrnlCallbacks for NullDxgkrnlCallbacks {
    fn notify_present_complete(&self, _source_id: u32, _fence: u64) {}
}

/// Runtime interface handed over at start (`DXGKRNL_INTERFACE`).
#[derive(Clone)]
pub struct DxgkrnlInterface {
    pub version: u32,
    pub device_handle: u64,
    pub callbacks: Arc<dyn DxgkrnlCallbacks>,
}

impl DxgkrnlInterface {
    pub fn new(callbacks: Arc<dyn DxgkrnlCallbacks>) -> Self {
        Self {
            version: DXGKDDI_INTERFACE_VERSION_VISTA,
            device_handle: 0,
            callbacks,
        }
    }
}

impl fmt::Debug for DxgkrnlInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DxgkrnlInterface")
            .field("version", &format_args!("{:#x}", self.version))
            .field("device_handle", &format_args!("{:#x}", self.device_handle))
            .finish_non_exhaustive()
    }
}

pub type DdiAddDevice<D> = fn(&D, PhysicalDeviceObject, &mut Option<MiniportHandle>) -> NtStatus;
pub type DdiStartDevice<D> = fn(
    &D,
    MiniportHandle,
    &DxgkStartInfo,
    &DxgkrnlInterface,
    &mut u32,
    &mut u32,
) -> NtStatus;
pub type DdiStopDevice<D> = fn(&D, MiniportHandle) -> NtStatus;
pub type DdiRemoveDevice<D> = fn(&D, MiniportHandle) -> NtStatus;
pub type DdiDispatchIoRequest<D> = fn(&D, MiniportHandle, u32, &mut VideoRequestPacket) -> NtStatus;

/// Registration table (`DRIVER_INITIALIZATION_DATA`).
///
/// `D` is the driver object the entries are invoked against. The runtime may call entries in any
/// order; legality is decided by the adapter's lifecycle state, not by this table.
pub struct DriverInitializationData<D> {
    pub version: u32,
    pub add_device: DdiAddDevice<D>,
    pub start_device: DdiStartDevice<D>,
    pub stop_device: DdiStopDevice<D>,
    pub remove_device: DdiRemoveDevice<D>,
    pub dispatch_io_request: DdiDispatchIoRequest<D>,
}

impl<D> Clone for DriverInitializationData<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for DriverInitializationData<D> {}

impl<D> fmt::Debug for DriverInitializationData<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverInitializationData")
            .field("version", &format_args!("{:#x}", self.version))
            .finish_non_exhaustive()
    }
}
