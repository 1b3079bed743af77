//! Display Driver Interface vocabulary for the virtual display adapter.
//!
//! This crate holds everything both sides of the DDI boundary agree on:
//! - status codes ([`NtStatus`]) and the interface version tag,
//! - start parameters and runtime callbacks ([`DxgkStartInfo`], [`DxgkrnlInterface`]),
//! - the closed set of I/O requests ([`VideoRequest`]) and their responses, and
//! - the registration table ([`DriverInitializationData`]).
//!
//! It contains no adapter logic; see `vdisplay-miniport` for that.
#![forbid(unsafe_code)]

pub mod child;
pub mod interface;
pub mod mode;
pub mod power;
pub mod request;
pub mod status;
pub mod vidpn;

pub use child::{ChildDescriptor, ChildDeviceType, OutputTechnology};
pub use interface::{
    DriverInitializationData, DxgkStartInfo, DxgkrnlCallbacks, DxgkrnlInterface, MiniportHandle,
    NullDxgkrnlCallbacks, PhysicalDeviceObject, DXGKDDI_INTERFACE_VERSION_VISTA,
};
pub use mode::{DisplayMode, PixelFormat};
pub use power::DevicePowerState;
pub use request::{
    PresentSubmission, RequestKind, VideoRequest, VideoRequestPacket, VideoResponse,
};
pub use status::NtStatus;
pub use vidpn::{VidPnPath, VidPnTopology};
