//! Request packets routed through `DxgkDdiDispatchIoRequest`.
//!
//! Requests form a closed set: adding an operation means adding a variant here, and every
//! `match` over [`VideoRequest`] in the adapter then has to handle it.

use crate::child::ChildDescriptor;
use crate::mode::DisplayMode;
use crate::power::DevicePowerState;
use crate::vidpn::VidPnTopology;

/// A single present/DMA buffer submission for one source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PresentSubmission {
    pub width: u32,
    pub height: u32,
    /// Fence value signalled back to the runtime once the present retires. Must increase
    /// strictly per source.
    pub fence: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoRequest {
    QueryCurrentMode,
    EnumSourceModes,
    SetMode(DisplayMode),
    IsSupportedVidPn(VidPnTopology),
    CommitVidPn(VidPnTopology),
    Present(PresentSubmission),
    SetPowerState(DevicePowerState),
    QueryPowerState,
    QueryChildRelations,
    QueryChildStatus {
        child_uid: u32,
    },
    QueryDeviceDescriptor {
        child_uid: u32,
        offset: u32,
        length: u32,
    },
    QueryPresentStats,
}

impl VideoRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::QueryCurrentMode => RequestKind::QueryCurrentMode,
            Self::EnumSourceModes => RequestKind::EnumSourceModes,
            Self::SetMode(_) => RequestKind::SetMode,
            Self::IsSupportedVidPn(_) => RequestKind::IsSupportedVidPn,
            Self::CommitVidPn(_) => RequestKind::CommitVidPn,
            Self::Present(_) => RequestKind::Present,
            Self::SetPowerState(_) => RequestKind::SetPowerState,
            Self::QueryPowerState => RequestKind::QueryPowerState,
            Self::QueryChildRelations => RequestKind::QueryChildRelations,
            Self::QueryChildStatus { .. } => RequestKind::QueryChildStatus,
            Self::QueryDeviceDescriptor { .. } => RequestKind::QueryDeviceDescriptor,
            Self::QueryPresentStats => RequestKind::QueryPresentStats,
        }
    }
}

/// Payload-free discriminant of [`VideoRequest`], usable as a table index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    QueryCurrentMode,
    EnumSourceModes,
    SetMode,
    IsSupportedVidPn,
    CommitVidPn,
    Present,
    SetPowerState,
    QueryPowerState,
    QueryChildRelations,
    QueryChildStatus,
    QueryDeviceDescriptor,
    QueryPresentStats,
}

impl RequestKind {
    pub const COUNT: usize = 12;

    pub const ALL: [RequestKind; Self::COUNT] = [
        RequestKind::QueryCurrentMode,
        RequestKind::EnumSourceModes,
        RequestKind::SetMode,
        RequestKind::IsSupportedVidPn,
        RequestKind::CommitVidPn,
        RequestKind::Present,
        RequestKind::SetPowerState,
        RequestKind::QueryPowerState,
        RequestKind::QueryChildRelations,
        RequestKind::QueryChildStatus,
        RequestKind::QueryDeviceDescriptor,
        RequestKind::QueryPresentStats,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoResponse {
    CurrentMode(Option<DisplayMode>),
    SourceModes(Vec<DisplayMode>),
    ModeSet,
    VidPnSupported(bool),
    Committed,
    Presented { frame: u64 },
    PowerState(DevicePowerState),
    ChildRelations(Vec<ChildDescriptor>),
    ChildStatus { connected: bool },
    DeviceDescriptor(Vec<u8>),
    PresentStats { frames: u64, last_fence: Option<u64> },
}

/// Input/output block for one dispatch call (`VIDEO_REQUEST_PACKET`).
///
/// The caller hands the packet in with `response == None`; on success the adapter fills it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoRequestPacket {
    pub request: VideoRequest,
    pub response: Option<VideoResponse>,
}

impl VideoRequestPacket {
    pub fn new(request: VideoRequest) -> Self {
        Self {
            request,
            response: None,
        }
    }
}

impl From<VideoRequest> for VideoRequestPacket {
    fn from(request: VideoRequest) -> Self {
        Self::new(request)
    }
}
