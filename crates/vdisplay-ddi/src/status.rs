//! Status codes returned across the DDI boundary.
//!
//! The runtime interprets these values directly, so the discriminants are the real NTSTATUS
//! encodings rather than an internal numbering.

use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NtStatus {
    Success = 0x0000_0000,
    /// `STATUS_DEVICE_BUSY` (warning severity).
    DeviceBusy = 0x8000_0011,
    /// `STATUS_UNSUCCESSFUL`; used for device-level failures.
    Unsuccessful = 0xC000_0001,
    InvalidParameter = 0xC000_000D,
    InsufficientResources = 0xC000_009A,
    NotSupported = 0xC000_00BB,
    /// A call arrived outside its legal lifecycle window.
    InvalidDeviceState = 0xC000_0184,
}

impl NtStatus {
    pub const ALL: [NtStatus; 7] = [
        NtStatus::Success,
        NtStatus::DeviceBusy,
        NtStatus::Unsuccessful,
        NtStatus::InvalidParameter,
        NtStatus::InsufficientResources,
        NtStatus::NotSupported,
        NtStatus::InvalidDeviceState,
    ];

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_u32() == value)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Equivalent of the `NT_SUCCESS` macro: success and informational severities pass.
    ///
    /// Note that `DeviceBusy` is a warning and therefore *not* a success.
    pub fn is_success(self) -> bool {
        (self.as_u32() >> 30) < 0b10
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "STATUS_SUCCESS",
            Self::DeviceBusy => "STATUS_DEVICE_BUSY",
            Self::Unsuccessful => "STATUS_UNSUCCESSFUL",
            Self::InvalidParameter => "STATUS_INVALID_PARAMETER",
            Self::InsufficientResources => "STATUS_INSUFFICIENT_RESOURCES",
            Self::NotSupported => "STATUS_NOT_SUPPORTED",
            Self::InvalidDeviceState => "STATUS_INVALID_DEVICE_STATE",
        }
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.as_u32())
    }
}
