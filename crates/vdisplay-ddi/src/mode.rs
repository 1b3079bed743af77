use serde::{Deserialize, Serialize};

/// Surface formats a virtual source can scan out.
///
/// `*X8*` formats carry no alpha; presenters treat the padding byte as opaque.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    #[serde(rename = "b8g8r8x8_unorm")]
    B8G8R8X8Unorm,
    #[serde(rename = "b8g8r8a8_unorm")]
    B8G8R8A8Unorm,
    #[serde(rename = "r8g8b8a8_unorm")]
    R8G8B8A8Unorm,
    #[serde(rename = "b5g6r5_unorm")]
    B5G6R5Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::B8G8R8X8Unorm | Self::B8G8R8A8Unorm | Self::R8G8B8A8Unorm => 4,
            Self::B5G6R5Unorm => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
    #[serde(default)]
    pub format: PixelFormat,
}

impl DisplayMode {
    pub const fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            refresh_hz,
            format: PixelFormat::B8G8R8X8Unorm,
        }
    }

    pub const fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Row pitch in bytes, or `None` if it does not fit in a `u32`.
    pub fn pitch_bytes(&self) -> Option<u32> {
        self.width.checked_mul(self.format.bytes_per_pixel())
    }

    /// Total surface size in bytes.
    pub fn surface_bytes(&self) -> Option<u64> {
        u64::from(self.pitch_bytes()?).checked_mul(u64::from(self.height))
    }
}
