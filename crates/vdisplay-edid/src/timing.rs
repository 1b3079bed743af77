//! Detailed timing descriptors and the reduced-blanking timing generator.

/// Horizontal blanking used by CVT reduced blanking (pixels).
const RB_H_BLANK: u32 = 160;
const RB_H_FRONT_PORCH: u32 = 48;
const RB_H_SYNC: u32 = 32;
const RB_V_FRONT_PORCH: u32 = 3;
const RB_MIN_V_BACK_PORCH: u32 = 6;
/// Minimum vertical blanking interval (microseconds).
const RB_MIN_VBLANK_US: f64 = 460.0;

/// Largest value representable by the 12-bit active/blank fields.
const DTD_MAX_12BIT: u32 = 0xFFF;

/// A video mode as listed by the monitor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EdidMode {
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
}

impl EdidMode {
    pub const fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            refresh_hz,
        }
    }
}

/// Fully specified timing as stored in an 18-byte detailed timing descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DetailedTiming {
    pub pixel_clock_10khz: u16,
    pub h_active: u16,
    pub h_blank: u16,
    pub h_front_porch: u16,
    pub h_sync: u16,
    pub v_active: u16,
    pub v_blank: u16,
    pub v_front_porch: u8,
    pub v_sync: u8,
    pub h_image_mm: u16,
    pub v_image_mm: u16,
}

impl DetailedTiming {
    pub const SIZE: usize = 18;

    pub fn h_total(&self) -> u32 {
        u32::from(self.h_active) + u32::from(self.h_blank)
    }

    pub fn v_total(&self) -> u32 {
        u32::from(self.v_active) + u32::from(self.v_blank)
    }

    pub fn pixel_clock_hz(&self) -> u64 {
        u64::from(self.pixel_clock_10khz) * 10_000
    }

    pub fn refresh_hz(&self) -> f64 {
        let denom = f64::from(self.h_total()) * f64::from(self.v_total());
        if denom == 0.0 {
            return 0.0;
        }
        self.pixel_clock_hz() as f64 / denom
    }

    /// Horizontal line rate rounded to the nearest kHz.
    pub fn h_freq_khz(&self) -> u64 {
        let h_total = u64::from(self.h_total());
        if h_total == 0 {
            return 0;
        }
        (self.pixel_clock_hz() + (h_total * 1000) / 2) / (h_total * 1000)
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.pixel_clock_10khz.to_le_bytes());

        out[2] = self.h_active as u8;
        out[3] = self.h_blank as u8;
        out[4] = (((self.h_active >> 8) as u8 & 0x0F) << 4) | ((self.h_blank >> 8) as u8 & 0x0F);

        out[5] = self.v_active as u8;
        out[6] = self.v_blank as u8;
        out[7] = (((self.v_active >> 8) as u8 & 0x0F) << 4) | ((self.v_blank >> 8) as u8 & 0x0F);

        out[8] = self.h_front_porch as u8;
        out[9] = self.h_sync as u8;
        out[10] = ((self.v_front_porch & 0x0F) << 4) | (self.v_sync & 0x0F);
        out[11] = (((self.h_front_porch >> 8) as u8 & 0x03) << 6)
            | (((self.h_sync >> 8) as u8 & 0x03) << 4)
            | (((self.v_front_porch >> 4) & 0x03) << 2)
            | ((self.v_sync >> 4) & 0x03);

        out[12] = self.h_image_mm as u8;
        out[13] = self.v_image_mm as u8;
        out[14] =
            (((self.h_image_mm >> 8) as u8 & 0x0F) << 4) | ((self.v_image_mm >> 8) as u8 & 0x0F);

        // No borders; digital separate sync, +hsync / -vsync (CVT-RB polarity).
        out[15] = 0;
        out[16] = 0;
        out[17] = 0x1A;
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        let pixel_clock_10khz = u16::from_le_bytes([bytes[0], bytes[1]]);
        if pixel_clock_10khz == 0 {
            // Display descriptor, not a timing.
            return None;
        }
        Some(Self {
            pixel_clock_10khz,
            h_active: u16::from(bytes[2]) | (u16::from(bytes[4] & 0xF0) << 4),
            h_blank: u16::from(bytes[3]) | (u16::from(bytes[4] & 0x0F) << 8),
            v_active: u16::from(bytes[5]) | (u16::from(bytes[7] & 0xF0) << 4),
            v_blank: u16::from(bytes[6]) | (u16::from(bytes[7] & 0x0F) << 8),
            h_front_porch: u16::from(bytes[8]) | (u16::from(bytes[11] >> 6) << 8),
            h_sync: u16::from(bytes[9]) | (u16::from((bytes[11] >> 4) & 0x03) << 8),
            v_front_porch: (bytes[10] >> 4) | (((bytes[11] >> 2) & 0x03) << 4),
            v_sync: (bytes[10] & 0x0F) | ((bytes[11] & 0x03) << 4),
            h_image_mm: u16::from(bytes[12]) | (u16::from(bytes[14] & 0xF0) << 4),
            v_image_mm: u16::from(bytes[13]) | (u16::from(bytes[14] & 0x0F) << 8),
        })
    }
}

/// Vertical sync width by aspect ratio, per the CVT tables.
fn cvt_v_sync(width: u32, height: u32) -> u32 {
    match aspect_ratio(width, height) {
        Some(AspectRatio::R4x3) => 4,
        Some(AspectRatio::R16x9) => 5,
        Some(AspectRatio::R16x10) => 6,
        Some(AspectRatio::R5x4) => 7,
        None => 10,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum AspectRatio {
    R16x10,
    R4x3,
    R5x4,
    R16x9,
}

pub(crate) fn aspect_ratio(width: u32, height: u32) -> Option<AspectRatio> {
    let w = u64::from(width);
    let h = u64::from(height);
    if w * 10 == h * 16 {
        Some(AspectRatio::R16x10)
    } else if w * 3 == h * 4 {
        Some(AspectRatio::R4x3)
    } else if w * 4 == h * 5 {
        Some(AspectRatio::R5x4)
    } else if w * 9 == h * 16 {
        Some(AspectRatio::R16x9)
    } else {
        None
    }
}

/// Generate a reduced-blanking timing for `mode`.
///
/// Returns `None` if the mode cannot be expressed in a detailed timing descriptor (zero sizes,
/// fields wider than 12 bits, or a pixel clock above 655.35 MHz).
pub fn reduced_blanking_timing(
    mode: EdidMode,
    h_image_mm: u16,
    v_image_mm: u16,
) -> Option<DetailedTiming> {
    if mode.width == 0 || mode.height == 0 || mode.refresh_hz == 0 {
        return None;
    }
    if mode.width > DTD_MAX_12BIT || mode.height > DTD_MAX_12BIT {
        return None;
    }

    let v_sync = cvt_v_sync(mode.width, mode.height);
    let frame_us = 1_000_000.0 / f64::from(mode.refresh_hz);
    let active_us = frame_us - RB_MIN_VBLANK_US;
    if active_us <= 0.0 {
        return None;
    }
    let h_period_us = active_us / f64::from(mode.height);
    let vbi_lines = (RB_MIN_VBLANK_US / h_period_us) as u32 + 1;
    let v_blank = vbi_lines.max(RB_V_FRONT_PORCH + v_sync + RB_MIN_V_BACK_PORCH);
    if v_blank > DTD_MAX_12BIT {
        return None;
    }

    let h_total = u64::from(mode.width + RB_H_BLANK);
    let v_total = u64::from(mode.height + v_blank);
    let pixel_clock_hz = h_total * v_total * u64::from(mode.refresh_hz);
    let pixel_clock_10khz = u16::try_from((pixel_clock_hz + 5_000) / 10_000).ok()?;

    Some(DetailedTiming {
        pixel_clock_10khz,
        h_active: mode.width as u16,
        h_blank: RB_H_BLANK as u16,
        h_front_porch: RB_H_FRONT_PORCH as u16,
        h_sync: RB_H_SYNC as u16,
        v_active: mode.height as u16,
        v_blank: v_blank as u16,
        v_front_porch: RB_V_FRONT_PORCH as u8,
        v_sync: v_sync as u8,
        h_image_mm,
        v_image_mm,
    })
}
