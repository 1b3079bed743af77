//! EDID 1.4 base block for the virtual monitor.
//!
//! The adapter answers `QueryDeviceDescriptor` for its child connector with the block produced
//! here. Only the 128-byte base block exists; the extension count is always zero.
#![forbid(unsafe_code)]

mod timing;

pub use timing::{reduced_blanking_timing, DetailedTiming, EdidMode};

use thiserror::Error;
use timing::{aspect_ratio, AspectRatio};

pub const EDID_BLOCK_SIZE: usize = 128;
pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Product code written at bytes 10..12 of every block.
pub const PRODUCT_CODE: u16 = 0x0001;

/// Longest monitor name a display-name descriptor can carry.
pub const MAX_MONITOR_NAME_LEN: usize = 13;

const STANDARD_TIMING_SLOTS: usize = 8;
const STANDARD_TIMING_UNUSED: [u8; 2] = [0x01, 0x01];

// sRGB primaries / white point, pre-packed into the 10-byte chromaticity block.
const SRGB_CHROMATICITY: [u8; 10] = [0xEE, 0x91, 0xA3, 0x54, 0x4C, 0x99, 0x26, 0x0F, 0x50, 0x54];

const DESCRIPTOR_RANGE_LIMITS: u8 = 0xFD;
const DESCRIPTOR_MONITOR_NAME: u8 = 0xFC;
const DESCRIPTOR_DUMMY: u8 = 0x10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EdidError {
    #[error("preferred mode {0:?} cannot be expressed as a detailed timing")]
    UnencodablePreferredMode(EdidMode),

    #[error("monitor name must be 1..={MAX_MONITOR_NAME_LEN} printable ASCII bytes")]
    InvalidMonitorName,
}

/// A complete, checksummed base block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edid {
    block: [u8; EDID_BLOCK_SIZE],
}

impl Edid {
    pub fn as_bytes(&self) -> &[u8; EDID_BLOCK_SIZE] {
        &self.block
    }

    /// Returns block `index`; only block 0 exists.
    pub fn read_block(&self, index: usize) -> Option<&[u8; EDID_BLOCK_SIZE]> {
        (index == 0).then_some(&self.block)
    }

    pub fn checksum_ok(&self) -> bool {
        self.block.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
    }

    pub fn preferred_timing(&self) -> Option<DetailedTiming> {
        DetailedTiming::decode(&self.block[54..72])
    }
}

/// Builds the base block from a preferred mode plus any additional supported modes.
#[derive(Clone, Debug)]
pub struct EdidBuilder {
    manufacturer: [u8; 3],
    serial: u32,
    week: u8,
    year: u16,
    monitor_name: String,
    h_size_cm: u8,
    preferred: EdidMode,
    modes: Vec<EdidMode>,
}

impl EdidBuilder {
    pub fn new(preferred: EdidMode) -> Self {
        Self {
            manufacturer: *b"VDS",
            serial: 1,
            week: 1,
            year: 2024,
            monitor_name: "VDisplay".to_string(),
            h_size_cm: 53,
            preferred,
            modes: Vec::new(),
        }
    }

    pub fn monitor_name(mut self, name: impl Into<String>) -> Self {
        self.monitor_name = name.into();
        self
    }

    pub fn serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    pub fn modes(mut self, modes: impl IntoIterator<Item = EdidMode>) -> Self {
        self.modes.extend(modes);
        self
    }

    pub fn build(&self) -> Result<Edid, EdidError> {
        let name = self.monitor_name.as_bytes();
        if name.is_empty()
            || name.len() > MAX_MONITOR_NAME_LEN
            || !name.iter().all(|b| (0x20..0x7F).contains(b))
        {
            return Err(EdidError::InvalidMonitorName);
        }

        let (h_size_cm, v_size_cm) = self.screen_size_cm();
        let preferred = reduced_blanking_timing(
            self.preferred,
            u16::from(h_size_cm) * 10,
            u16::from(v_size_cm) * 10,
        )
        .ok_or(EdidError::UnencodablePreferredMode(self.preferred))?;

        let mut e = [0u8; EDID_BLOCK_SIZE];
        e[0..8].copy_from_slice(&EDID_HEADER);
        e[8..10].copy_from_slice(&pack_manufacturer_id(self.manufacturer).to_be_bytes());
        e[10..12].copy_from_slice(&PRODUCT_CODE.to_le_bytes());
        e[12..16].copy_from_slice(&self.serial.to_le_bytes());
        e[16] = self.week;
        e[17] = self.year.saturating_sub(1990).min(255) as u8;
        e[18] = 1;
        e[19] = 4;

        // Digital input, 8 bits per primary, interface undefined.
        e[20] = 0x80 | 0x20;
        e[21] = h_size_cm;
        e[22] = v_size_cm;
        // Gamma 2.2.
        e[23] = 120;
        // sRGB default colour space, preferred timing is native, RGB 4:4:4.
        e[24] = 0x06;
        e[25..35].copy_from_slice(&SRGB_CHROMATICITY);

        let all_modes = self.all_modes();
        let (et1, et2) = established_timings(&all_modes);
        e[35] = et1;
        e[36] = et2;
        e[37] = 0;

        let mut slots = all_modes.iter().filter_map(|m| standard_timing(*m));
        for slot in 0..STANDARD_TIMING_SLOTS {
            let bytes = slots.next().unwrap_or(STANDARD_TIMING_UNUSED);
            e[38 + slot * 2..40 + slot * 2].copy_from_slice(&bytes);
        }

        e[54..72].copy_from_slice(&preferred.encode());
        e[72..90].copy_from_slice(&range_limits_descriptor(&all_modes, preferred));
        e[90..108].copy_from_slice(&monitor_name_descriptor(name));
        e[108..126].copy_from_slice(&display_descriptor(DESCRIPTOR_DUMMY));

        e[126] = 0;
        e[127] = checksum(&e[..127]);

        Ok(Edid { block: e })
    }

    fn all_modes(&self) -> Vec<EdidMode> {
        let mut modes = vec![self.preferred];
        for mode in &self.modes {
            if !modes.contains(mode) {
                modes.push(*mode);
            }
        }
        modes
    }

    fn screen_size_cm(&self) -> (u8, u8) {
        let h = u64::from(self.h_size_cm);
        let (width, height) = (
            u64::from(self.preferred.width),
            u64::from(self.preferred.height),
        );
        let v = if width == 0 {
            0
        } else {
            (h * height + width / 2) / width
        };
        (self.h_size_cm, v.clamp(1, 255) as u8)
    }
}

fn pack_manufacturer_id(id: [u8; 3]) -> u16 {
    id.iter().fold(0u16, |acc, &c| {
        (acc << 5) | u16::from(c.to_ascii_uppercase().saturating_sub(b'A') + 1) & 0x1F
    })
}

fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

fn established_timings(modes: &[EdidMode]) -> (u8, u8) {
    let has = |w, h| modes.contains(&EdidMode::new(w, h, 60));
    let mut et1 = 0u8;
    let mut et2 = 0u8;
    if has(640, 480) {
        et1 |= 1 << 5;
    }
    if has(800, 600) {
        et1 |= 1 << 0;
    }
    if has(1024, 768) {
        et2 |= 1 << 3;
    }
    (et1, et2)
}

/// Encode a mode as a 2-byte standard timing, if it fits the format.
fn standard_timing(mode: EdidMode) -> Option<[u8; 2]> {
    if mode.width % 8 != 0 || !(256..=2288).contains(&mode.width) {
        return None;
    }
    if !(60..=123).contains(&mode.refresh_hz) {
        return None;
    }
    let aspect_bits = match aspect_ratio(mode.width, mode.height)? {
        AspectRatio::R16x10 => 0b00,
        AspectRatio::R4x3 => 0b01,
        AspectRatio::R5x4 => 0b10,
        AspectRatio::R16x9 => 0b11,
    };
    Some([
        (mode.width / 8 - 31) as u8,
        (aspect_bits << 6) | (mode.refresh_hz - 60) as u8,
    ])
}

fn display_descriptor(tag: u8) -> [u8; DetailedTiming::SIZE] {
    let mut d = [0u8; DetailedTiming::SIZE];
    d[3] = tag;
    d
}

fn range_limits_descriptor(modes: &[EdidMode], preferred: DetailedTiming) -> [u8; 18] {
    let timings: Vec<DetailedTiming> = modes
        .iter()
        .filter_map(|m| reduced_blanking_timing(*m, 0, 0))
        .chain(std::iter::once(preferred))
        .collect();

    let min_v = modes.iter().map(|m| m.refresh_hz).min().unwrap_or(60);
    let max_v = modes.iter().map(|m| m.refresh_hz).max().unwrap_or(60);
    let min_h = timings.iter().map(|t| t.h_freq_khz()).min().unwrap_or(30);
    let max_h = timings.iter().map(|t| t.h_freq_khz()).max().unwrap_or(80);
    let max_clock_10mhz = timings
        .iter()
        .map(|t| t.pixel_clock_hz().div_ceil(10_000_000))
        .max()
        .unwrap_or(16);

    let mut d = display_descriptor(DESCRIPTOR_RANGE_LIMITS);
    d[5] = min_v.clamp(1, 255) as u8;
    d[6] = max_v.clamp(1, 255) as u8;
    d[7] = min_h.clamp(1, 255) as u8;
    d[8] = max_h.clamp(1, 255) as u8;
    d[9] = max_clock_10mhz.clamp(1, 255) as u8;
    // Range limits only; no secondary timing formula.
    d[10] = 0x01;
    d[11] = 0x0A;
    d[12..18].fill(0x20);
    d
}

fn monitor_name_descriptor(name: &[u8]) -> [u8; 18] {
    let mut d = display_descriptor(DESCRIPTOR_MONITOR_NAME);
    d[5..18].fill(0x20);
    d[5..5 + name.len()].copy_from_slice(name);
    if name.len() < MAX_MONITOR_NAME_LEN {
        d[5 + name.len()] = 0x0A;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manufacturer_id_packs_three_letters() {
        assert_eq!(pack_manufacturer_id(*b"VDS"), 0x5893);
        assert_eq!(pack_manufacturer_id(*b"AAA"), 0b0_00001_00001_00001);
    }

    #[test]
    fn standard_timing_encoding() {
        assert_eq!(standard_timing(EdidMode::new(1920, 1080, 60)), Some([0xD1, 0xC0]));
        assert_eq!(standard_timing(EdidMode::new(1024, 768, 75)), Some([0x61, 0x4F]));
        // Not a standard aspect ratio.
        assert_eq!(standard_timing(EdidMode::new(1366, 768, 60)), None);
        // Too wide for the 8-bit field.
        assert_eq!(standard_timing(EdidMode::new(3840, 2160, 60)), None);
    }

    #[test]
    fn checksum_balances_block() {
        let bytes = [1u8, 2, 3, 250];
        let c = checksum(&bytes);
        let total = bytes.iter().fold(c, |acc, &b| acc.wrapping_add(b));
        assert_eq!(total, 0);
    }
}
