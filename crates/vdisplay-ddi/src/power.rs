/// Device power states (`DEVICE_POWER_STATE`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DevicePowerState {
    #[default]
    D0 = 1,
    D1 = 2,
    D2 = 3,
    D3 = 4,
}

impl DevicePowerState {
    /// Only D0 allows scanout, mode changes and presentation.
    pub fn is_powered_on(self) -> bool {
        self == Self::D0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_d0_is_powered_on() {
        assert!(DevicePowerState::D0.is_powered_on());
        for state in [DevicePowerState::D1, DevicePowerState::D2, DevicePowerState::D3] {
            assert!(!state.is_powered_on(), "{state:?}");
        }
    }
}
