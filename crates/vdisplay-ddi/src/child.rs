/// Kind of child device enumerated under the adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChildDeviceType {
    VideoOutput,
}

/// Physical connector technology reported for a video output child.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputTechnology {
    /// A connector with no physical counterpart.
    Virtual,
}

/// One entry of the child relations array (`DXGK_CHILD_DESCRIPTOR`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChildDescriptor {
    pub child_uid: u32,
    pub device_type: ChildDeviceType,
    pub technology: OutputTechnology,
    /// Hot-plug detection: a virtual connector is always "plugged".
    pub hpd_aware: bool,
}
