//! VidPN topology as handed to the adapter for validation and commit.
//!
//! The runtime owns the full VidPN object model; the adapter only ever sees the pieces it has to
//! rule on: which source feeds which target, and in what source mode.

use crate::mode::DisplayMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VidPnPath {
    pub source_id: u32,
    /// Child uid of the target the source is routed to.
    pub target_id: u32,
    pub source_mode: DisplayMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VidPnTopology {
    pub paths: Vec<VidPnPath>,
}

impl VidPnTopology {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(source_id: u32, target_id: u32, source_mode: DisplayMode) -> Self {
        Self {
            paths: vec![VidPnPath {
                source_id,
                target_id,
                source_mode,
            }],
        }
    }

    pub fn paths_for_source(&self, source_id: u32) -> impl Iterator<Item = &VidPnPath> {
        self.paths.iter().filter(move |p| p.source_id == source_id)
    }
}
