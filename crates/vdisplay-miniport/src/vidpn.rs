//! VidPN topology rules for this adapter.
//!
//! A topology is acceptable when every path names an existing source and target, uses a mode from
//! the source mode set, and no source or target appears in more than one path (no clone mode).

use vdisplay_ddi::{DisplayMode, VidPnPath, VidPnTopology};

use crate::config::AdapterConfig;
use crate::error::DdiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopologyFault {
    SourceOutOfRange(u32),
    TargetOutOfRange(u32),
    UnsupportedMode(DisplayMode),
    SourceUsedTwice(u32),
    TargetUsedTwice(u32),
}

impl From<TopologyFault> for DdiError {
    fn from(fault: TopologyFault) -> Self {
        match fault {
            TopologyFault::UnsupportedMode(mode) => DdiError::UnsupportedMode(mode),
            TopologyFault::SourceOutOfRange(_) => {
                DdiError::InvalidParameter("VidPN path references an unknown source")
            }
            TopologyFault::TargetOutOfRange(_) => {
                DdiError::InvalidParameter("VidPN path references an unknown target")
            }
            TopologyFault::SourceUsedTwice(_) => {
                DdiError::InvalidParameter("VidPN source appears in more than one path")
            }
            TopologyFault::TargetUsedTwice(_) => {
                DdiError::InvalidParameter("VidPN target appears in more than one path")
            }
        }
    }
}

pub(crate) fn validate_topology(
    topology: &VidPnTopology,
    config: &AdapterConfig,
) -> Result<(), TopologyFault> {
    for (i, path) in topology.paths.iter().enumerate() {
        if path.source_id >= config.video_present_sources {
            return Err(TopologyFault::SourceOutOfRange(path.source_id));
        }
        if path.target_id >= config.children {
            return Err(TopologyFault::TargetOutOfRange(path.target_id));
        }
        if !config.supports_mode(&path.source_mode) {
            return Err(TopologyFault::UnsupportedMode(path.source_mode));
        }
        let earlier = &topology.paths[..i];
        if earlier.iter().any(|p| p.source_id == path.source_id) {
            return Err(TopologyFault::SourceUsedTwice(path.source_id));
        }
        if earlier.iter().any(|p| p.target_id == path.target_id) {
            return Err(TopologyFault::TargetUsedTwice(path.target_id));
        }
    }
    Ok(())
}

/// The path driving `source_id`, if the (already validated) topology has one.
pub(crate) fn path_for_source(topology: &VidPnTopology, source_id: u32) -> Option<VidPnPath> {
    topology.paths_for_source(source_id).next().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> AdapterConfig {
        AdapterConfig {
            video_present_sources: 2,
            children: 2,
            ..AdapterConfig::default()
        }
    }

    #[test]
    fn empty_topology_is_valid() {
        assert_eq!(validate_topology(&VidPnTopology::empty(), &two_by_two()), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_and_duplicate_paths() {
        let config = two_by_two();
        let mode = DisplayMode::new(1280, 720, 60);
        let path = |source_id, target_id| VidPnPath {
            source_id,
            target_id,
            source_mode: mode,
        };

        let check = |paths: Vec<VidPnPath>| validate_topology(&VidPnTopology { paths }, &config);

        assert_eq!(check(vec![path(0, 0), path(1, 1)]), Ok(()));
        assert_eq!(check(vec![path(2, 0)]), Err(TopologyFault::SourceOutOfRange(2)));
        assert_eq!(check(vec![path(0, 5)]), Err(TopologyFault::TargetOutOfRange(5)));
        assert_eq!(check(vec![path(0, 0), path(0, 1)]), Err(TopologyFault::SourceUsedTwice(0)));
        assert_eq!(check(vec![path(0, 1), path(1, 1)]), Err(TopologyFault::TargetUsedTwice(1)));
    }

    #[test]
    fn rejects_modes_outside_the_mode_set() {
        let mode = DisplayMode::new(640, 480, 60);
        let fault = validate_topology(&VidPnTopology::single(0, 0, mode), &two_by_two());
        assert_eq!(fault, Err(TopologyFault::UnsupportedMode(mode)));
        assert!(matches!(
            DdiError::from(TopologyFault::UnsupportedMode(mode)),
            DdiError::UnsupportedMode(_)
        ));
    }

    #[test]
    fn path_lookup_is_per_source() {
        let mode = DisplayMode::new(1024, 768, 60);
        let topology = VidPnTopology::single(1, 0, mode);
        assert_eq!(path_for_source(&topology, 0), None);
        assert_eq!(path_for_source(&topology, 1).map(|p| p.target_id), Some(0));
    }
}
