//! `DxgkDdiDispatchIoRequest`: admission checks followed by one handler per request kind.

use std::sync::atomic::{AtomicU64, Ordering};

use vdisplay_ddi::{RequestKind, VideoRequest, VideoRequestPacket, VideoResponse};

use crate::config::AdapterConfig;
use crate::context::{AdapterContext, StartedAdapter};
use crate::error::{DdiError, Result};
use crate::source::VideoPresentSource;
use crate::vidpn::{path_for_source, validate_topology};

const DISPATCH_CALL: &str = "DxgkDdiDispatchIoRequest";

/// Per-adapter counters of dispatch outcomes.
#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    reached: [AtomicU64; RequestKind::COUNT],
    rejected: AtomicU64,
}

impl DispatchStats {
    fn record_reached(&self, kind: RequestKind) {
        self.reached[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            reached: std::array::from_fn(|i| self.reached[i].load(Ordering::Relaxed)),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of an adapter's dispatch counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    reached: [u64; RequestKind::COUNT],
    /// Calls turned away before any handler ran: adapter not started, bad source id or a
    /// malformed packet.
    pub rejected: u64,
}

impl DispatchSnapshot {
    /// How many calls of `kind` got as far as their handler.
    pub fn reached(&self, kind: RequestKind) -> u64 {
        self.reached[kind.index()]
    }

    pub fn total_reached(&self) -> u64 {
        self.reached.iter().sum()
    }
}

pub(crate) fn dispatch(
    ctx: &AdapterContext,
    source_id: u32,
    packet: &mut VideoRequestPacket,
) -> Result<()> {
    let Some(_guard) = ctx.gate.try_enter() else {
        ctx.stats.record_rejected();
        return Err(DdiError::WrongLifecycleState {
            call: DISPATCH_CALL,
            state: ctx.state(),
        });
    };
    let Some(adapter) = ctx.started()? else {
        ctx.stats.record_rejected();
        return Err(DdiError::WrongLifecycleState {
            call: DISPATCH_CALL,
            state: ctx.state(),
        });
    };
    let Some(source) = adapter.sources.get(source_id as usize) else {
        ctx.stats.record_rejected();
        return Err(DdiError::InvalidSource {
            source_id,
            count: adapter.source_count(),
        });
    };
    if packet.response.is_some() {
        ctx.stats.record_rejected();
        return Err(DdiError::InvalidParameter("response slot already filled"));
    }

    let kind = packet.request.kind();
    ctx.stats.record_reached(kind);
    tracing::trace!(adapter = %ctx.handle(), source_id, ?kind, "dispatch");

    let response = route(ctx.config(), &adapter, source, &packet.request)?;
    packet.response = Some(response);
    Ok(())
}

fn route(
    config: &AdapterConfig,
    adapter: &StartedAdapter,
    source: &VideoPresentSource,
    request: &VideoRequest,
) -> Result<VideoResponse> {
    match request {
        VideoRequest::QueryCurrentMode => {
            Ok(VideoResponse::CurrentMode(source.snapshot()?.current_mode))
        }
        VideoRequest::EnumSourceModes => Ok(VideoResponse::SourceModes(config.modes.clone())),
        VideoRequest::SetMode(mode) => {
            require_powered_on(adapter, RequestKind::SetMode)?;
            if !config.supports_mode(mode) {
                return Err(DdiError::UnsupportedMode(*mode));
            }
            source.set_mode(*mode)?;
            Ok(VideoResponse::ModeSet)
        }
        VideoRequest::IsSupportedVidPn(topology) => Ok(VideoResponse::VidPnSupported(
            validate_topology(topology, config).is_ok(),
        )),
        VideoRequest::CommitVidPn(topology) => {
            require_powered_on(adapter, RequestKind::CommitVidPn)?;
            validate_topology(topology, config)?;
            source.commit(path_for_source(topology, source.id()))?;
            Ok(VideoResponse::Committed)
        }
        VideoRequest::Present(submission) => {
            require_powered_on(adapter, RequestKind::Present)?;
            let frame = source.present(*submission)?;
            // No adapter lock is held here; the runtime may call straight back in.
            adapter
                .dxgk
                .callbacks
                .notify_present_complete(source.id(), submission.fence);
            Ok(VideoResponse::Presented { frame })
        }
        VideoRequest::SetPowerState(next) => {
            let previous = std::mem::replace(&mut *adapter.power.lock()?, *next);
            if previous != *next {
                tracing::debug!(from = ?previous, to = ?next, "adapter power state");
            }
            Ok(VideoResponse::PowerState(previous))
        }
        VideoRequest::QueryPowerState => Ok(VideoResponse::PowerState(adapter.power_state()?)),
        VideoRequest::QueryChildRelations => Ok(VideoResponse::ChildRelations(
            adapter.children.iter().map(|c| c.descriptor).collect(),
        )),
        VideoRequest::QueryChildStatus { child_uid } => {
            adapter.child(*child_uid)?;
            Ok(VideoResponse::ChildStatus { connected: true })
        }
        VideoRequest::QueryDeviceDescriptor {
            child_uid,
            offset,
            length,
        } => {
            let child = adapter.child(*child_uid)?;
            let bytes = descriptor_range(child.edid.as_bytes(), *offset, *length)?;
            Ok(VideoResponse::DeviceDescriptor(bytes.to_vec()))
        }
        VideoRequest::QueryPresentStats => {
            let state = source.snapshot()?;
            Ok(VideoResponse::PresentStats {
                frames: state.frames,
                last_fence: state.last_fence,
            })
        }
    }
}

fn require_powered_on(adapter: &StartedAdapter, kind: RequestKind) -> Result<()> {
    let state = adapter.power_state()?;
    if state.is_powered_on() {
        Ok(())
    } else {
        Err(DdiError::PoweredDown { kind, state })
    }
}

/// Clip `[offset, offset + length)` to the block.
fn descriptor_range(block: &[u8], offset: u32, length: u32) -> Result<&[u8]> {
    let start = offset as usize;
    if start >= block.len() {
        return Err(DdiError::InvalidParameter("descriptor offset past end of block"));
    }
    if length == 0 {
        return Err(DdiError::InvalidParameter("descriptor length is zero"));
    }
    let end = start.saturating_add(length as usize).min(block.len());
    Ok(&block[start..end])
}
