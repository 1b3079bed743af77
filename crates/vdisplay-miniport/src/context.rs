//! Per-adapter state block and the lifecycle transitions that mutate it.
//!
//! An [`AdapterContext`] lives from `AddDevice` to `RemoveDevice`. Everything the adapter binds at
//! start (runtime interface, sources, child descriptors, power state) hangs off a separate
//! [`StartedAdapter`] that only exists while the state is `Started`; dispatch reaches it through
//! the [`IoGate`], which is what lets Stop tear it down without racing a dispatch.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use vdisplay_ddi::{
    ChildDescriptor, ChildDeviceType, DevicePowerState, DxgkStartInfo, DxgkrnlInterface,
    MiniportHandle, OutputTechnology, PhysicalDeviceObject, DXGKDDI_INTERFACE_VERSION_VISTA,
};
use vdisplay_edid::Edid;

use crate::config::AdapterConfig;
use crate::dispatch::DispatchStats;
use crate::error::{DdiError, Result};
use crate::gate::IoGate;
use crate::lifecycle::{LifecycleState, StateCell};
use crate::pool::{PoolAllocation, PoolAllocator, PoolError, SOURCE_TAG};
use crate::source::{SourceState, VideoPresentSource};

pub(crate) const SOURCE_BLOCK_BYTES: usize = std::mem::size_of::<SourceState>();

#[derive(Debug)]
pub(crate) struct Child {
    pub descriptor: ChildDescriptor,
    pub edid: Edid,
}

/// State bound by `StartDevice` and dropped by `StopDevice`.
#[derive(Debug)]
pub(crate) struct StartedAdapter {
    pub dxgk: DxgkrnlInterface,
    pub sources: Vec<VideoPresentSource>,
    pub children: Vec<Child>,
    pub power: Mutex<DevicePowerState>,
}

impl StartedAdapter {
    pub(crate) fn source_count(&self) -> u32 {
        self.sources.len() as u32
    }

    pub(crate) fn child(&self, child_uid: u32) -> Result<&Child> {
        self.children
            .iter()
            .find(|c| c.descriptor.child_uid == child_uid)
            .ok_or(DdiError::InvalidChild {
                child_uid,
                count: self.children.len() as u32,
            })
    }

    pub(crate) fn power_state(&self) -> Result<DevicePowerState> {
        Ok(*self.power.lock()?)
    }

    /// Release every source block, even if some fail; the first failure is returned.
    fn release_sources(&self) -> std::result::Result<(), PoolError> {
        let mut first_err = None;
        for source in &self.sources {
            if let Err(err) = source.release_storage() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

pub(crate) struct AdapterContext {
    handle: MiniportHandle,
    pdo: PhysicalDeviceObject,
    config: Arc<AdapterConfig>,
    pool: Arc<dyn PoolAllocator>,
    block: Mutex<Option<PoolAllocation>>,
    state: StateCell,
    // Held for the whole of every lifecycle call on this adapter.
    transition: Mutex<()>,
    started: RwLock<Option<Arc<StartedAdapter>>>,
    pub(crate) gate: IoGate,
    pub(crate) stats: DispatchStats,
}

impl std::fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("handle", &self.handle)
            .field("pdo", &self.pdo)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl AdapterContext {
    pub(crate) fn new(
        handle: MiniportHandle,
        pdo: PhysicalDeviceObject,
        config: Arc<AdapterConfig>,
        pool: Arc<dyn PoolAllocator>,
        block: PoolAllocation,
    ) -> Self {
        Self {
            handle,
            pdo,
            config,
            pool,
            block: Mutex::new(Some(block)),
            state: StateCell::new(LifecycleState::Added),
            transition: Mutex::new(()),
            started: RwLock::new(None),
            gate: IoGate::new(),
            stats: DispatchStats::default(),
        }
    }

    pub(crate) fn handle(&self) -> MiniportHandle {
        self.handle
    }

    pub(crate) fn pdo(&self) -> PhysicalDeviceObject {
        self.pdo
    }

    pub(crate) fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// The started half of the adapter, if any. Callers must hold an [`IoGuard`] or the
    /// transition lock for the result to be meaningful.
    ///
    /// [`IoGuard`]: crate::gate::IoGuard
    pub(crate) fn started(&self) -> Result<Option<Arc<StartedAdapter>>> {
        Ok(self.started.read()?.clone())
    }

    fn transition_to(&self, next: LifecycleState) {
        let prev = self.state.set(next);
        tracing::debug!(adapter = %self.handle, from = ?prev, to = ?next, "lifecycle transition");
    }

    /// `DxgkDdiStartDevice`. Returns `(sources, children)` on success.
    pub(crate) fn start(
        &self,
        start_info: &DxgkStartInfo,
        dxgk: &DxgkrnlInterface,
    ) -> Result<(u32, u32)> {
        let _transition = self.transition.lock()?;
        let state = self.state.get();
        if !state.can_start() {
            return Err(DdiError::WrongLifecycleState {
                call: "DxgkDdiStartDevice",
                state,
            });
        }
        if dxgk.version < DXGKDDI_INTERFACE_VERSION_VISTA {
            return Err(DdiError::InvalidParameter("DXGKRNL interface version too old"));
        }
        if start_info.required_dma_queue_entry == 0 {
            return Err(DdiError::InvalidParameter("RequiredDmaQueueEntry is zero"));
        }

        let sources = (0..self.config.video_present_sources)
            .map(|id| {
                PoolAllocation::new(&self.pool, SOURCE_TAG, SOURCE_BLOCK_BYTES)
                    .map(|storage| VideoPresentSource::new(id, storage))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DdiError::OutOfResources)?;

        let children = (0..self.config.children)
            .map(|child_uid| -> Result<Child> {
                Ok(Child {
                    descriptor: ChildDescriptor {
                        child_uid,
                        device_type: ChildDeviceType::VideoOutput,
                        technology: OutputTechnology::Virtual,
                        hpd_aware: true,
                    },
                    edid: self.config.edid_builder(child_uid).build()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let counts = (sources.len() as u32, children.len() as u32);
        let started = StartedAdapter {
            dxgk: dxgk.clone(),
            sources,
            children,
            power: Mutex::new(DevicePowerState::D0),
        };
        *self.started.write()? = Some(Arc::new(started));
        self.transition_to(LifecycleState::Started);
        self.gate.open();
        Ok(counts)
    }

    /// `DxgkDdiStopDevice`: quiesce dispatch, then release everything bound at start.
    pub(crate) fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock()?;
        let state = self.state.get();
        if !state.can_stop() {
            return Err(DdiError::WrongLifecycleState {
                call: "DxgkDdiStopDevice",
                state,
            });
        }

        let timeout = self.config.stop_drain_timeout();
        if let Err(busy) = self.gate.close_and_drain(timeout) {
            tracing::debug!(
                adapter = %self.handle,
                in_flight = busy.in_flight,
                "stop deferred, dispatches still in flight"
            );
            return Err(DdiError::DrainTimeout {
                timeout_ms: self.config.stop_drain_timeout_ms,
            });
        }

        // The gate is closed and empty, so nothing else can be holding the started state now.
        let started = self
            .started
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.transition_to(LifecycleState::Stopped);

        match started {
            Some(started) => started.release_sources().map_err(DdiError::ReleaseFailed),
            None => Ok(()),
        }
    }

    /// Validate that `RemoveDevice` is legal and mark the context dead. A context that is
    /// already being removed is left alone.
    pub(crate) fn begin_remove(&self) -> Result<()> {
        let _transition = self.transition.lock()?;
        let state = self.state.get();
        if state == LifecycleState::Removed {
            return Ok(());
        }
        if !state.can_remove() {
            return Err(DdiError::WrongLifecycleState {
                call: "DxgkDdiRemoveDevice",
                state,
            });
        }
        self.transition_to(LifecycleState::Removed);
        Ok(())
    }

    /// Return the context block to the pool. Safe to call more than once.
    pub(crate) fn release_block(&self) -> std::result::Result<(), PoolError> {
        let block = self
            .block
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match block {
            Some(block) => block.release(),
            None => Ok(()),
        }
    }
}
