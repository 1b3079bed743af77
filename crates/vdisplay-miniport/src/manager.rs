//! Adapter Context Manager: the handle → context registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use vdisplay_ddi::{MiniportHandle, PhysicalDeviceObject};

use crate::config::AdapterConfig;
use crate::context::AdapterContext;
use crate::error::{DdiError, Result};
use crate::lifecycle::LifecycleState;
use crate::pool::{PoolAllocation, PoolAllocator, PoolError, CONTEXT_TAG};

pub(crate) const CONTEXT_BLOCK_BYTES: usize = std::mem::size_of::<AdapterContext>();

pub(crate) struct AdapterManager {
    config: Arc<AdapterConfig>,
    pool: Arc<dyn PoolAllocator>,
    adapters: RwLock<HashMap<MiniportHandle, Arc<AdapterContext>>>,
    next_handle: AtomicU64,
}

impl AdapterManager {
    pub(crate) fn new(config: AdapterConfig, pool: Arc<dyn PoolAllocator>) -> Self {
        Self {
            config: Arc::new(config),
            pool,
            adapters: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub(crate) fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Allocate and register a context for `pdo`.
    ///
    /// On failure nothing stays allocated and no handle is consumed.
    pub(crate) fn create(&self, pdo: PhysicalDeviceObject) -> Result<Arc<AdapterContext>> {
        let mut adapters = self.adapters.write()?;
        if adapters.values().any(|ctx| ctx.pdo() == pdo) {
            return Err(DdiError::WrongLifecycleState {
                call: "DxgkDdiAddDevice",
                state: LifecycleState::Added,
            });
        }
        adapters
            .try_reserve(1)
            .map_err(|_| DdiError::RegistryExhausted)?;

        let block = PoolAllocation::new(&self.pool, CONTEXT_TAG, CONTEXT_BLOCK_BYTES)
            .map_err(DdiError::OutOfResources)?;
        let handle = MiniportHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
            .ok_or(DdiError::RegistryExhausted)?;

        let ctx = Arc::new(AdapterContext::new(
            handle,
            pdo,
            Arc::clone(&self.config),
            Arc::clone(&self.pool),
            block,
        ));
        adapters.insert(handle, Arc::clone(&ctx));
        tracing::debug!(adapter = %handle, pdo = ?pdo, "adapter context created");
        Ok(ctx)
    }

    pub(crate) fn get(&self, handle: MiniportHandle) -> Option<Arc<AdapterContext>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    /// Unregister `handle` and return its context block. Unknown handles are a no-op.
    pub(crate) fn destroy(&self, handle: MiniportHandle) -> std::result::Result<(), PoolError> {
        let removed = self
            .adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        match removed {
            Some(ctx) => {
                tracing::debug!(adapter = %handle, "adapter context destroyed");
                ctx.release_block()
            }
            None => Ok(()),
        }
    }

    /// Lifecycle state of `handle`, including handles that are no longer (or never were) live.
    pub(crate) fn state(&self, handle: MiniportHandle) -> LifecycleState {
        match self.get(handle) {
            Some(ctx) => ctx.state(),
            None if handle.get() < self.next_handle.load(Ordering::Relaxed) => {
                LifecycleState::Removed
            }
            None => LifecycleState::Uninitialized,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
