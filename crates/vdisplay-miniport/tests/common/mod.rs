//! Shared helpers for `vdisplay-miniport` integration tests: a stand-in for the display runtime
//! that records callbacks and counts pool blocks.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, OnceLock, Weak};

use vdisplay_ddi::{
    DxgkStartInfo, DxgkrnlCallbacks, DxgkrnlInterface, MiniportHandle, NtStatus,
    PhysicalDeviceObject, VideoRequest, VideoRequestPacket, VideoResponse,
};
use vdisplay_miniport::{AdapterConfig, Miniport, TrackingPool};

/// Runtime callbacks that record every notification.
///
/// When armed with [`RecordingCallbacks::reenter_on_present`], each present-complete
/// notification immediately issues a `QueryPresentStats` dispatch back into the adapter. If the
/// adapter held one of its own locks across the callback this would deadlock.
#[derive(Default)]
pub struct RecordingCallbacks {
    presents: Mutex<Vec<(u32, u64)>>,
    reenter: OnceLock<(Weak<Miniport>, MiniportHandle)>,
    reentered: Mutex<Vec<(NtStatus, Option<VideoResponse>)>>,
}

impl RecordingCallbacks {
    pub fn reenter_on_present(&self, miniport: &Arc<Miniport>, handle: MiniportHandle) {
        let _ = self.reenter.set((Arc::downgrade(miniport), handle));
    }

    pub fn presents(&self) -> Vec<(u32, u64)> {
        self.presents.lock().unwrap().clone()
    }

    pub fn reentered(&self) -> Vec<(NtStatus, Option<VideoResponse>)> {
        self.reentered.lock().unwrap().clone()
    }
}

impl DxgkrnlCallbacks for RecordingCallbacks {
    fn notify_present_complete(&self, source_id: u32, fence: u64) {
        self.presents.lock().unwrap().push((source_id, fence));

        let Some((miniport, handle)) = self.reenter.get() else {
            return;
        };
        let Some(miniport) = miniport.upgrade() else {
            return;
        };
        let mut packet = VideoRequestPacket::new(VideoRequest::QueryPresentStats);
        let status = miniport.dispatch_io_request(*handle, source_id, &mut packet);
        self.reentered.lock().unwrap().push((status, packet.response));
    }
}

pub struct TestRuntime {
    pub miniport: Arc<Miniport>,
    pub pool: Arc<TrackingPool>,
    pub callbacks: Arc<RecordingCallbacks>,
}

impl TestRuntime {
    pub fn new(config: AdapterConfig) -> Self {
        let pool = Arc::new(TrackingPool::new());
        let miniport = Arc::new(Miniport::new(config, pool.clone()).unwrap());
        Self {
            miniport,
            pool,
            callbacks: Arc::new(RecordingCallbacks::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AdapterConfig::default())
    }

    pub fn dxgk(&self) -> DxgkrnlInterface {
        DxgkrnlInterface::new(self.callbacks.clone())
    }

    pub fn add(&self, pdo: u64) -> MiniportHandle {
        let mut handle = None;
        let status = self
            .miniport
            .add_device(PhysicalDeviceObject(pdo), &mut handle);
        assert_eq!(status, NtStatus::Success);
        handle.expect("AddDevice succeeded without a handle")
    }

    /// Start `handle`, returning the status and the reported (sources, children) counts.
    pub fn start(&self, handle: MiniportHandle) -> (NtStatus, u32, u32) {
        let (mut sources, mut children) = (0, 0);
        let status = self.miniport.start_device(
            handle,
            &DxgkStartInfo::default(),
            &self.dxgk(),
            &mut sources,
            &mut children,
        );
        (status, sources, children)
    }

    /// Add and start an adapter, asserting both succeed.
    pub fn started(&self, pdo: u64) -> MiniportHandle {
        let handle = self.add(pdo);
        assert_eq!(self.start(handle).0, NtStatus::Success);
        handle
    }

    pub fn dispatch(
        &self,
        handle: MiniportHandle,
        source_id: u32,
        request: VideoRequest,
    ) -> (NtStatus, Option<VideoResponse>) {
        let mut packet = VideoRequestPacket::new(request);
        let status = self
            .miniport
            .dispatch_io_request(handle, source_id, &mut packet);
        (status, packet.response)
    }
}
