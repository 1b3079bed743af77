//! A minimal display runtime: registers the DDI table and walks one adapter through its whole
//! life, presenting from one thread per source while query threads hammer the dispatch path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use anyhow::{bail, ensure, Context, Result};
use serde::Serialize;
use vdisplay_ddi::{
    DriverInitializationData, DxgkStartInfo, DxgkrnlCallbacks, DxgkrnlInterface, MiniportHandle,
    NtStatus, PhysicalDeviceObject, PresentSubmission, VidPnTopology, VideoRequest,
    VideoRequestPacket, VideoResponse,
};
use vdisplay_miniport::Miniport;

/// Counts present completions per source.
#[derive(Debug, Default)]
pub struct CountingCallbacks {
    per_source: Mutex<Vec<u64>>,
    total: AtomicU64,
}

impl CountingCallbacks {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Completions seen so far, indexed by source id.
    pub fn per_source(&self) -> Vec<u64> {
        self.per_source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Marks one presenter as finished when dropped, whichever way its thread exits.
struct PresenterDone<'a>(&'a AtomicU64);

impl Drop for PresenterDone<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DxgkrnlCallbacks for CountingCallbacks {
    fn notify_present_complete(&self, source_id: u32, fence: u64) {
        tracing::trace!(source_id, fence, "present complete");
        let mut per_source = self
            .per_source
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let idx = source_id as usize;
        if per_source.len() <= idx {
            per_source.resize(idx + 1, 0);
        }
        per_source[idx] += 1;
        self.total.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub call: &'static str,
    pub status: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AdapterReport {
    pub handle: u64,
    pub sources: u32,
    pub children: u32,
    pub frames_presented: u64,
    /// Frames presented times the size of one surface in the committed mode.
    pub bytes_scanned_out: u64,
    pub queries_answered: u64,
    pub calls: Vec<CallRecord>,
}

pub struct Session {
    miniport: Arc<Miniport>,
    ddi: DriverInitializationData<Miniport>,
    callbacks: Arc<CountingCallbacks>,
}

impl Session {
    pub fn new(miniport: Arc<Miniport>, callbacks: Arc<CountingCallbacks>) -> Self {
        Self {
            miniport,
            ddi: Miniport::initialization_data(),
            callbacks,
        }
    }

    pub fn callbacks(&self) -> &CountingCallbacks {
        &self.callbacks
    }

    /// Run Add → Start → concurrent dispatch → Stop → Remove for one physical device.
    pub fn run_adapter(
        &self,
        pdo: PhysicalDeviceObject,
        frames: u64,
        query_threads: usize,
    ) -> Result<AdapterReport> {
        let mut report = AdapterReport::default();

        let mut handle = None;
        let status = (self.ddi.add_device)(&self.miniport, pdo, &mut handle);
        record(&mut report, "DxgkDdiAddDevice", status)?;
        let handle = handle.context("AddDevice succeeded without returning a handle")?;
        report.handle = handle.get();

        let dxgk = DxgkrnlInterface::new(self.callbacks.clone());
        let status = (self.ddi.start_device)(
            &self.miniport,
            handle,
            &DxgkStartInfo::default(),
            &dxgk,
            &mut report.sources,
            &mut report.children,
        );
        record(&mut report, "DxgkDdiStartDevice", status)?;
        tracing::info!(
            adapter = %handle,
            sources = report.sources,
            children = report.children,
            "adapter started"
        );

        let preferred = self
            .miniport
            .config()
            .preferred_mode()
            .context("config has no modes")?;
        for source_id in 0..report.sources {
            let target_id = source_id % report.children;
            let status = self.dispatch(
                handle,
                source_id,
                VideoRequest::CommitVidPn(VidPnTopology::single(source_id, target_id, preferred)),
            )?;
            record(&mut report, "CommitVidPn", status)?;
        }

        let (presented, queried) = self.drive(handle, report.sources, frames, query_threads)?;
        report.frames_presented = presented;
        report.bytes_scanned_out = preferred
            .surface_bytes()
            .and_then(|bytes| bytes.checked_mul(presented))
            .context("scanout byte count overflows")?;
        report.queries_answered = queried;

        let status = (self.ddi.stop_device)(&self.miniport, handle);
        record(&mut report, "DxgkDdiStopDevice", status)?;
        let status = (self.ddi.remove_device)(&self.miniport, handle);
        record(&mut report, "DxgkDdiRemoveDevice", status)?;
        Ok(report)
    }

    fn dispatch(
        &self,
        handle: MiniportHandle,
        source_id: u32,
        request: VideoRequest,
    ) -> Result<NtStatus> {
        let mut packet = VideoRequestPacket::new(request);
        let status = (self.ddi.dispatch_io_request)(&self.miniport, handle, source_id, &mut packet);
        if status.is_success() {
            ensure!(packet.response.is_some(), "dispatch succeeded without a response");
        }
        Ok(status)
    }

    /// Present `frames` frames on every source in parallel while `query_threads` threads poll
    /// present statistics. Returns (frames presented, queries answered).
    fn drive(
        &self,
        handle: MiniportHandle,
        sources: u32,
        frames: u64,
        query_threads: usize,
    ) -> Result<(u64, u64)> {
        let preferred = self
            .miniport
            .config()
            .preferred_mode()
            .context("config has no modes")?;
        let go = Barrier::new(sources as usize + query_threads);
        let presenting = AtomicU64::new(u64::from(sources));

        thread::scope(|scope| {
            let presenters: Vec<_> = (0..sources)
                .map(|source_id| {
                    let (go, presenting) = (&go, &presenting);
                    scope.spawn(move || -> Result<u64> {
                        let _done = PresenterDone(presenting);
                        go.wait();
                        let mut presented = 0;
                        for fence in 1..=frames {
                            let submission = PresentSubmission {
                                width: preferred.width,
                                height: preferred.height,
                                fence,
                            };
                            let status =
                                self.dispatch(handle, source_id, VideoRequest::Present(submission))?;
                            ensure!(
                                status.is_success(),
                                "Present on source {source_id} returned {status}"
                            );
                            presented += 1;
                        }
                        Ok(presented)
                    })
                })
                .collect();

            let pollers: Vec<_> = (0..query_threads)
                .map(|i| {
                    let (go, presenting) = (&go, &presenting);
                    scope.spawn(move || -> Result<u64> {
                        go.wait();
                        let source_id = i as u32 % sources;
                        let mut answered = 0;
                        while presenting.load(Ordering::SeqCst) > 0 {
                            let mut packet =
                                VideoRequestPacket::new(VideoRequest::QueryPresentStats);
                            let status = (self.ddi.dispatch_io_request)(
                                &self.miniport,
                                handle,
                                source_id,
                                &mut packet,
                            );
                            ensure!(status.is_success(), "QueryPresentStats returned {status}");
                            ensure!(
                                matches!(packet.response, Some(VideoResponse::PresentStats { .. })),
                                "QueryPresentStats returned {:?}",
                                packet.response
                            );
                            answered += 1;
                        }
                        Ok(answered)
                    })
                })
                .collect();

            let mut presented = 0;
            for worker in presenters {
                presented += join(worker)?;
            }
            let mut answered = 0;
            for worker in pollers {
                answered += join(worker)?;
            }
            Ok((presented, answered))
        })
    }
}

fn join<T>(worker: thread::ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    match worker.join() {
        Ok(result) => result,
        Err(_) => bail!("worker thread panicked"),
    }
}

fn record(report: &mut AdapterReport, call: &'static str, status: NtStatus) -> Result<()> {
    tracing::debug!(call, %status, "ddi call");
    report.calls.push(CallRecord {
        call,
        status: status.to_string(),
    });
    ensure!(status.is_success(), "{call} returned {status}");
    Ok(())
}
