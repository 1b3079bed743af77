mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::TestRuntime;
use vdisplay_ddi::{
    DisplayMode, DxgkStartInfo, DxgkrnlCallbacks, DxgkrnlInterface, MiniportHandle, NtStatus,
    PhysicalDeviceObject, PresentSubmission, VidPnTopology, VideoRequest, VideoRequestPacket,
    VideoResponse,
};
use vdisplay_miniport::{AdapterConfig, LifecycleState, Miniport, SOURCE_TAG};

const MODE: DisplayMode = DisplayMode::new(1920, 1080, 60);

/// Flags any present that completes after Stop has returned.
#[derive(Default)]
struct StopWatch {
    stopped: AtomicBool,
    completed: AtomicUsize,
    late: AtomicUsize,
}

impl DxgkrnlCallbacks for StopWatch {
    fn notify_present_complete(&self, _source_id: u32, _fence: u64) {
        // Widen the in-flight window so Stop really has something to drain.
        thread::yield_now();
        if self.stopped.load(Ordering::SeqCst) {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Parks the first present inside the callback until the test lets it go.
struct Parked {
    entered: Barrier,
    release: Barrier,
    parked: AtomicBool,
}

impl DxgkrnlCallbacks for Parked {
    fn notify_present_complete(&self, _source_id: u32, _fence: u64) {
        if !self.parked.swap(true, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
    }
}

fn start_with(
    miniport: &Miniport,
    handle: MiniportHandle,
    callbacks: Arc<dyn DxgkrnlCallbacks>,
) {
    let (mut sources, mut children) = (0, 0);
    let status = miniport.start_device(
        handle,
        &DxgkStartInfo::default(),
        &DxgkrnlInterface::new(callbacks),
        &mut sources,
        &mut children,
    );
    assert_eq!(status, NtStatus::Success);
}

fn commit(miniport: &Miniport, handle: MiniportHandle, source_id: u32) {
    let mut packet = VideoRequestPacket::new(VideoRequest::CommitVidPn(VidPnTopology::single(
        source_id, source_id, MODE,
    )));
    assert_eq!(
        miniport.dispatch_io_request(handle, source_id, &mut packet),
        NtStatus::Success
    );
}

fn present(miniport: &Miniport, handle: MiniportHandle, source_id: u32, fence: u64) -> NtStatus {
    let mut packet = VideoRequestPacket::new(VideoRequest::Present(PresentSubmission {
        width: MODE.width,
        height: MODE.height,
        fence,
    }));
    miniport.dispatch_io_request(handle, source_id, &mut packet)
}

#[test]
fn dispatch_racing_stop_never_sees_a_torn_down_adapter() {
    const SOURCES: u32 = 4;
    const QUERY_THREADS: usize = 4;

    let rt = TestRuntime::new(AdapterConfig {
        video_present_sources: SOURCES,
        children: SOURCES,
        stop_drain_timeout_ms: 10_000,
        ..AdapterConfig::default()
    });
    let handle = rt.add(1);
    let watch = Arc::new(StopWatch::default());
    start_with(&rt.miniport, handle, watch.clone());
    for source_id in 0..SOURCES {
        commit(&rt.miniport, handle, source_id);
    }

    let go = Arc::new(Barrier::new(SOURCES as usize + QUERY_THREADS + 1));
    let mut workers = Vec::new();

    // One presenter per source keeps fences strictly increasing per source.
    for source_id in 0..SOURCES {
        let miniport = rt.miniport.clone();
        let watch = watch.clone();
        let go = go.clone();
        workers.push(thread::spawn(move || {
            go.wait();
            let mut successes = 0u64;
            for fence in 1.. {
                let began_after_stop = watch.stopped.load(Ordering::SeqCst);
                match present(&miniport, handle, source_id, fence) {
                    NtStatus::Success => {
                        assert!(!began_after_stop, "dispatch admitted after Stop returned");
                        successes += 1;
                    }
                    NtStatus::InvalidDeviceState => break,
                    other => panic!("unexpected status {other}"),
                }
            }
            successes
        }));
    }

    for i in 0..QUERY_THREADS {
        let miniport = rt.miniport.clone();
        let watch = watch.clone();
        let go = go.clone();
        workers.push(thread::spawn(move || {
            go.wait();
            let source_id = i as u32 % SOURCES;
            let mut successes = 0u64;
            loop {
                let began_after_stop = watch.stopped.load(Ordering::SeqCst);
                let mut packet = VideoRequestPacket::new(VideoRequest::QueryPresentStats);
                match miniport.dispatch_io_request(handle, source_id, &mut packet) {
                    NtStatus::Success => {
                        assert!(!began_after_stop, "dispatch admitted after Stop returned");
                        assert!(matches!(
                            packet.response,
                            Some(VideoResponse::PresentStats { .. })
                        ));
                        successes += 1;
                    }
                    NtStatus::InvalidDeviceState => {
                        assert_eq!(packet.response, None);
                        break;
                    }
                    other => panic!("unexpected status {other}"),
                }
            }
            successes
        }));
    }

    go.wait();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(rt.miniport.stop_device(handle), NtStatus::Success);
    watch.stopped.store(true, Ordering::SeqCst);

    let successes: Vec<u64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let presented: u64 = successes[..SOURCES as usize].iter().sum();

    assert_eq!(watch.late.load(Ordering::SeqCst), 0);
    assert_eq!(watch.completed.load(Ordering::SeqCst) as u64, presented);
    assert_eq!(rt.miniport.state(handle), LifecycleState::Stopped);
    assert_eq!(rt.pool.outstanding_for(SOURCE_TAG), 0);
}

#[test]
fn stop_defers_while_a_dispatch_is_stuck() {
    let rt = TestRuntime::new(AdapterConfig {
        video_present_sources: 2,
        children: 2,
        stop_drain_timeout_ms: 25,
        ..AdapterConfig::default()
    });
    let handle = rt.add(1);
    let parked = Arc::new(Parked {
        entered: Barrier::new(2),
        release: Barrier::new(2),
        parked: AtomicBool::new(false),
    });
    start_with(&rt.miniport, handle, parked.clone());
    commit(&rt.miniport, handle, 0);
    commit(&rt.miniport, handle, 1);

    let stuck = {
        let miniport = rt.miniport.clone();
        thread::spawn(move || present(&miniport, handle, 0, 1))
    };
    parked.entered.wait();

    assert_eq!(rt.miniport.stop_device(handle), NtStatus::DeviceBusy);
    assert_eq!(rt.miniport.state(handle), LifecycleState::Started);

    // The adapter is still fully usable, including the source the stuck call is on.
    assert_eq!(present(&rt.miniport, handle, 1, 1), NtStatus::Success);
    let mut packet = VideoRequestPacket::new(VideoRequest::QueryPresentStats);
    assert_eq!(
        rt.miniport.dispatch_io_request(handle, 0, &mut packet),
        NtStatus::Success
    );
    assert_eq!(
        packet.response,
        Some(VideoResponse::PresentStats {
            frames: 1,
            last_fence: Some(1)
        })
    );

    parked.release.wait();
    assert_eq!(stuck.join().unwrap(), NtStatus::Success);

    assert_eq!(rt.miniport.stop_device(handle), NtStatus::Success);
    assert_eq!(rt.miniport.remove_device(handle), NtStatus::Success);
    assert_eq!(rt.pool.outstanding(), 0);
}

#[test]
fn sources_present_independently_in_parallel() {
    const SOURCES: u32 = 4;
    const FRAMES: u64 = 200;

    let rt = TestRuntime::new(AdapterConfig {
        video_present_sources: SOURCES,
        children: SOURCES,
        ..AdapterConfig::default()
    });
    let handle = rt.started(1);
    for source_id in 0..SOURCES {
        commit(&rt.miniport, handle, source_id);
    }

    let go = Arc::new(Barrier::new(SOURCES as usize));
    let workers: Vec<_> = (0..SOURCES)
        .map(|source_id| {
            let miniport = rt.miniport.clone();
            let go = go.clone();
            thread::spawn(move || {
                go.wait();
                for fence in 1..=FRAMES {
                    assert_eq!(present(&miniport, handle, source_id, fence), NtStatus::Success);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for source_id in 0..SOURCES {
        let (status, response) = rt.dispatch(handle, source_id, VideoRequest::QueryPresentStats);
        assert_eq!(status, NtStatus::Success);
        assert_eq!(
            response,
            Some(VideoResponse::PresentStats {
                frames: FRAMES,
                last_fence: Some(FRAMES)
            })
        );
    }
    let presents = rt.callbacks.presents();
    assert_eq!(presents.len() as u64, FRAMES * SOURCES as u64);
    for source_id in 0..SOURCES {
        let fences: Vec<u64> = presents
            .iter()
            .filter(|(s, _)| *s == source_id)
            .map(|(_, f)| *f)
            .collect();
        assert_eq!(fences, (1..=FRAMES).collect::<Vec<_>>());
    }
}

#[test]
fn concurrent_adds_get_distinct_handles() {
    const THREADS: u64 = 8;

    let rt = TestRuntime::with_defaults();
    let go = Arc::new(Barrier::new(THREADS as usize));
    let handles: Vec<MiniportHandle> = (0..THREADS)
        .map(|pdo| {
            let miniport = rt.miniport.clone();
            let go = go.clone();
            thread::spawn(move || {
                go.wait();
                let mut handle = None;
                let status = miniport.add_device(PhysicalDeviceObject(0x100 + pdo), &mut handle);
                assert_eq!(status, NtStatus::Success);
                handle.unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    let mut unique = handles.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), handles.len());
    assert_eq!(rt.miniport.adapter_count(), THREADS as usize);

    for handle in handles {
        assert_eq!(rt.miniport.remove_device(handle), NtStatus::Success);
    }
    assert_eq!(rt.pool.outstanding(), 0);
}
