mod common;

use common::TestRuntime;
use pretty_assertions::assert_eq;
use vdisplay_ddi::{
    DevicePowerState, DisplayMode, NtStatus, PhysicalDeviceObject, PresentSubmission,
    PixelFormat, VidPnTopology, VideoRequest, VideoRequestPacket, VideoResponse,
};
use vdisplay_miniport::{AdapterConfig, LifecycleState, Miniport};

#[test]
fn minimal_adapter_full_lifecycle() {
    let rt = TestRuntime::with_defaults();
    let ddi = Miniport::initialization_data();
    let dxgk = rt.dxgk();

    let mut handle = None;
    assert_eq!(
        (ddi.add_device)(&rt.miniport, PhysicalDeviceObject(0xD15), &mut handle),
        NtStatus::Success
    );
    let handle = handle.unwrap();

    let (mut sources, mut children) = (0, 0);
    assert_eq!(
        (ddi.start_device)(
            &rt.miniport,
            handle,
            &Default::default(),
            &dxgk,
            &mut sources,
            &mut children,
        ),
        NtStatus::Success
    );
    assert_eq!((sources, children), (1, 1));

    let mut packet: VideoRequestPacket = VideoRequest::QueryCurrentMode.into();
    assert_eq!(
        (ddi.dispatch_io_request)(&rt.miniport, handle, 0, &mut packet),
        NtStatus::Success
    );
    assert_eq!(packet.response, Some(VideoResponse::CurrentMode(None)));

    assert_eq!((ddi.stop_device)(&rt.miniport, handle), NtStatus::Success);
    assert_eq!((ddi.remove_device)(&rt.miniport, handle), NtStatus::Success);

    assert_eq!(rt.pool.outstanding(), 0);
    assert_eq!(rt.miniport.adapter_count(), 0);
    assert_eq!(rt.miniport.state(handle), LifecycleState::Removed);
}

#[test]
fn display_bring_up_then_teardown() {
    let config = AdapterConfig::from_json_str(
        r#"{
            "video_present_sources": 2,
            "children": 2,
            "modes": [
                {"width": 2560, "height": 1440, "refresh_hz": 60},
                {"width": 1920, "height": 1080, "refresh_hz": 60, "format": "b8g8r8a8_unorm"}
            ],
            "monitor_name": "Bench"
        }"#,
    )
    .unwrap();
    let preferred = config.modes[0];
    let rt = TestRuntime::new(config);
    let handle = rt.add(1);
    assert_eq!(rt.start(handle), (NtStatus::Success, 2, 2));

    // The runtime reads the monitor's EDID before building a VidPN.
    let (status, edid) = rt.dispatch(
        handle,
        0,
        VideoRequest::QueryDeviceDescriptor {
            child_uid: 0,
            offset: 0,
            length: 128,
        },
    );
    assert_eq!(status, NtStatus::Success);
    assert!(matches!(edid, Some(VideoResponse::DeviceDescriptor(ref b)) if b.len() == 128));

    let topology = VidPnTopology::single(0, 0, preferred);
    assert_eq!(
        rt.dispatch(handle, 0, VideoRequest::IsSupportedVidPn(topology.clone())).1,
        Some(VideoResponse::VidPnSupported(true))
    );
    assert_eq!(
        rt.dispatch(handle, 0, VideoRequest::CommitVidPn(topology)).0,
        NtStatus::Success
    );

    for fence in 1..=3 {
        let (status, response) = rt.dispatch(
            handle,
            0,
            VideoRequest::Present(PresentSubmission {
                width: preferred.width,
                height: preferred.height,
                fence,
            }),
        );
        assert_eq!(status, NtStatus::Success);
        assert_eq!(response, Some(VideoResponse::Presented { frame: fence }));
    }
    assert_eq!(rt.callbacks.presents(), vec![(0, 1), (0, 2), (0, 3)]);

    // Switch to the 1080p mode; the commitment follows.
    let mode = DisplayMode::new(1920, 1080, 60).with_format(PixelFormat::B8G8R8A8Unorm);
    assert_eq!(
        rt.dispatch(handle, 0, VideoRequest::SetMode(mode)).0,
        NtStatus::Success
    );
    assert_eq!(
        rt.dispatch(
            handle,
            0,
            VideoRequest::Present(PresentSubmission {
                width: 1920,
                height: 1080,
                fence: 4,
            })
        )
        .1,
        Some(VideoResponse::Presented { frame: 4 })
    );

    // Power down for suspend, then tear down.
    assert_eq!(
        rt.dispatch(handle, 0, VideoRequest::SetPowerState(DevicePowerState::D3)).1,
        Some(VideoResponse::PowerState(DevicePowerState::D0))
    );
    assert_eq!(rt.miniport.stop_device(handle), NtStatus::Success);
    assert_eq!(rt.miniport.remove_device(handle), NtStatus::Success);
    assert_eq!(rt.pool.outstanding(), 0);
}

#[test]
fn adapters_are_isolated_from_each_other() {
    let rt = TestRuntime::with_defaults();
    let a = rt.started(1);
    let b = rt.started(2);
    let mode = DisplayMode::new(1280, 720, 60);

    assert_eq!(
        rt.dispatch(a, 0, VideoRequest::SetMode(mode)).0,
        NtStatus::Success
    );
    assert_eq!(
        rt.dispatch(b, 0, VideoRequest::QueryCurrentMode).1,
        Some(VideoResponse::CurrentMode(None))
    );

    assert_eq!(rt.miniport.stop_device(a), NtStatus::Success);
    assert_eq!(
        rt.dispatch(b, 0, VideoRequest::QueryPowerState).0,
        NtStatus::Success
    );
    assert_eq!(rt.miniport.remove_device(a), NtStatus::Success);
    assert_eq!(rt.miniport.adapter_count(), 1);
    assert_eq!(rt.miniport.state(b), LifecycleState::Started);
}
