mod common;

use std::sync::{Arc, Mutex};

use common::rig;
use uvcam::output::{self, ChannelSink};
use uvcam::sdk::mock::{MockCamera, MockSdk, PanTiltMove};
use uvcam::sdk::ControlKind;
use uvcam::{
    CameraControl, ColorLayout, Compression, ControlError, DriverConfig, ElementType, ImageMode,
    ParamId, ParamValue,
};

#[test]
fn connect_publishes_device_identity() {
    let rig = rig();
    let control = &rig.control;

    assert!(control.is_connected());
    assert_eq!(control.status(), "Connected");
    assert_eq!(control.param_text(ParamId::Manufacturer), "Mock Devices");
    assert_eq!(control.param_text(ParamId::Model), "Mock UVC Camera");
    assert_eq!(control.param_text(ParamId::SerialNumber), "MOCK0001");
    assert_eq!(control.param_int(ParamId::UvcCompliance), 0x0100);
    assert!(control.param_text(ParamId::SdkVersion).starts_with("mock "));
    assert_eq!(control.param_int(ParamId::MaxSizeX), 16);
    assert_eq!(control.param_int(ParamId::MaxSizeY), 8);
    assert_eq!(
        control.param_text(ParamId::FormatDescription),
        "MJPEG 16x8 @ 30 fps"
    );
}

#[test]
fn connect_reads_camera_properties() {
    let rig = rig();
    assert_eq!(rig.control.param_int(ParamId::Contrast), 32);
    assert_eq!(rig.control.param_int(ParamId::Saturation), 64);
    assert_eq!(rig.control.param(ParamId::Gain), Some(ParamValue::Float(0.0)));
    assert!((rig.control.param_float(ParamId::Exposure) - 0.0156).abs() < 1e-9);
}

#[test]
fn unknown_device_fails_to_connect() {
    let (sink, _frames) = ChannelSink::new();
    let mut control = CameraControl::new(
        Box::new(MockSdk::single(MockCamera::new())),
        DriverConfig {
            selector: uvcam::sdk::DeviceSelector::Serial("missing".into()),
            ..DriverConfig::default()
        },
        output::shared(sink),
    );

    let err = control.connect().expect_err("no such serial");
    assert!(matches!(err, ControlError::Sdk(_)));
    assert!(!control.is_connected());
    assert!(control.status().starts_with("Error: "));
}

#[test]
fn start_requires_connection() {
    let (sink, _frames) = ChannelSink::new();
    let mut control = CameraControl::new(
        Box::new(MockSdk::single(MockCamera::new())),
        DriverConfig::default(),
        output::shared(sink),
    );

    assert!(matches!(control.start(), Err(ControlError::NotConnected)));
    assert!(matches!(
        control.write_int(ParamId::Acquire, 1),
        Err(ControlError::NotConnected)
    ));
    assert!(!control.is_acquiring());
}

#[test]
fn selecting_an_entry_updates_description() {
    let mut rig = rig();
    rig.control.write_int(ParamId::CameraFormat, 1).expect("select");

    assert_eq!(
        rig.control.param_text(ParamId::FormatDescription),
        "Uncompressed 8x4 @ 30 fps"
    );
    assert_eq!(rig.control.status(), "Updated format desc.");
    // selection alone does not touch the stream settings
    assert_eq!(rig.control.param_int(ParamId::SizeX), 16);
}

#[test]
fn applying_an_entry_copies_stream_settings() {
    let mut rig = rig();
    rig.control.write_int(ParamId::CameraFormat, 1).expect("select");
    rig.control.write_int(ParamId::ApplyFormat, 1).expect("apply");

    let control = &rig.control;
    assert_eq!(control.param_int(ParamId::SizeX), 8);
    assert_eq!(control.param_int(ParamId::SizeY), 4);
    assert_eq!(control.param_int(ParamId::FrameRate), 30);
    assert_eq!(
        control.param_int(ParamId::ImageFormat),
        Compression::Uncompressed.code()
    );
    assert_eq!(control.param_int(ParamId::ColorMode), ColorLayout::Mono.code());
    assert_eq!(control.param_int(ParamId::DataType), ElementType::UInt16.code());
    assert_eq!(control.param_int(ParamId::ApplyFormat), 0);
    assert_eq!(control.status(), "Applied format");
}

#[test]
fn applying_an_unused_entry_changes_nothing() {
    let mut rig = rig();
    assert!(matches!(
        rig.control.catalog_entry(5),
        Err(ControlError::UnusedCatalogEntry(5))
    ));

    rig.control.write_int(ParamId::CameraFormat, 5).expect("select unused slot");
    assert_eq!(
        rig.control.param_text(ParamId::FormatDescription),
        "Unused camera format"
    );
    rig.control.write_int(ParamId::ApplyFormat, 1).expect("apply is a no-op");

    assert_eq!(rig.control.param_int(ParamId::SizeX), 16);
    assert_eq!(rig.control.param_int(ParamId::SizeY), 8);
    assert_eq!(rig.control.param_int(ParamId::ImageFormat), Compression::Mjpeg.code());
    assert_eq!(rig.control.param_int(ParamId::ApplyFormat), 0);
}

#[test]
fn out_of_range_catalog_index_is_rejected() {
    let mut rig = rig();
    assert!(matches!(
        rig.control.catalog_entry(7),
        Err(ControlError::InvalidCatalogIndex(7))
    ));
    assert!(matches!(
        rig.control.write_int(ParamId::CameraFormat, -1),
        Err(ControlError::InvalidCatalogIndex(-1))
    ));
    assert!(rig.control.catalog_entry(0).is_ok());
}

#[test]
fn image_mode_sets_default_frame_count() {
    let mut rig = rig();
    rig.control
        .write_int(ParamId::ImageMode, ImageMode::Multiple.code())
        .expect("multiple");
    assert_eq!(rig.control.param_int(ParamId::NumImages), 300);

    rig.control
        .write_int(ParamId::ImageMode, ImageMode::Continuous.code())
        .expect("continuous");
    assert_eq!(rig.control.param_int(ParamId::NumImages), 300);

    rig.control
        .write_int(ParamId::ImageMode, ImageMode::Single.code())
        .expect("single");
    assert_eq!(rig.control.param_int(ParamId::NumImages), 1);
}

#[test]
fn property_writes_reach_the_camera() {
    let mut rig = rig();
    rig.control.write_int(ParamId::Brightness, 42).expect("brightness");
    rig.control.write_int(ParamId::Sharpness, 7).expect("sharpness");
    rig.control.write_float(ParamId::Gain, 12.6).expect("gain");

    assert_eq!(rig.feed.control(ControlKind::Brightness), Some(42));
    assert_eq!(rig.feed.control(ControlKind::Sharpness), Some(7));
    assert_eq!(rig.feed.control(ControlKind::Gain), Some(13));
}

#[test]
fn exposure_is_written_in_seconds() {
    let mut rig = rig();
    rig.control.write_float(ParamId::Exposure, 0.05).expect("exposure");
    assert_eq!(rig.feed.control(ControlKind::Exposure), Some(500));
}

#[test]
fn exposure_write_stops_acquisition() {
    let mut rig = rig();
    rig.control.acquire(ImageMode::Continuous, 0).expect("start");
    rig.control.write_float(ParamId::Exposure, 0.01).expect("exposure");

    assert!(!rig.control.is_acquiring());
    assert_eq!(rig.feed.control(ControlKind::Exposure), Some(100));
}

#[test]
fn value_type_must_match_handler() {
    let mut rig = rig();
    let err = rig
        .control
        .write_int(ParamId::Exposure, 1)
        .expect_err("exposure takes seconds");
    assert!(matches!(err, ControlError::WrongValueType(ParamId::Exposure)));
    assert_eq!(rig.feed.control(ControlKind::Exposure), Some(156));

    assert!(matches!(
        rig.control.write_float(ParamId::Brightness, 1.0),
        Err(ControlError::WrongValueType(ParamId::Brightness))
    ));
}

#[test]
fn pan_button_moves_then_halts() {
    let mut rig = rig();
    rig.control.write_float(ParamId::PanTiltStep, 0.0).expect("step");
    rig.control.write_int(ParamId::PanLeft, 1).expect("pan left");

    assert_eq!(
        rig.feed.pan_tilt_moves(),
        vec![
            PanTiltMove {
                pan: -1,
                pan_speed: 1,
                tilt: 0,
                tilt_speed: 1,
            },
            PanTiltMove {
                pan: 0,
                pan_speed: 0,
                tilt: 0,
                tilt_speed: 0,
            },
        ]
    );
    assert_eq!(rig.control.param_int(ParamId::PanLeft), 0);

    rig.control.write_int(ParamId::TiltUp, 0).expect("released button");
    assert_eq!(rig.feed.pan_tilt_moves().len(), 2);
}

#[test]
fn zoom_steps_are_clamped_to_range() {
    let mut rig = rig();
    rig.control.write_int(ParamId::ZoomOut, 1).expect("zoom out");
    assert_eq!(rig.feed.control(ControlKind::ZoomAbsolute), Some(100));

    rig.control.write_int(ParamId::ZoomIn, 1).expect("zoom in");
    assert_eq!(rig.feed.control(ControlKind::ZoomAbsolute), Some(140));
    assert_eq!(rig.control.param_int(ParamId::ZoomIn), 0);

    for _ in 0..20 {
        rig.control.write_int(ParamId::ZoomIn, 1).expect("zoom in");
    }
    assert_eq!(rig.feed.control(ControlKind::ZoomAbsolute), Some(500));
}

#[test]
fn stream_setting_write_stops_acquisition() {
    let mut rig = rig();
    rig.control.acquire(ImageMode::Continuous, 0).expect("start");
    assert!(rig.feed.is_streaming());

    rig.control.write_int(ParamId::FrameRate, 15).expect("frame rate");
    assert!(!rig.control.is_acquiring());
    assert!(!rig.feed.is_streaming());
    assert_eq!(rig.control.param_int(ParamId::Acquire), 0);
    assert_eq!(rig.control.param_int(ParamId::FrameRate), 15);
}

#[test]
fn huge_frame_count_saturates() {
    let mut rig = rig();
    rig.control.acquire(ImageMode::Multiple, u64::MAX).expect("start");

    assert_eq!(rig.control.param_int(ParamId::NumImages), i64::MAX);
    assert!(rig.control.is_acquiring());
    assert_eq!(
        rig.feed.deliver_synthetic(Compression::Mjpeg, 16, 8),
        uvcam::sdk::mock::FeedResult::Continue
    );
}

#[test]
fn listeners_see_published_changes() {
    let rig = rig();
    let seen = Arc::new(Mutex::new(Vec::new()));
    rig.control.subscribe(Box::new({
        let seen = Arc::clone(&seen);
        move |id, value| {
            if let Ok(mut seen) = seen.lock() {
                seen.push((id, value.clone()));
            }
        }
    }));

    let mut control = rig.control;
    control.write_int(ParamId::Brightness, 42).expect("brightness");
    control.write_int(ParamId::Brightness, 42).expect("unchanged");

    let seen = seen.lock().expect("listener lock");
    assert_eq!(seen.as_slice(), &[(ParamId::Brightness, ParamValue::Int(42))]);
}

#[test]
fn report_lists_device_and_catalog() {
    let rig = rig();
    let mut out = Vec::new();
    rig.control.report(&mut out, 2).expect("report");
    let text = String::from_utf8(out).expect("utf-8 report");

    assert!(text.contains("Mock UVC Camera"));
    assert!(text.contains("[0] MJPEG 16x8 @ 30 fps"));
    assert!(text.contains("[1] Uncompressed 8x4 @ 30 fps"));
    assert!(text.contains("[2] Unused camera format"));

    let mut short = Vec::new();
    rig.control.report(&mut short, 0).expect("report");
    let short = String::from_utf8(short).expect("utf-8 report");
    assert!(!short.contains("Mock UVC Camera"));
}

#[test]
fn disconnect_closes_the_device() {
    let mut rig = rig();
    rig.control.acquire(ImageMode::Continuous, 0).expect("start");
    rig.control.disconnect().expect("disconnect");

    assert!(!rig.control.is_connected());
    assert!(!rig.feed.is_streaming());
    assert_eq!(rig.control.status(), "Disconnected");
    assert!(matches!(
        rig.control.write_int(ParamId::Brightness, 1),
        Err(ControlError::NotConnected)
    ));
}
