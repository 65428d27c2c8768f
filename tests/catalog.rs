mod common;

use common::{rig_with, FPS_30};
use uvcam::catalog::{build_catalog, flatten, Catalog, DEFAULT_CAPACITY};
use uvcam::sdk::mock::{MockCamera, MockSdk};
use uvcam::sdk::{
    CapabilityTree, DescriptorSubtype, DeviceSdk, DeviceSelector, FormatDescriptor,
    FrameDescriptor, StreamingInterface,
};
use uvcam::{CatalogError, Compression, DriverConfig, ParamId};

fn format(subtype: DescriptorSubtype, frames: Vec<FrameDescriptor>) -> FormatDescriptor {
    FormatDescriptor {
        subtype,
        fourcc: None,
        frames,
    }
}

fn one_interface(formats: Vec<FormatDescriptor>) -> CapabilityTree {
    CapabilityTree {
        interfaces: vec![StreamingInterface { number: 1, formats }],
    }
}

fn catalog_for(tree: CapabilityTree) -> Catalog {
    let sdk = MockSdk::single(MockCamera::new().with_tree(tree));
    let handle = sdk.open(&DeviceSelector::Index(0)).expect("open mock");
    build_catalog(handle.as_ref()).expect("catalog")
}

fn summary(catalog: &Catalog) -> Vec<(Compression, u32, u32, i32)> {
    catalog
        .iter()
        .map(|entry| {
            (
                entry.compression(),
                entry.width(),
                entry.height(),
                entry.frame_rate_hz(),
            )
        })
        .collect()
}

#[test]
fn default_camera_is_ranked_mjpeg_first() {
    let catalog = catalog_for(uvcam::sdk::mock::default_tree());

    assert_eq!(
        summary(&catalog),
        vec![
            (Compression::Mjpeg, 1920, 1080, 30),
            (Compression::Mjpeg, 1280, 720, 30),
            (Compression::Mjpeg, 640, 480, 30),
            (Compression::Uncompressed, 1280, 720, 10),
            (Compression::Uncompressed, 640, 480, 30),
            (Compression::Uncompressed, 320, 240, 30),
        ]
    );
    assert_eq!(catalog.max_size(), Some((1920, 1080)));
    assert!(catalog.slots()[DEFAULT_CAPACITY - 1].is_unused());
}

#[test]
fn duplicate_modes_appear_once() {
    let catalog = catalog_for(one_interface(vec![
        format(
            DescriptorSubtype::Mjpeg,
            vec![FrameDescriptor::new(640, 480, FPS_30)],
        ),
        format(
            DescriptorSubtype::Mjpeg,
            vec![
                FrameDescriptor::new(640, 480, FPS_30),
                // rounds to the same 30 fps
                FrameDescriptor::new(640, 480, 333_334),
            ],
        ),
        format(
            DescriptorSubtype::Uncompressed,
            vec![FrameDescriptor::new(640, 480, FPS_30)],
        ),
    ]));

    assert_eq!(
        summary(&catalog),
        vec![
            (Compression::Mjpeg, 640, 480, 30),
            (Compression::Uncompressed, 640, 480, 30),
        ]
    );
    let valid: Vec<_> = catalog.iter().collect();
    for (index, entry) in valid.iter().enumerate() {
        assert!(valid[index + 1..].iter().all(|other| !other.same_mode(entry)));
    }
}

#[test]
fn compressed_entries_precede_larger_uncompressed_ones() {
    let catalog = catalog_for(one_interface(vec![
        format(
            DescriptorSubtype::Uncompressed,
            vec![FrameDescriptor::new(3840, 2160, FPS_30)],
        ),
        format(
            DescriptorSubtype::Mjpeg,
            vec![
                FrameDescriptor::new(320, 240, FPS_30),
                FrameDescriptor::new(320, 240, 166_666),
            ],
        ),
    ]));

    assert_eq!(
        summary(&catalog),
        vec![
            (Compression::Mjpeg, 320, 240, 60),
            (Compression::Mjpeg, 320, 240, 30),
            (Compression::Uncompressed, 3840, 2160, 30),
        ]
    );
    // the published maximum follows rank, not area
    assert_eq!(catalog.max_size(), Some((320, 240)));
}

#[test]
fn unsupported_formats_and_zero_intervals_are_skipped() {
    let tree = one_interface(vec![
        format(
            DescriptorSubtype::FrameBased,
            vec![FrameDescriptor::new(1920, 1080, FPS_30)],
        ),
        format(
            DescriptorSubtype::Mjpeg,
            vec![
                FrameDescriptor::new(1280, 720, 0),
                FrameDescriptor::new(640, 480, FPS_30),
            ],
        ),
    ]);

    let flat = flatten(&tree);
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].width(), 640);

    let catalog = catalog_for(tree);
    assert_eq!(catalog.len(), 1);
    assert!(catalog.slots()[1..].iter().all(|slot| slot.is_unused()));
}

#[test]
fn surplus_modes_are_dropped() {
    let frames = (1..=10u32)
        .map(|step| FrameDescriptor::new(160 * step, 120 * step, FPS_30))
        .collect();
    let catalog = catalog_for(one_interface(vec![format(DescriptorSubtype::Mjpeg, frames)]));

    assert!(catalog.is_full());
    let widths: Vec<u32> = catalog.iter().map(|entry| entry.width()).collect();
    assert_eq!(widths, vec![1600, 1440, 1280, 1120, 960, 800, 640]);
}

#[test]
fn empty_device_yields_empty_catalog() {
    let catalog = catalog_for(CapabilityTree::default());
    assert!(catalog.is_empty());
    assert_eq!(catalog.max_size(), None);
    assert!(catalog.slots().iter().all(|slot| slot.is_unused()));
}

#[test]
fn closed_handle_is_rejected() {
    let sdk = MockSdk::single(MockCamera::new());
    let mut handle = sdk.open(&DeviceSelector::Index(0)).expect("open mock");
    handle.close();

    let result: Result<Catalog, _> = build_catalog(handle.as_ref());
    assert!(matches!(result, Err(CatalogError::DeviceNotOpen)));
}

#[test]
fn connect_without_modes_keeps_manual_settings() {
    let rig = rig_with(
        MockCamera::new().with_tree(CapabilityTree::default()),
        DriverConfig::default(),
    );

    assert!(rig.control.catalog().is_empty());
    assert_eq!(rig.control.param_int(ParamId::MaxSizeX), 0);
    assert_eq!(rig.control.param_int(ParamId::SizeX), 640);
    assert_eq!(rig.control.status(), "Connected");
}

#[test]
fn unreadable_descriptors_are_reported_on_connect() {
    let rig = rig_with(MockCamera::new().failing_capabilities(), DriverConfig::default());

    assert!(rig.control.is_connected());
    assert!(rig.control.catalog().is_empty());
    assert!(rig.control.status().starts_with("Error: "));
    assert_eq!(rig.control.param_text(ParamId::Model), "Mock UVC Camera");
    assert_eq!(rig.control.param_int(ParamId::SizeX), 640);
}
