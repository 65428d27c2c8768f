#![allow(dead_code)]

use std::sync::mpsc::Receiver;

use uvcam::output::{self, ChannelSink};
use uvcam::sdk::mock::{MockCamera, MockFeed, MockSdk};
use uvcam::sdk::{
    CapabilityTree, DescriptorSubtype, FormatDescriptor, FrameDescriptor, StreamingInterface,
};
use uvcam::{CameraControl, DriverConfig, ImageBuffer};

/// 100 ns intervals for 30 fps.
pub const FPS_30: u32 = 333_333;

/// Small modes so synthetic frames stay tiny.
pub fn small_tree() -> CapabilityTree {
    CapabilityTree {
        interfaces: vec![StreamingInterface {
            number: 1,
            formats: vec![
                FormatDescriptor {
                    subtype: DescriptorSubtype::Uncompressed,
                    fourcc: Some(*b"YUYV"),
                    frames: vec![FrameDescriptor::new(8, 4, FPS_30)],
                },
                FormatDescriptor {
                    subtype: DescriptorSubtype::Mjpeg,
                    fourcc: Some(*b"MJPG"),
                    frames: vec![FrameDescriptor::new(16, 8, FPS_30)],
                },
            ],
        }],
    }
}

pub struct Rig {
    pub control: CameraControl,
    pub feed: MockFeed,
    pub frames: Receiver<ImageBuffer>,
}

pub fn rig_with(camera: MockCamera, config: DriverConfig) -> Rig {
    let feed = camera.feed();
    let (sink, frames) = ChannelSink::new();
    let mut control = CameraControl::new(
        Box::new(MockSdk::single(camera)),
        config,
        output::shared(sink),
    );
    control.connect().expect("mock camera should connect");
    Rig {
        control,
        feed,
        frames,
    }
}

/// Connected to a mock camera with the small capability tree.
pub fn rig() -> Rig {
    rig_with(
        MockCamera::new().with_tree(small_tree()),
        DriverConfig {
            size_x: 16,
            size_y: 8,
            ..DriverConfig::default()
        },
    )
}
