pub mod convert;
pub mod mock;
mod v4l_backend;

pub use convert::{ColorConverter, RgbFrame, SoftwareConverter};
pub use v4l_backend::V4lSdk;

use std::fmt;
use std::ops::ControlFlow;
use std::time::SystemTime;

use crate::descriptor::Compression;
use crate::error::SdkError;

/// How to pick the device to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Serial(String),
    ProductId(u16),
    Index(usize),
}

impl DeviceSelector {
    /// Serial number when one is given, product id otherwise.
    pub fn from_serial_or_product(serial: &str, product_id: u16) -> Self {
        if serial.is_empty() {
            DeviceSelector::ProductId(product_id)
        } else {
            DeviceSelector::Serial(serial.to_owned())
        }
    }

    pub fn matches(&self, info: &DeviceInfo) -> bool {
        match self {
            DeviceSelector::Serial(serial) => info.serial_number.as_deref() == Some(serial.as_str()),
            DeviceSelector::ProductId(pid) => info.product_id == *pid,
            DeviceSelector::Index(index) => info.index == *index,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Serial(serial) => write!(f, "serial {serial}"),
            DeviceSelector::ProductId(pid) => write!(f, "product id {pid:#06x}"),
            DeviceSelector::Index(index) => write!(f, "device index {index}"),
        }
    }
}

/// Identity of a connected camera.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// bcdUVC, e.g. 0x0100 for UVC 1.0.
    pub uvc_compliance: u16,
    pub bus_info: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:04x}:{:04x}, serial {})",
            self.index,
            self.product.as_deref().unwrap_or("unknown product"),
            self.vendor_id,
            self.product_id,
            self.serial_number.as_deref().unwrap_or("none"),
        )
    }
}

/// Video-streaming descriptor subtype of a format descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSubtype {
    Uncompressed,
    Mjpeg,
    FrameBased,
    Other(u8),
}

impl DescriptorSubtype {
    /// UVC `bDescriptorSubtype` value.
    pub fn code(self) -> u8 {
        match self {
            DescriptorSubtype::Uncompressed => 0x04,
            DescriptorSubtype::Mjpeg => 0x06,
            DescriptorSubtype::FrameBased => 0x10,
            DescriptorSubtype::Other(code) => code,
        }
    }
}

/// One discrete frame size with its frame intervals (100 ns units).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub default_frame_interval: u32,
    pub frame_intervals: Vec<u32>,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, default_frame_interval: u32) -> Self {
        Self {
            width,
            height,
            default_frame_interval,
            frame_intervals: vec![default_frame_interval],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub subtype: DescriptorSubtype,
    /// Pixel format code for uncompressed formats, if the backend knows it.
    pub fourcc: Option<[u8; 4]>,
    pub frames: Vec<FrameDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingInterface {
    pub number: u8,
    pub formats: Vec<FormatDescriptor>,
}

/// Streaming capabilities advertised by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTree {
    pub interfaces: Vec<StreamingInterface>,
}

/// Result of a successful stream negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamControl {
    pub compression: Compression,
    pub fourcc: [u8; 4],
    pub width: u32,
    pub height: u32,
    pub frame_rate_hz: i32,
}

/// A frame owned by the SDK, valid only for the duration of one callback.
#[derive(Debug)]
pub struct VendorFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub compression: Compression,
    pub sequence: u32,
    pub timestamp: SystemTime,
}

/// Per-frame entry point registered with the SDK for one session.
///
/// Returning `ControlFlow::Break` asks the SDK to end the stream after this
/// frame; no further calls are made for the session.
pub trait FrameHandler: Send {
    fn on_frame(&mut self, frame: &VendorFrame<'_>) -> ControlFlow<()>;

    /// The stream died underneath the handler. No frames follow.
    fn on_stream_error(&mut self, _err: &SdkError) {}
}

/// Camera properties reachable through the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKind {
    /// Absolute exposure time, 100 µs units.
    Exposure,
    Gain,
    Gamma,
    BacklightCompensation,
    Brightness,
    Contrast,
    PowerLineFrequency,
    Hue,
    Saturation,
    Sharpness,
    ZoomAbsolute,
}

/// Opened camera, exclusively owned by one acquisition.
pub trait DeviceHandle: Send {
    fn info(&self) -> &DeviceInfo;

    fn is_open(&self) -> bool;

    fn capability_tree(&self) -> Result<CapabilityTree, SdkError>;

    /// Configure the device for the given mode. Does not start streaming.
    fn negotiate_stream(
        &mut self,
        compression: Compression,
        width: u32,
        height: u32,
        frame_rate_hz: i32,
    ) -> Result<StreamControl, SdkError>;

    /// Begin delivering frames to `handler` on an SDK-owned thread.
    fn start_streaming(
        &mut self,
        control: &StreamControl,
        handler: Box<dyn FrameHandler>,
    ) -> Result<(), SdkError>;

    /// Stop streaming. Blocks until the last in-flight callback has returned.
    /// Also reaps a stream that ended because its handler returned `Break`.
    fn stop_streaming(&mut self) -> Result<(), SdkError>;

    /// Whether a stream thread is still delivering frames.
    fn is_streaming(&self) -> bool;

    fn get_control(&self, control: ControlKind) -> Result<i32, SdkError>;

    fn set_control(&self, control: ControlKind, value: i32) -> Result<(), SdkError>;

    /// Minimum and maximum accepted value.
    fn control_range(&self, control: ControlKind) -> Result<(i32, i32), SdkError>;

    /// Relative pan/tilt move. Direction is -1, 0 or 1; a zero pair halts.
    fn pan_tilt_relative(
        &self,
        pan: i8,
        pan_speed: u8,
        tilt: i8,
        tilt_speed: u8,
    ) -> Result<(), SdkError>;

    fn close(&mut self);
}

/// Entry point of a device SDK.
pub trait DeviceSdk: Send {
    /// Short version string of the SDK / backend.
    fn version(&self) -> String;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, SdkError>;

    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceHandle>, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_wins_over_product_id() {
        assert_eq!(
            DeviceSelector::from_serial_or_product("A123", 0x0825),
            DeviceSelector::Serial("A123".into())
        );
        assert_eq!(
            DeviceSelector::from_serial_or_product("", 0x0825),
            DeviceSelector::ProductId(0x0825)
        );
    }
}
