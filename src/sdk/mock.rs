use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use image::{ImageFormat, Rgb, RgbImage};

use super::{
    CapabilityTree, ControlKind, DescriptorSubtype, DeviceHandle, DeviceInfo, DeviceSdk,
    DeviceSelector, FormatDescriptor, FrameDescriptor, FrameHandler, StreamControl,
    StreamingInterface, VendorFrame,
};
use crate::descriptor::Compression;
use crate::error::{SdkError, SdkErrorKind};

/// One relative pan/tilt command as received by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanTiltMove {
    pub pan: i8,
    pub pan_speed: u8,
    pub tilt: i8,
    pub tilt_speed: u8,
}

/// Outcome of pushing one frame into the mock stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedResult {
    /// No handler is registered.
    NotStreaming,
    Continue,
    /// The handler asked to end the stream; it has been unregistered.
    Stopped,
}

#[derive(Default)]
struct Shared {
    handler: Mutex<Option<Box<dyn FrameHandler>>>,
    controls: Mutex<BTreeMap<ControlKind, i32>>,
    pan_tilt: Mutex<Vec<PanTiltMove>>,
    negotiated: Mutex<Vec<StreamControl>>,
    sequence: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test-side view of a mock camera's stream and controls.
#[derive(Clone)]
pub struct MockFeed {
    shared: Arc<Shared>,
}

impl MockFeed {
    /// Run the registered handler on one frame, as the SDK thread would.
    /// Blocks a concurrent `stop_streaming` until the handler returns.
    pub fn deliver(&self, frame: &VendorFrame<'_>) -> FeedResult {
        let mut slot = lock(&self.shared.handler);
        let Some(handler) = slot.as_mut() else {
            return FeedResult::NotStreaming;
        };
        match handler.on_frame(frame) {
            ControlFlow::Continue(()) => FeedResult::Continue,
            ControlFlow::Break(()) => {
                slot.take();
                FeedResult::Stopped
            }
        }
    }

    pub fn deliver_bytes(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        compression: Compression,
    ) -> FeedResult {
        let frame = VendorFrame {
            data,
            width,
            height,
            compression,
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: SystemTime::now(),
        };
        self.deliver(&frame)
    }

    /// Deliver a generated test pattern of the given encoding.
    pub fn deliver_synthetic(&self, compression: Compression, width: u32, height: u32) -> FeedResult {
        let data = synthetic_frame(compression, width, height);
        self.deliver_bytes(&data, width, height, compression)
    }

    /// Kill the stream with `message`, as a device error would. Returns
    /// `false` when nothing was streaming.
    pub fn fail_stream(&self, message: &str) -> bool {
        let Some(mut handler) = lock(&self.shared.handler).take() else {
            return false;
        };
        handler.on_stream_error(&SdkError::new(SdkErrorKind::Io, message));
        true
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared.handler).is_some()
    }

    pub fn control(&self, control: ControlKind) -> Option<i32> {
        lock(&self.shared.controls).get(&control).copied()
    }

    pub fn pan_tilt_moves(&self) -> Vec<PanTiltMove> {
        lock(&self.shared.pan_tilt).clone()
    }

    /// Every successful negotiation, oldest first.
    pub fn negotiations(&self) -> Vec<StreamControl> {
        lock(&self.shared.negotiated).clone()
    }
}

/// Description of a simulated camera.
#[derive(Clone)]
pub struct MockCamera {
    info: DeviceInfo,
    tree: CapabilityTree,
    fail_negotiation: bool,
    fail_capabilities: bool,
    fail_stop: bool,
    frame_period: Option<Duration>,
    shared: Arc<Shared>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCamera {
    pub fn new() -> Self {
        let shared = Shared::default();
        {
            let mut controls = lock(&shared.controls);
            for (kind, value) in [
                (ControlKind::Exposure, 156),
                (ControlKind::Gain, 0),
                (ControlKind::Gamma, 100),
                (ControlKind::BacklightCompensation, 1),
                (ControlKind::Brightness, 0),
                (ControlKind::Contrast, 32),
                (ControlKind::PowerLineFrequency, 1),
                (ControlKind::Hue, 0),
                (ControlKind::Saturation, 64),
                (ControlKind::Sharpness, 3),
                (ControlKind::ZoomAbsolute, 100),
            ] {
                controls.insert(kind, value);
            }
        }

        Self {
            info: DeviceInfo {
                index: 0,
                vendor_id: 0x046d,
                product_id: 0x0825,
                serial_number: Some("MOCK0001".to_owned()),
                manufacturer: Some("Mock Devices".to_owned()),
                product: Some("Mock UVC Camera".to_owned()),
                uvc_compliance: 0x0100,
                bus_info: "usb-mock-1".to_owned(),
            },
            tree: default_tree(),
            fail_negotiation: false,
            fail_capabilities: false,
            fail_stop: false,
            frame_period: None,
            shared: Arc::new(shared),
        }
    }

    #[must_use]
    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    #[must_use]
    pub fn with_tree(mut self, tree: CapabilityTree) -> Self {
        self.tree = tree;
        self
    }

    /// Every negotiation fails with `InvalidMode`.
    #[must_use]
    pub fn failing_negotiation(mut self) -> Self {
        self.fail_negotiation = true;
        self
    }

    /// Reading the capability tree fails with `Io`.
    #[must_use]
    pub fn failing_capabilities(mut self) -> Self {
        self.fail_capabilities = true;
        self
    }

    /// `stop_streaming` reports an error after tearing the stream down.
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Produce synthetic frames on a background thread while streaming.
    #[must_use]
    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = Some(period);
        self
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn feed(&self) -> MockFeed {
        MockFeed {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Two formats on one interface: YUYV-backed uncompressed and MJPEG.
pub fn default_tree() -> CapabilityTree {
    CapabilityTree {
        interfaces: vec![StreamingInterface {
            number: 1,
            formats: vec![
                FormatDescriptor {
                    subtype: DescriptorSubtype::Uncompressed,
                    fourcc: Some(*b"YUYV"),
                    frames: vec![
                        FrameDescriptor::new(640, 480, 333_333),
                        FrameDescriptor::new(320, 240, 333_333),
                        FrameDescriptor::new(1280, 720, 1_000_000),
                    ],
                },
                FormatDescriptor {
                    subtype: DescriptorSubtype::Mjpeg,
                    fourcc: Some(*b"MJPG"),
                    frames: vec![
                        FrameDescriptor::new(1280, 720, 333_333),
                        FrameDescriptor::new(640, 480, 333_333),
                        FrameDescriptor::new(1920, 1080, 333_333),
                    ],
                },
            ],
        }],
    }
}

/// Mock device SDK serving a fixed set of cameras.
#[derive(Clone, Default)]
pub struct MockSdk {
    cameras: Vec<MockCamera>,
}

impl MockSdk {
    pub fn new(cameras: Vec<MockCamera>) -> Self {
        Self { cameras }
    }

    pub fn single(camera: MockCamera) -> Self {
        Self::new(vec![camera])
    }
}

impl DeviceSdk for MockSdk {
    fn version(&self) -> String {
        format!("mock {}", env!("CARGO_PKG_VERSION"))
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, SdkError> {
        Ok(self.cameras.iter().map(|camera| camera.info.clone()).collect())
    }

    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceHandle>, SdkError> {
        let camera = self
            .cameras
            .iter()
            .find(|camera| selector.matches(&camera.info))
            .ok_or_else(|| {
                SdkError::new(SdkErrorKind::NoDevice, format!("no camera with {selector}"))
            })?;

        tracing::debug!("opened mock camera {}", camera.info);
        Ok(Box::new(MockHandle {
            camera: camera.clone(),
            open: true,
            worker: None,
        }))
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Opened mock camera.
pub struct MockHandle {
    camera: MockCamera,
    open: bool,
    worker: Option<Worker>,
}

impl MockHandle {
    fn ensure_open(&self) -> Result<(), SdkError> {
        if self.open {
            Ok(())
        } else {
            Err(SdkError::new(SdkErrorKind::NoDevice, "device is closed"))
        }
    }

    fn mode_advertised(&self, compression: Compression, width: u32, height: u32, rate: i32) -> bool {
        let wanted = if compression == Compression::Mjpeg {
            DescriptorSubtype::Mjpeg
        } else {
            DescriptorSubtype::Uncompressed
        };

        self.camera
            .tree
            .interfaces
            .iter()
            .flat_map(|interface| &interface.formats)
            .filter(|format| format.subtype == wanted)
            .flat_map(|format| &format.frames)
            .filter(|frame| frame.width == width && frame.height == height)
            .flat_map(|frame| &frame.frame_intervals)
            .any(|&interval| interval != 0 && (10_000_000.0 / f64::from(interval)).round() as i32 == rate)
    }
}

impl DeviceHandle for MockHandle {
    fn info(&self) -> &DeviceInfo {
        &self.camera.info
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn capability_tree(&self) -> Result<CapabilityTree, SdkError> {
        self.ensure_open()?;
        if self.camera.fail_capabilities {
            return Err(SdkError::new(SdkErrorKind::Io, "descriptor read failed"));
        }
        Ok(self.camera.tree.clone())
    }

    fn negotiate_stream(
        &mut self,
        compression: Compression,
        width: u32,
        height: u32,
        frame_rate_hz: i32,
    ) -> Result<StreamControl, SdkError> {
        self.ensure_open()?;
        if self.camera.fail_negotiation || !self.mode_advertised(compression, width, height, frame_rate_hz) {
            return Err(SdkError::new(
                SdkErrorKind::InvalidMode,
                format!("{compression} {width}x{height} @ {frame_rate_hz} not available"),
            ));
        }

        let control = StreamControl {
            compression,
            fourcc: if compression == Compression::Mjpeg {
                *b"MJPG"
            } else {
                *b"YUYV"
            },
            width,
            height,
            frame_rate_hz,
        };
        lock(&self.camera.shared.negotiated).push(control.clone());
        Ok(control)
    }

    fn start_streaming(
        &mut self,
        control: &StreamControl,
        handler: Box<dyn FrameHandler>,
    ) -> Result<(), SdkError> {
        self.ensure_open()?;
        {
            let mut slot = lock(&self.camera.shared.handler);
            if slot.is_some() {
                return Err(SdkError::new(
                    SdkErrorKind::CallbackExists,
                    "stream already running",
                ));
            }
            *slot = Some(handler);
        }

        if let Some(period) = self.camera.frame_period {
            let stop = Arc::new(AtomicBool::new(false));
            let feed = self.camera.feed();
            let control = control.clone();
            let thread = thread::Builder::new()
                .name("mock-stream".to_owned())
                .spawn({
                    let stop = Arc::clone(&stop);
                    move || autoplay(&feed, &control, &stop, period)
                })?;
            self.worker = Some(Worker { stop, thread });
        }
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), SdkError> {
        if let Some(worker) = &self.worker {
            worker.stop.store(true, Ordering::SeqCst);
        }
        lock(&self.camera.shared.handler).take();
        if let Some(worker) = self.worker.take() {
            if worker.thread.join().is_err() {
                return Err(SdkError::new(SdkErrorKind::Other, "mock stream thread panicked"));
            }
        }
        if self.camera.fail_stop {
            return Err(SdkError::new(SdkErrorKind::Busy, "stream did not stop"));
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.camera.feed().is_streaming()
    }

    fn get_control(&self, control: ControlKind) -> Result<i32, SdkError> {
        self.ensure_open()?;
        self.camera
            .feed()
            .control(control)
            .ok_or_else(|| SdkError::not_supported(format!("{control:?}")))
    }

    fn set_control(&self, control: ControlKind, value: i32) -> Result<(), SdkError> {
        self.ensure_open()?;
        lock(&self.camera.shared.controls).insert(control, value);
        Ok(())
    }

    fn control_range(&self, control: ControlKind) -> Result<(i32, i32), SdkError> {
        self.ensure_open()?;
        Ok(match control {
            ControlKind::ZoomAbsolute => (100, 500),
            ControlKind::Exposure => (1, 10_000),
            _ => (0, 255),
        })
    }

    fn pan_tilt_relative(
        &self,
        pan: i8,
        pan_speed: u8,
        tilt: i8,
        tilt_speed: u8,
    ) -> Result<(), SdkError> {
        self.ensure_open()?;
        lock(&self.camera.shared.pan_tilt).push(PanTiltMove {
            pan,
            pan_speed,
            tilt,
            tilt_speed,
        });
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.stop_streaming() {
            tracing::warn!("mock stream did not stop cleanly: {}", err);
        }
        self.open = false;
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if self.open {
            self.close();
        }
    }
}

fn autoplay(feed: &MockFeed, control: &StreamControl, stop: &AtomicBool, period: Duration) {
    let data = synthetic_frame(control.compression, control.width, control.height);
    while !stop.load(Ordering::SeqCst) {
        match feed.deliver_bytes(&data, control.width, control.height, control.compression) {
            FeedResult::Continue => thread::sleep(period),
            FeedResult::Stopped | FeedResult::NotStreaming => break,
        }
    }
    tracing::debug!("mock stream thread exiting");
}

// 75% color bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS_RGB: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [0, 0, 0],
];

const BARS_YUV: [(u8, u8, u8); 8] = [
    (180, 128, 128),
    (162, 44, 142),
    (131, 156, 44),
    (112, 72, 58),
    (84, 184, 198),
    (65, 100, 212),
    (35, 212, 114),
    (16, 128, 128),
];

fn bar_index(x: u32, width: u32) -> usize {
    ((x / (width / 8).max(1)) as usize).min(7)
}

/// Test pattern in the wire layout of `compression`.
///
/// Color formats get eight vertical bars, gray formats a horizontal ramp,
/// MJPEG a JPEG-encoded copy of the RGB bars.
pub fn synthetic_frame(compression: Compression, width: u32, height: u32) -> Vec<u8> {
    match compression {
        Compression::Yuyv | Compression::Uyvy => {
            let mut data = Vec::with_capacity((width * height * 2) as usize);
            for _ in 0..height {
                for x in (0..width).step_by(2) {
                    let (y, u, v) = BARS_YUV[bar_index(x, width)];
                    if compression == Compression::Yuyv {
                        data.extend_from_slice(&[y, u, y, v]);
                    } else {
                        data.extend_from_slice(&[u, y, v, y]);
                    }
                }
            }
            data
        }
        Compression::Rgb => bars_rgb(width, height).into_raw(),
        Compression::Mjpeg => {
            let mut jpeg = Cursor::new(Vec::new());
            if let Err(err) = bars_rgb(width, height).write_to(&mut jpeg, ImageFormat::Jpeg) {
                tracing::warn!("failed to encode synthetic MJPEG frame: {}", err);
            }
            jpeg.into_inner()
        }
        Compression::Gray8 | Compression::Unsupported => (0..height)
            .flat_map(|_| (0..width).map(move |x| (x * 255 / width.max(1)) as u8))
            .collect(),
        Compression::Gray16 | Compression::Uncompressed => (0..height)
            .flat_map(|_| (0..width).map(move |x| (x * 65_535 / width.max(1)) as u16))
            .flat_map(u16::to_le_bytes)
            .collect(),
    }
}

fn bars_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| Rgb(BARS_RGB[bar_index(x, width)]))
}
