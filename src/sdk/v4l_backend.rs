use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use super::{
    CapabilityTree, ControlKind, DescriptorSubtype, DeviceHandle, DeviceInfo, DeviceSdk,
    DeviceSelector, FormatDescriptor, FrameDescriptor, FrameHandler, StreamControl,
    StreamingInterface, VendorFrame,
};
use crate::descriptor::Compression;
use crate::error::{SdkError, SdkErrorKind};

const BUFFER_COUNT: u32 = 4;
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

// V4L2 control ids (linux/v4l2-controls.h)
const CID_BRIGHTNESS: u32 = 0x0098_0900;
const CID_CONTRAST: u32 = 0x0098_0901;
const CID_SATURATION: u32 = 0x0098_0902;
const CID_HUE: u32 = 0x0098_0903;
const CID_GAMMA: u32 = 0x0098_0910;
const CID_GAIN: u32 = 0x0098_0913;
const CID_POWER_LINE_FREQUENCY: u32 = 0x0098_0918;
const CID_SHARPNESS: u32 = 0x0098_091b;
const CID_BACKLIGHT_COMPENSATION: u32 = 0x0098_091c;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const CID_ZOOM_ABSOLUTE: u32 = 0x009a_090d;
const CID_PAN_SPEED: u32 = 0x009a_0920;
const CID_TILT_SPEED: u32 = 0x009a_0921;

fn control_id(control: ControlKind) -> u32 {
    match control {
        ControlKind::Exposure => CID_EXPOSURE_ABSOLUTE,
        ControlKind::Gain => CID_GAIN,
        ControlKind::Gamma => CID_GAMMA,
        ControlKind::BacklightCompensation => CID_BACKLIGHT_COMPENSATION,
        ControlKind::Brightness => CID_BRIGHTNESS,
        ControlKind::Contrast => CID_CONTRAST,
        ControlKind::PowerLineFrequency => CID_POWER_LINE_FREQUENCY,
        ControlKind::Hue => CID_HUE,
        ControlKind::Saturation => CID_SATURATION,
        ControlKind::Sharpness => CID_SHARPNESS,
        ControlKind::ZoomAbsolute => CID_ZOOM_ABSOLUTE,
    }
}

fn subtype_for(fourcc: &[u8; 4]) -> DescriptorSubtype {
    match fourcc {
        b"MJPG" | b"JPEG" => DescriptorSubtype::Mjpeg,
        b"H264" | b"HEVC" | b"VP80" | b"VP90" => DescriptorSubtype::FrameBased,
        _ => DescriptorSubtype::Uncompressed,
    }
}

fn compression_for(fourcc: &[u8; 4]) -> Compression {
    match fourcc {
        b"MJPG" | b"JPEG" => Compression::Mjpeg,
        b"YUYV" => Compression::Yuyv,
        b"UYVY" => Compression::Uyvy,
        b"RGB3" => Compression::Rgb,
        b"GREY" => Compression::Gray8,
        b"Y16 " => Compression::Gray16,
        _ => Compression::Uncompressed,
    }
}

fn fourcc_for(compression: Compression) -> Option<[u8; 4]> {
    match compression {
        Compression::Mjpeg => Some(*b"MJPG"),
        Compression::Yuyv => Some(*b"YUYV"),
        Compression::Uyvy => Some(*b"UYVY"),
        Compression::Rgb => Some(*b"RGB3"),
        Compression::Gray8 => Some(*b"GREY"),
        Compression::Gray16 => Some(*b"Y16 "),
        Compression::Uncompressed | Compression::Unsupported => None,
    }
}

/// Frame interval in 100 ns units from a V4L2 fraction (seconds per frame).
fn interval_100ns(numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (u64::from(numerator) * 10_000_000 / u64::from(denominator)) as u32
}

/// USB attribute of the device behind `/dev/video{index}`.
fn usb_attribute(index: usize, name: &str) -> Option<String> {
    let path = PathBuf::from(format!("/sys/class/video4linux/video{index}/device/../{name}"));
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn usb_hex_attribute(index: usize, name: &str) -> u16 {
    usb_attribute(index, name)
        .and_then(|value| u16::from_str_radix(&value, 16).ok())
        .unwrap_or(0)
}

fn device_info(index: usize, device: &Device) -> Result<DeviceInfo, SdkError> {
    let caps = device.query_caps()?;
    Ok(DeviceInfo {
        index,
        vendor_id: usb_hex_attribute(index, "idVendor"),
        product_id: usb_hex_attribute(index, "idProduct"),
        serial_number: usb_attribute(index, "serial"),
        manufacturer: usb_attribute(index, "manufacturer"),
        product: usb_attribute(index, "product").or(Some(caps.card)),
        // bcdUVC is not exported through V4L2
        uvc_compliance: 0,
        bus_info: caps.bus,
    })
}

/// Device SDK on top of the `v4l` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lSdk;

impl V4lSdk {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceSdk for V4lSdk {
    fn version(&self) -> String {
        "v4l2 0.14".to_owned()
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, SdkError> {
        let mut devices = Vec::new();
        for node in v4l::context::enum_devices() {
            let index = node.index();
            let device = match Device::new(index) {
                Ok(device) => device,
                Err(err) => {
                    tracing::debug!("skipping /dev/video{}: {}", index, err);
                    continue;
                }
            };
            let caps = device.query_caps()?;
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            devices.push(device_info(index, &device)?);
        }
        Ok(devices)
    }

    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn DeviceHandle>, SdkError> {
        let info = match selector {
            DeviceSelector::Index(index) => device_info(*index, &Device::new(*index)?)?,
            _ => self
                .enumerate()?
                .into_iter()
                .find(|info| selector.matches(info))
                .ok_or_else(|| {
                    SdkError::new(SdkErrorKind::NoDevice, format!("no camera with {selector}"))
                })?,
        };

        let device = Device::new(info.index)?;
        tracing::info!("Opened {}", info);
        Ok(Box::new(V4lHandle {
            device: Arc::new(device),
            info,
            open: true,
            worker: None,
        }))
    }
}

struct StreamWorker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Opened V4L2 camera.
pub struct V4lHandle {
    device: Arc<Device>,
    info: DeviceInfo,
    open: bool,
    worker: Option<StreamWorker>,
}

impl V4lHandle {
    fn ensure_open(&self) -> Result<(), SdkError> {
        if self.open {
            Ok(())
        } else {
            Err(SdkError::new(SdkErrorKind::NoDevice, "device is closed"))
        }
    }

    fn frames_for(&self, fourcc: FourCC) -> Result<Vec<FrameDescriptor>, SdkError> {
        let mut frames = Vec::new();
        for size in self.device.enum_framesizes(fourcc)? {
            let FrameSizeEnum::Discrete(discrete) = size.size else {
                tracing::debug!("ignoring stepwise frame sizes for {}", fourcc);
                continue;
            };

            let intervals: Vec<u32> = self
                .device
                .enum_frameintervals(fourcc, discrete.width, discrete.height)?
                .into_iter()
                .map(|interval| match interval.interval {
                    FrameIntervalEnum::Discrete(frac) => {
                        interval_100ns(frac.numerator, frac.denominator)
                    }
                    FrameIntervalEnum::Stepwise(step) => {
                        interval_100ns(step.min.numerator, step.min.denominator)
                    }
                })
                .collect();

            frames.push(FrameDescriptor {
                width: discrete.width,
                height: discrete.height,
                default_frame_interval: intervals.first().copied().unwrap_or(0),
                frame_intervals: intervals,
            });
        }
        Ok(frames)
    }

    /// First advertised uncompressed pixel format offering `width`x`height`.
    fn uncompressed_fourcc(&self, width: u32, height: u32) -> Result<[u8; 4], SdkError> {
        let tree = self.capability_tree()?;
        tree.interfaces
            .iter()
            .flat_map(|interface| &interface.formats)
            .filter(|format| format.subtype == DescriptorSubtype::Uncompressed)
            .find(|format| {
                format
                    .frames
                    .iter()
                    .any(|frame| frame.width == width && frame.height == height)
            })
            .and_then(|format| format.fourcc)
            .ok_or_else(|| {
                SdkError::new(
                    SdkErrorKind::InvalidMode,
                    format!("no uncompressed format at {width}x{height}"),
                )
            })
    }
}

impl DeviceHandle for V4lHandle {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn capability_tree(&self) -> Result<CapabilityTree, SdkError> {
        self.ensure_open()?;
        let mut formats = Vec::new();
        for description in self.device.enum_formats()? {
            let fourcc = description.fourcc.repr;
            formats.push(FormatDescriptor {
                subtype: subtype_for(&fourcc),
                fourcc: Some(fourcc),
                frames: self.frames_for(description.fourcc)?,
            });
        }

        Ok(CapabilityTree {
            interfaces: vec![StreamingInterface { number: 0, formats }],
        })
    }

    fn negotiate_stream(
        &mut self,
        compression: Compression,
        width: u32,
        height: u32,
        frame_rate_hz: i32,
    ) -> Result<StreamControl, SdkError> {
        self.ensure_open()?;
        if frame_rate_hz <= 0 {
            return Err(SdkError::new(
                SdkErrorKind::InvalidParam,
                format!("frame rate {frame_rate_hz}"),
            ));
        }

        let fourcc = match fourcc_for(compression) {
            Some(fourcc) => fourcc,
            None if compression == Compression::Uncompressed => {
                self.uncompressed_fourcc(width, height)?
            }
            None => return Err(SdkError::not_supported(format!("{compression} streaming"))),
        };

        let requested = Format::new(width, height, FourCC::new(&fourcc));
        let format = self.device.set_format(&requested)?;
        if format.width != width || format.height != height || format.fourcc.repr != fourcc {
            return Err(SdkError::new(
                SdkErrorKind::InvalidMode,
                format!(
                    "device picked {} {}x{} instead of {} {}x{}",
                    format.fourcc,
                    format.width,
                    format.height,
                    FourCC::new(&fourcc),
                    width,
                    height
                ),
            ));
        }

        let params = self
            .device
            .set_params(&Parameters::with_fps(frame_rate_hz as u32))?;
        tracing::debug!("negotiated {} {}x{} ({:?})", format.fourcc, width, height, params.interval);

        Ok(StreamControl {
            compression,
            fourcc,
            width,
            height,
            frame_rate_hz,
        })
    }

    fn start_streaming(
        &mut self,
        control: &StreamControl,
        handler: Box<dyn FrameHandler>,
    ) -> Result<(), SdkError> {
        self.ensure_open()?;
        if self.is_streaming() {
            return Err(SdkError::new(
                SdkErrorKind::CallbackExists,
                "stream already running",
            ));
        }
        // reap a stream that ended on its own
        self.stop_streaming()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (init_tx, init_rx) = mpsc::sync_channel(1);
        let thread = thread::Builder::new()
            .name("uvc-stream".to_owned())
            .spawn({
                let device = Arc::clone(&self.device);
                let stop = Arc::clone(&stop);
                let control = control.clone();
                move || stream_loop(&device, &control, handler, &stop, &init_tx)
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker { stop, thread });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(SdkError::new(
                    SdkErrorKind::Other,
                    "stream thread exited before starting",
                ))
            }
        }
    }

    fn stop_streaming(&mut self) -> Result<(), SdkError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::SeqCst);
        worker
            .thread
            .join()
            .map_err(|_| SdkError::new(SdkErrorKind::Other, "stream thread panicked"))
    }

    fn is_streaming(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.thread.is_finished())
    }

    fn get_control(&self, control: ControlKind) -> Result<i32, SdkError> {
        self.ensure_open()?;
        match self.device.control(control_id(control))?.value {
            Value::Integer(value) => Ok(value as i32),
            Value::Boolean(value) => Ok(i32::from(value)),
            other => Err(SdkError::not_supported(format!(
                "{control:?} has non-integer value {other:?}"
            ))),
        }
    }

    fn set_control(&self, control: ControlKind, value: i32) -> Result<(), SdkError> {
        self.ensure_open()?;
        self.device.set_control(Control {
            id: control_id(control),
            value: Value::Integer(i64::from(value)),
        })?;
        Ok(())
    }

    fn control_range(&self, control: ControlKind) -> Result<(i32, i32), SdkError> {
        self.ensure_open()?;
        let id = control_id(control);
        self.device
            .query_controls()?
            .into_iter()
            .find(|description| description.id == id)
            .map(|description| (description.minimum as i32, description.maximum as i32))
            .ok_or_else(|| SdkError::not_supported(format!("{control:?} range")))
    }

    fn pan_tilt_relative(
        &self,
        pan: i8,
        pan_speed: u8,
        tilt: i8,
        tilt_speed: u8,
    ) -> Result<(), SdkError> {
        self.ensure_open()?;
        for (id, direction, speed) in [(CID_PAN_SPEED, pan, pan_speed), (CID_TILT_SPEED, tilt, tilt_speed)] {
            self.device.set_control(Control {
                id,
                value: Value::Integer(i64::from(direction) * i64::from(speed)),
            })?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.stop_streaming() {
            tracing::warn!("stream did not stop cleanly: {}", err);
        }
        self.open = false;
    }
}

impl Drop for V4lHandle {
    fn drop(&mut self) {
        if self.open {
            self.close();
        }
    }
}

fn stream_loop(
    device: &Device,
    control: &StreamControl,
    mut handler: Box<dyn FrameHandler>,
    stop: &AtomicBool,
    init_tx: &mpsc::SyncSender<Result<(), SdkError>>,
) {
    let mut stream = match Stream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = init_tx.send(Err(err.into()));
            return;
        }
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);
    let _ = init_tx.send(Ok(()));

    let compression = compression_for(&control.fourcc);
    while !stop.load(Ordering::SeqCst) {
        let (buf, meta) = match CaptureStream::next(&mut stream) {
            Ok(frame) => frame,
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(err) => {
                tracing::error!("stream error: {}", err);
                handler.on_stream_error(&SdkError::from(err));
                break;
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let frame = VendorFrame {
            data: &buf[..used],
            width: control.width,
            height: control.height,
            compression,
            sequence: meta.sequence,
            timestamp: SystemTime::now(),
        };
        if handler.on_frame(&frame).is_break() {
            tracing::debug!("frame handler ended the stream");
            break;
        }
    }
}
