pub mod layout;

use std::fmt::Display;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError};

use crate::acquisition::policy::{self, Verdict};
use crate::acquisition::{end_session, ImageMode};
use crate::descriptor::{ColorLayout, Compression, ElementType};
use crate::error::{FrameError, SdkError};
use crate::output::SharedSink;
use crate::params::ParamId;
use crate::pool::{BufferPool, ImageBuffer, COLOR_MODE_ATTRIBUTE};
use crate::sdk::{ColorConverter, FrameHandler, VendorFrame};
use crate::state::{lock, DriverState, SharedState};
use self::layout::LayoutCheck;

/// Settings snapshot taken under the lock at the start of a frame.
#[derive(Debug, Clone, Copy)]
struct FramePlan {
    layout: ColorLayout,
    element: ElementType,
    unique_id: u64,
}

/// Frame handler registered with the SDK for one session.
pub struct FrameNormalizer {
    state: SharedState,
    pool: Arc<dyn BufferPool>,
    converter: Arc<dyn ColorConverter>,
    sink: SharedSink,
}

impl FrameNormalizer {
    pub fn new(
        state: SharedState,
        pool: Arc<dyn BufferPool>,
        converter: Arc<dyn ColorConverter>,
        sink: SharedSink,
    ) -> Self {
        Self {
            state,
            pool,
            converter,
            sink,
        }
    }

    /// Record the frame and settle the layout. `None` once the session is over.
    fn plan(&self, frame: &VendorFrame<'_>) -> Option<FramePlan> {
        let mut state = lock(&self.state);
        if !state.session.is_active() {
            return None;
        }

        state.session.frames_received += 1;
        let received = state.session.frames_received;
        state.params.set_int(ParamId::NumImagesCounter, received as i64);

        let configured = Compression::from_code(state.params.get_int(ParamId::ImageFormat));
        if configured == Compression::Uncompressed && !state.session.validated_layout {
            validate_layout(&mut state, frame);
        }

        Some(FramePlan {
            layout: ColorLayout::from_code(state.params.get_int(ParamId::ColorMode))
                .unwrap_or(ColorLayout::Mono),
            element: ElementType::from_code(state.params.get_int(ParamId::DataType))
                .unwrap_or(ElementType::UInt8),
            unique_id: received,
        })
    }

    /// Convert `frame` into a pool buffer laid out per `plan`.
    ///
    /// Steps:
    /// 1. Allocate `[w, h]` (mono) or `[3, w, h]` (RGB) from the pool
    /// 2. Mono: copy the vendor bytes verbatim
    /// 3. RGB: run the color converter and copy its output
    ///
    /// On error the buffer goes back to the pool when dropped.
    fn normalize(&self, frame: &VendorFrame<'_>, plan: &FramePlan) -> Result<ImageBuffer, FrameError> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        let dims = match plan.layout {
            ColorLayout::Mono => vec![width, height],
            ColorLayout::Rgb => vec![3, width, height],
        };

        let mut buffer = self
            .pool
            .allocate(&dims, plan.element)
            .ok_or(FrameError::Allocation {
                bytes: dims.iter().product::<usize>() * plan.element.size(),
            })?;

        match plan.layout {
            ColorLayout::Mono => buffer.fill_from_le_bytes(frame.data)?,
            ColorLayout::Rgb => match frame.compression {
                Compression::Mjpeg | Compression::Yuyv | Compression::Uyvy | Compression::Rgb => {
                    let rgb = self.converter.to_rgb(frame)?;
                    buffer.fill_from_le_bytes(&rgb.data)?;
                }
                other => return Err(FrameError::UnsupportedCompression(other)),
            },
        }

        buffer.unique_id = plan.unique_id;
        buffer.timestamp = frame.timestamp;
        buffer.add_attribute(COLOR_MODE_ATTRIBUTE, "Color Mode", plan.layout.code());
        Ok(buffer)
    }

    fn deliver(&self, buffer: ImageBuffer) -> anyhow::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.deliver(buffer)
    }

    /// The session keeps running; only the status shows the dropped frame.
    fn report_dropped(&self, err: &dyn Display) {
        let mut state = lock(&self.state);
        state.params.set_status(&format!("Error: {err}"));
        state.params.publish();
    }

    /// Count the delivered frame and apply the image-mode policy.
    fn record_delivery(&self, width: u32, height: u32, bytes: usize) -> ControlFlow<()> {
        let mut state = lock(&self.state);
        if !state.session.is_active() {
            return ControlFlow::Break(());
        }

        state.session.frames_delivered += 1;
        state.params.increment(ParamId::ArrayCounter);
        state.params.set_int(ParamId::ArraySize, bytes as i64);
        state.params.set_int(ParamId::ArraySizeX, i64::from(width));
        state.params.set_int(ParamId::ArraySizeY, i64::from(height));

        let mode_code = state.params.get_int(ParamId::ImageMode);
        let target = state.params.get_int(ParamId::NumImages).max(0) as u64;
        if let Some(mode) = ImageMode::from_code(mode_code) {
            state.session.mode = mode;
        }
        state.session.target_frame_count = target;

        let flow = match policy::evaluate(mode_code, state.session.frames_delivered, target) {
            Verdict::Continue => ControlFlow::Continue(()),
            Verdict::Complete => {
                tracing::info!(
                    "Acquired {} frame(s), stopping",
                    state.session.frames_delivered
                );
                end_session(&mut state);
                ControlFlow::Break(())
            }
            Verdict::InvalidMode(code) => {
                end_session(&mut state);
                state.report_error("Stopping acquisition", &format!("invalid image mode {code}"));
                ControlFlow::Break(())
            }
        };
        state.params.publish();
        flow
    }
}

impl FrameHandler for FrameNormalizer {
    fn on_frame(&mut self, frame: &VendorFrame<'_>) -> ControlFlow<()> {
        let _span = tracing::debug_span!("frame", seq = frame.sequence).entered();

        let Some(plan) = self.plan(frame) else {
            return ControlFlow::Break(());
        };

        let buffer = match self.normalize(frame, &plan) {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::warn!("Dropping frame {}: {}", frame.sequence, err);
                self.report_dropped(&err);
                return ControlFlow::Continue(());
            }
        };
        let bytes = buffer.total_bytes();

        if let Err(err) = self.deliver(buffer) {
            tracing::warn!("Sink rejected frame {}: {:#}", frame.sequence, err);
            self.report_dropped(&err);
            return ControlFlow::Continue(());
        }

        self.record_delivery(frame.width, frame.height, bytes)
    }

    fn on_stream_error(&mut self, err: &SdkError) {
        let mut state = lock(&self.state);
        if !state.session.is_active() {
            return;
        }
        end_session(&mut state);
        state.report_error("Stream failed", err);
        state.params.publish();
    }
}

/// Check the configured layout against the frame, repairing it if possible.
fn validate_layout(state: &mut DriverState, frame: &VendorFrame<'_>) {
    if state.params.get_int(ParamId::AutoAdjust) == 0 {
        state.session.validated_layout = true;
        return;
    }

    let current_layout = ColorLayout::from_code(state.params.get_int(ParamId::ColorMode))
        .unwrap_or(ColorLayout::Mono);
    let current_element = ElementType::from_code(state.params.get_int(ParamId::DataType))
        .unwrap_or(ElementType::UInt8);
    let configured_size = (
        state.params.get_int(ParamId::SizeX).max(0) as u32,
        state.params.get_int(ParamId::SizeY).max(0) as u32,
    );

    match layout::check(
        current_layout,
        current_element,
        configured_size,
        (frame.width, frame.height),
        frame.data.len(),
    ) {
        LayoutCheck::Matches => state.session.validated_layout = true,
        LayoutCheck::Repaired(new_layout, new_element) => {
            tracing::info!(
                "Frame size does not match {:?}/{:?}, switching to {:?}/{:?}",
                current_layout,
                current_element,
                new_layout,
                new_element
            );
            state.params.set_int(ParamId::ColorMode, new_layout.code());
            state.params.set_int(ParamId::DataType, new_element.code());
            state.session.validated_layout = true;
        }
        LayoutCheck::Unrepairable { bytes_per_pixel } => {
            tracing::warn!(
                "Cannot infer a layout from {} bytes per pixel, will retry",
                bytes_per_pixel
            );
        }
    }
}
