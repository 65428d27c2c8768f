pub mod policy;

use std::fmt;
use std::sync::Arc;

use crate::descriptor::Compression;
use crate::error::{AcquisitionError, SdkError};
use crate::normalize::FrameNormalizer;
use crate::output::SharedSink;
use crate::params::{DetectorStatus, ParamId};
use crate::pool::BufferPool;
use crate::sdk::{ColorConverter, DeviceHandle};
use crate::state::{lock, DriverState, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Negotiating,
    Streaming,
}

/// Frame-count policy of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    Single,
    Multiple,
    Continuous,
}

impl ImageMode {
    pub fn code(self) -> i64 {
        match self {
            ImageMode::Single => 0,
            ImageMode::Multiple => 1,
            ImageMode::Continuous => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ImageMode::Single),
            1 => Some(ImageMode::Multiple),
            2 => Some(ImageMode::Continuous),
            _ => None,
        }
    }
}

impl fmt::Display for ImageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageMode::Single => "single",
            ImageMode::Multiple => "multiple",
            ImageMode::Continuous => "continuous",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for one start-to-stop cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSession {
    pub state: AcquisitionState,
    /// Frames handed to the sink this session.
    pub frames_delivered: u64,
    /// Frames received from the SDK this session, dropped ones included.
    pub frames_received: u64,
    /// Mode and target in force at the last policy decision.
    pub mode: ImageMode,
    pub target_frame_count: u64,
    pub validated_layout: bool,
}

impl Default for AcquisitionSession {
    fn default() -> Self {
        Self {
            state: AcquisitionState::Idle,
            frames_delivered: 0,
            frames_received: 0,
            mode: ImageMode::Continuous,
            target_frame_count: 0,
            validated_layout: false,
        }
    }
}

impl AcquisitionSession {
    pub fn is_active(&self) -> bool {
        self.state == AcquisitionState::Streaming
    }

    fn begin(&mut self) {
        self.state = AcquisitionState::Streaming;
        self.frames_delivered = 0;
        self.frames_received = 0;
        self.validated_layout = false;
    }

    fn end(&mut self) {
        self.state = AcquisitionState::Idle;
        self.validated_layout = false;
    }
}

/// Close the session and clear the acquire flag.
pub(crate) fn end_session(state: &mut DriverState) {
    state.session.end();
    state.params.set_int(ParamId::Acquire, 0);
    state.params.set_detector_status(DetectorStatus::Idle);
    state.params.set_status("Stopped acquisition");
}

/// Mode to stream, as configured in the parameter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub compression: Compression,
    pub width: u32,
    pub height: u32,
    pub frame_rate_hz: i32,
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {} fps",
            self.compression, self.width, self.height, self.frame_rate_hz
        )
    }
}

/// Owns the open device and runs capture sessions on it.
pub struct Acquisition {
    handle: Box<dyn DeviceHandle>,
    state: SharedState,
    pool: Arc<dyn BufferPool>,
    converter: Arc<dyn ColorConverter>,
    sink: SharedSink,
}

impl Acquisition {
    pub fn new(
        handle: Box<dyn DeviceHandle>,
        state: SharedState,
        pool: Arc<dyn BufferPool>,
        converter: Arc<dyn ColorConverter>,
        sink: SharedSink,
    ) -> Self {
        Self {
            handle,
            state,
            pool,
            converter,
            sink,
        }
    }

    pub fn handle(&self) -> &dyn DeviceHandle {
        self.handle.as_ref()
    }

    pub fn state(&self) -> AcquisitionState {
        lock(&self.state).session.state
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).session.is_active()
    }

    /// Negotiate `request` and begin streaming into a fresh frame normalizer.
    pub fn start(&mut self, request: StreamRequest) -> Result<(), AcquisitionError> {
        let _span = tracing::debug_span!("start", %request).entered();

        if request.compression == Compression::Unsupported {
            let mut state = lock(&self.state);
            state.params.set_int(ParamId::Acquire, 0);
            let err = AcquisitionError::UnsupportedCompression;
            state.report_error("Cannot start acquisition", &err);
            return Err(err);
        }

        {
            let mut state = lock(&self.state);
            if state.session.is_active() {
                tracing::warn!("Acquisition already running");
                return Ok(());
            }
            state.session.state = AcquisitionState::Negotiating;
        }

        // a session that ended through its mode policy leaves a finished stream behind
        if let Err(err) = self.handle.stop_streaming() {
            tracing::warn!("Failed to reap previous stream: {}", err);
        }

        let control = match self.handle.negotiate_stream(
            request.compression,
            request.width,
            request.height,
            request.frame_rate_hz,
        ) {
            Ok(control) => control,
            Err(err) => return Err(self.abort(AcquisitionError::Negotiation(err))),
        };

        {
            let mut state = lock(&self.state);
            state.session.begin();
            state.params.set_int(ParamId::NumImagesCounter, 0);
            state.params.set_int(ParamId::ArrayCounter, 0);
            state.params.set_int(ParamId::Acquire, 1);
            state.params.set_detector_status(DetectorStatus::Acquire);
            state.params.set_status("Acquiring");
        }

        let normalizer = FrameNormalizer::new(
            Arc::clone(&self.state),
            Arc::clone(&self.pool),
            Arc::clone(&self.converter),
            Arc::clone(&self.sink),
        );
        if let Err(err) = self.handle.start_streaming(&control, Box::new(normalizer)) {
            return Err(self.abort(AcquisitionError::Streaming(err)));
        }

        tracing::info!("Started acquisition: {}", request);
        Ok(())
    }

    fn abort(&self, err: AcquisitionError) -> AcquisitionError {
        let mut state = lock(&self.state);
        state.session.end();
        state.params.set_int(ParamId::Acquire, 0);
        state.report_error("Failed to start acquisition", &err);
        err
    }

    /// Stop streaming and wait for the last frame callback to return.
    ///
    /// Stopping an idle acquisition does nothing.
    pub fn stop(&mut self) -> Result<(), SdkError> {
        if !self.is_active() {
            if let Err(err) = self.handle.stop_streaming() {
                tracing::warn!("Failed to reap finished stream: {}", err);
            }
            return Ok(());
        }

        let result = self.handle.stop_streaming();

        let mut state = lock(&self.state);
        end_session(&mut state);
        if let Err(err) = &result {
            state.report_error("Failed to stop streaming", err);
        }
        tracing::info!("Stopped acquisition");
        result
    }

    /// Stop any stream and close the device.
    pub fn close(mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!("Error while stopping before close: {}", err);
        }
        self.handle.close();
    }
}
