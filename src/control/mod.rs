mod dispatch;

pub use dispatch::Handler;

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::acquisition::{Acquisition, AcquisitionSession, ImageMode, StreamRequest};
use crate::catalog::{build_catalog, Catalog};
use crate::config::DriverConfig;
use crate::descriptor::{Compression, StreamDescriptor};
use crate::error::{ControlError, SdkError};
use crate::output::SharedSink;
use crate::params::{DetectorStatus, Listener, ParamId, ParamStore, ParamValue};
use crate::pool::{BufferPool, HeapPool};
use crate::sdk::{ColorConverter, ControlKind, DeviceInfo, DeviceSdk, SoftwareConverter};
use crate::state::{self, lock, DriverState, SharedState};

/// Frames requested by a Multiple-mode write of `ImageMode`.
pub const MULTIPLE_DEFAULT_IMAGES: i64 = 300;

/// Camera properties read back on connect.
const PROPERTY_PARAMS: [(ParamId, ControlKind); 9] = [
    (ParamId::Gain, ControlKind::Gain),
    (ParamId::Gamma, ControlKind::Gamma),
    (ParamId::BacklightCompensation, ControlKind::BacklightCompensation),
    (ParamId::Brightness, ControlKind::Brightness),
    (ParamId::Contrast, ControlKind::Contrast),
    (ParamId::PowerLine, ControlKind::PowerLineFrequency),
    (ParamId::Hue, ControlKind::Hue),
    (ParamId::Saturation, ControlKind::Saturation),
    (ParamId::Sharpness, ControlKind::Sharpness),
];

/// Exposure is set in 100 µs units.
const EXPOSURE_UNITS_PER_SECOND: f64 = 10_000.0;

#[derive(Debug, Clone, Copy)]
struct ZoomRange {
    min: i32,
    max: i32,
    step: i32,
}

pub struct CameraControl {
    sdk: Box<dyn DeviceSdk>,
    config: DriverConfig,
    state: SharedState,
    pool: Arc<dyn BufferPool>,
    converter: Arc<dyn ColorConverter>,
    sink: SharedSink,
    acquisition: Option<Acquisition>,
    catalog: Catalog,
    zoom: Option<ZoomRange>,
}

impl CameraControl {
    pub fn new(sdk: Box<dyn DeviceSdk>, config: DriverConfig, sink: SharedSink) -> Self {
        let mut params = ParamStore::new();
        let (layout, element) = config.compression.canonical();
        params.set_int(ParamId::SizeX, i64::from(config.size_x));
        params.set_int(ParamId::SizeY, i64::from(config.size_y));
        params.set_int(ParamId::FrameRate, i64::from(config.frame_rate));
        params.set_int(ParamId::ImageFormat, config.compression.code());
        params.set_int(ParamId::ColorMode, layout.code());
        params.set_int(ParamId::DataType, element.code());
        params.set_int(ParamId::ImageMode, config.image_mode.code());
        params.set_int(ParamId::NumImages, 1);
        params.set_int(ParamId::AutoAdjust, i64::from(config.auto_adjust));
        params.set_int(ParamId::CameraFormat, 0);
        params.set_int(ParamId::ApplyFormat, 0);
        params.set_int(ParamId::Acquire, 0);
        params.set_int(ParamId::PanSpeed, 1);
        params.set_int(ParamId::TiltSpeed, 1);
        params.set_float(ParamId::PanTiltStep, config.pan_tilt_step);
        params.set_detector_status(DetectorStatus::Idle);
        params.set_status("Disconnected");

        let pool: Arc<dyn BufferPool> = Arc::new(HeapPool::new(config.max_buffers, config.max_memory));
        Self {
            sdk,
            config,
            state: state::new_shared(DriverState {
                params,
                session: AcquisitionSession::default(),
            }),
            pool,
            converter: Arc::new(SoftwareConverter),
            sink,
            acquisition: None,
            catalog: Catalog::new(),
            zoom: None,
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn ColorConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, SdkError> {
        self.sdk.enumerate()
    }

    pub fn is_connected(&self) -> bool {
        self.acquisition.is_some()
    }

    /// Open the configured device, read its identity and controls and build
    /// the format catalog.
    pub fn connect(&mut self) -> Result<(), ControlError> {
        let _span = tracing::debug_span!("connect", device = %self.config.selector).entered();
        if self.is_connected() {
            self.disconnect()?;
        }

        let handle = match self.sdk.open(&self.config.selector) {
            Ok(handle) => handle,
            Err(err) => {
                lock(&self.state).report_error("Failed to open camera", &err);
                return Err(err.into());
            }
        };
        let info = handle.info().clone();
        tracing::info!("Connected to {}", info);

        let catalog_error = match build_catalog(handle.as_ref()) {
            Ok(catalog) => {
                self.catalog = catalog;
                None
            }
            Err(err) => {
                self.catalog = Catalog::new();
                Some(err)
            }
        };

        let exposure = handle.get_control(ControlKind::Exposure);
        let properties: Vec<(ParamId, i32)> = PROPERTY_PARAMS
            .iter()
            .filter_map(|&(param, kind)| match handle.get_control(kind) {
                Ok(value) => Some((param, value)),
                Err(err) => {
                    tracing::debug!("{:?} not available: {}", kind, err);
                    None
                }
            })
            .collect();

        self.zoom = match handle.control_range(ControlKind::ZoomAbsolute) {
            Ok((min, max)) => Some(ZoomRange {
                min,
                max,
                step: ((max - min) / self.config.zoom_steps.max(1)).max(1),
            }),
            Err(err) => {
                tracing::debug!("zoom not available: {}", err);
                None
            }
        };

        {
            let mut state = lock(&self.state);
            let params = &mut state.params;
            params.set_text(ParamId::Manufacturer, info.manufacturer.clone().unwrap_or_default());
            params.set_text(ParamId::SerialNumber, info.serial_number.clone().unwrap_or_default());
            params.set_text(ParamId::Model, info.product.clone().unwrap_or_default());
            params.set_int(ParamId::UvcCompliance, i64::from(info.uvc_compliance));
            params.set_text(ParamId::SdkVersion, self.sdk.version());
            if let Some((width, height)) = self.catalog.max_size() {
                params.set_int(ParamId::MaxSizeX, i64::from(width));
                params.set_int(ParamId::MaxSizeY, i64::from(height));
            }
            if let Some(entry) = self.catalog.get(0) {
                params.set_text(ParamId::FormatDescription, entry.description());
            }
            if let Ok(units) = exposure {
                params.set_float(ParamId::Exposure, f64::from(units) / EXPOSURE_UNITS_PER_SECOND);
            }
            for (param, value) in properties {
                if param == ParamId::Gain {
                    params.set_float(param, f64::from(value));
                } else {
                    params.set_int(param, i64::from(value));
                }
            }
            params.set_status("Connected");
            if let Some(err) = &catalog_error {
                state.report_error("Failed to build format catalog", err);
            }
            state.params.publish();
        }

        self.acquisition = Some(Acquisition::new(
            handle,
            Arc::clone(&self.state),
            Arc::clone(&self.pool),
            Arc::clone(&self.converter),
            Arc::clone(&self.sink),
        ));
        Ok(())
    }

    /// Stop any acquisition and close the device.
    pub fn disconnect(&mut self) -> Result<(), ControlError> {
        if let Some(acquisition) = self.acquisition.take() {
            acquisition.close();
            tracing::info!("Disconnected");
        }
        self.with_params(|params| params.set_status("Disconnected"));
        Ok(())
    }

    fn acquisition(&self) -> Result<&Acquisition, ControlError> {
        self.acquisition.as_ref().ok_or(ControlError::NotConnected)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Valid catalog entry at `index`.
    pub fn catalog_entry(&self, index: i64) -> Result<&StreamDescriptor, ControlError> {
        let slot = usize::try_from(index)
            .ok()
            .and_then(|slot| self.catalog.get(slot).map(|entry| (slot, entry)));
        match slot {
            Some((slot, entry)) if entry.is_unused() => Err(ControlError::UnusedCatalogEntry(slot)),
            Some((_, entry)) => Ok(entry),
            None => Err(ControlError::InvalidCatalogIndex(index)),
        }
    }

    /// Make catalog slot `index` the selected entry.
    pub fn select_catalog_entry(&mut self, index: i64) -> Result<(), ControlError> {
        let entry = usize::try_from(index)
            .ok()
            .and_then(|slot| self.catalog.get(slot))
            .ok_or(ControlError::InvalidCatalogIndex(index))?;

        let description = entry.description().to_owned();
        self.with_params(|params| {
            params.set_int(ParamId::CameraFormat, index);
            params.set_text(ParamId::FormatDescription, description);
            params.set_status("Updated format desc.");
        });
        Ok(())
    }

    /// Copy the selected catalog entry into the stream parameters.
    ///
    /// An unused entry leaves the configuration as it is.
    pub fn apply_selected_entry(&mut self) -> Result<(), ControlError> {
        self.stop_if_acquiring()?;

        let index = lock(&self.state).params.get_int(ParamId::CameraFormat);
        let entry = usize::try_from(index)
            .ok()
            .and_then(|slot| self.catalog.get(slot))
            .cloned();

        let mut state = lock(&self.state);
        match entry {
            Some(entry) if !entry.is_unused() => {
                let params = &mut state.params;
                params.set_int(ParamId::DataType, entry.element_type().code());
                params.set_int(ParamId::ColorMode, entry.color_layout().code());
                params.set_int(ParamId::FrameRate, i64::from(entry.frame_rate_hz()));
                params.set_int(ParamId::SizeX, i64::from(entry.width()));
                params.set_int(ParamId::SizeY, i64::from(entry.height()));
                params.set_int(ParamId::ImageFormat, entry.compression().code());
                tracing::info!("Applied camera format {}: {}", index, entry);
            }
            _ => tracing::error!("Camera format {} is not in use, nothing applied", index),
        }
        state.params.set_int(ParamId::ApplyFormat, 0);
        state.params.set_status("Applied format");
        Ok(())
    }

    /// Set the stream parameters by hand.
    pub fn configure_stream(&mut self, request: StreamRequest) -> Result<(), ControlError> {
        self.stop_if_acquiring()?;
        let (layout, element) = request.compression.canonical();
        self.with_params(|params| {
            params.set_int(ParamId::ImageFormat, request.compression.code());
            params.set_int(ParamId::ColorMode, layout.code());
            params.set_int(ParamId::DataType, element.code());
            params.set_int(ParamId::SizeX, i64::from(request.width));
            params.set_int(ParamId::SizeY, i64::from(request.height));
            params.set_int(ParamId::FrameRate, i64::from(request.frame_rate_hz));
        });
        Ok(())
    }

    /// Stream settings currently in the parameter store.
    pub fn stream_request(&self) -> StreamRequest {
        let state = lock(&self.state);
        StreamRequest {
            compression: Compression::from_code(state.params.get_int(ParamId::ImageFormat)),
            width: state.params.get_int(ParamId::SizeX).max(0) as u32,
            height: state.params.get_int(ParamId::SizeY).max(0) as u32,
            frame_rate_hz: state.params.get_int(ParamId::FrameRate) as i32,
        }
    }

    /// Start acquiring with the configured stream settings.
    pub fn start(&mut self) -> Result<(), ControlError> {
        let request = self.stream_request();
        let acquisition = self.acquisition.as_mut().ok_or(ControlError::NotConnected)?;
        acquisition.start(request)?;
        Ok(())
    }

    /// Set the image mode and frame count, then start.
    pub fn acquire(&mut self, mode: ImageMode, count: u64) -> Result<(), ControlError> {
        self.write_int(ParamId::ImageMode, mode.code())?;
        if mode == ImageMode::Multiple {
            self.write_int(ParamId::NumImages, i64::try_from(count).unwrap_or(i64::MAX))?;
        }
        self.write_int(ParamId::Acquire, 1)
    }

    pub fn stop(&mut self) -> Result<(), ControlError> {
        match self.acquisition.as_mut() {
            Some(acquisition) => Ok(acquisition.stop()?),
            None => Ok(()),
        }
    }

    fn stop_if_acquiring(&mut self) -> Result<(), ControlError> {
        if self.is_acquiring() {
            self.stop()?;
        }
        Ok(())
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(Acquisition::is_active)
    }

    /// Poll until the session has ended. Returns `false` on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_acquiring() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    pub fn session(&self) -> AcquisitionSession {
        lock(&self.state).session.clone()
    }

    pub(crate) fn change_image_mode(&mut self, code: i64) -> Result<(), ControlError> {
        let mode = ImageMode::from_code(code).ok_or(ControlError::UnsupportedMode(code))?;
        self.with_params(|params| match mode {
            ImageMode::Single => params.set_int(ParamId::NumImages, 1),
            ImageMode::Multiple => params.set_int(ParamId::NumImages, MULTIPLE_DEFAULT_IMAGES),
            ImageMode::Continuous => {}
        });
        Ok(())
    }

    /// Store an integer parameter and run its side effect.
    pub fn write_int(&mut self, id: ParamId, value: i64) -> Result<(), ControlError> {
        let handler = dispatch::lookup(id);
        if let Some(Handler::Float(_)) = handler {
            return self.finish_write(id, Err(ControlError::WrongValueType(id)));
        }
        if dispatch::stops_acquisition(id) {
            if let Err(err) = self.stop_if_acquiring() {
                return self.finish_write(id, Err(err));
            }
        }

        self.with_params(|params| params.set_int(id, value));
        let result = match handler {
            Some(Handler::Int(handler)) => handler(self, value),
            _ => Ok(()),
        };
        self.finish_write(id, result)
    }

    /// Store a float parameter and run its side effect.
    pub fn write_float(&mut self, id: ParamId, value: f64) -> Result<(), ControlError> {
        let handler = dispatch::lookup(id);
        if let Some(Handler::Int(_)) = handler {
            return self.finish_write(id, Err(ControlError::WrongValueType(id)));
        }
        if dispatch::stops_acquisition(id) {
            if let Err(err) = self.stop_if_acquiring() {
                return self.finish_write(id, Err(err));
            }
        }

        self.with_params(|params| params.set_float(id, value));
        let result = match handler {
            Some(Handler::Float(handler)) => handler(self, value),
            _ => Ok(()),
        };
        self.finish_write(id, result)
    }

    fn finish_write(
        &self,
        id: ParamId,
        result: Result<(), ControlError>,
    ) -> Result<(), ControlError> {
        let mut state = lock(&self.state);
        if let Err(err) = &result {
            state.report_error(&format!("Writing {id}"), err);
        }
        state.params.publish();
        result
    }

    /// Pass a property value straight to the camera.
    pub fn set_property(&mut self, kind: ControlKind, value: i64) -> Result<(), ControlError> {
        let value = value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.acquisition()?.handle().set_control(kind, value)?;
        tracing::debug!("{:?} set to {}", kind, value);
        Ok(())
    }

    pub fn set_exposure(&mut self, seconds: f64) -> Result<(), ControlError> {
        let units = (seconds * EXPOSURE_UNITS_PER_SECOND).round() as i64;
        self.set_property(ControlKind::Exposure, units)
    }

    /// Move one pan/tilt step: start moving, wait `PanTiltStep` seconds, halt.
    pub fn pan_tilt(&mut self, pan: i8, tilt: i8) -> Result<(), ControlError> {
        let (pan_speed, tilt_speed, step) = {
            let state = lock(&self.state);
            (
                state.params.get_int(ParamId::PanSpeed).clamp(0, i64::from(u8::MAX)) as u8,
                state.params.get_int(ParamId::TiltSpeed).clamp(0, i64::from(u8::MAX)) as u8,
                state.params.get_float(ParamId::PanTiltStep).max(0.0),
            )
        };

        let handle = self.acquisition()?.handle();
        handle.pan_tilt_relative(pan, pan_speed, tilt, tilt_speed)?;
        thread::sleep(Duration::from_secs_f64(step));
        handle.pan_tilt_relative(0, 0, 0, 0)?;
        Ok(())
    }

    /// Step the absolute zoom by one increment, clamped to the device range.
    pub fn zoom(&mut self, direction: i32) -> Result<(), ControlError> {
        let range = self
            .zoom
            .ok_or_else(|| SdkError::not_supported("zoom control"))?;
        let handle = self.acquisition()?.handle();
        let current = handle.get_control(ControlKind::ZoomAbsolute)?;
        let target = current
            .saturating_add(direction.saturating_mul(range.step))
            .clamp(range.min, range.max);
        handle.set_control(ControlKind::ZoomAbsolute, target)?;
        tracing::debug!("zoom {} -> {}", current, target);
        Ok(())
    }

    pub(crate) fn with_params<R>(&self, f: impl FnOnce(&mut ParamStore) -> R) -> R {
        f(&mut lock(&self.state).params)
    }

    pub fn param(&self, id: ParamId) -> Option<ParamValue> {
        lock(&self.state).params.get(id).cloned()
    }

    pub fn param_int(&self, id: ParamId) -> i64 {
        lock(&self.state).params.get_int(id)
    }

    pub fn param_float(&self, id: ParamId) -> f64 {
        lock(&self.state).params.get_float(id)
    }

    pub fn param_text(&self, id: ParamId) -> String {
        lock(&self.state).params.get_text(id).to_owned()
    }

    pub fn status(&self) -> String {
        self.param_text(ParamId::StatusMessage)
    }

    pub fn subscribe(&self, listener: Listener) {
        lock(&self.state).params.subscribe(listener);
    }

    /// Human-readable summary of the driver and device.
    pub fn report(&self, out: &mut dyn Write, details: u32) -> io::Result<()> {
        let state = lock(&self.state);
        let params = &state.params;

        writeln!(out, "UVC camera driver")?;
        writeln!(out, "  SDK version:      {}", params.get_text(ParamId::SdkVersion))?;
        if details == 0 {
            return Ok(());
        }

        match self.acquisition.as_ref().map(Acquisition::handle) {
            Some(handle) => {
                let info = handle.info();
                writeln!(out, "  Device:           {}", info)?;
                writeln!(out, "  Manufacturer:     {}", params.get_text(ParamId::Manufacturer))?;
                writeln!(out, "  Model:            {}", params.get_text(ParamId::Model))?;
                writeln!(out, "  Serial number:    {}", params.get_text(ParamId::SerialNumber))?;
                writeln!(out, "  UVC compliance:   {:#06x}", params.get_int(ParamId::UvcCompliance))?;
            }
            None => writeln!(out, "  Device:           not connected")?,
        }
        writeln!(
            out,
            "  Image format:     {}",
            Compression::from_code(params.get_int(ParamId::ImageFormat))
        )?;
        writeln!(out, "  Frame rate:       {} fps", params.get_int(ParamId::FrameRate))?;
        writeln!(
            out,
            "  Size:             {}x{}",
            params.get_int(ParamId::SizeX),
            params.get_int(ParamId::SizeY)
        )?;

        if details > 1 {
            writeln!(out, "  Camera formats:")?;
            for (index, entry) in self.catalog.slots().iter().enumerate() {
                writeln!(out, "    [{}] {}", index, entry)?;
            }
        }
        Ok(())
    }
}

impl Drop for CameraControl {
    fn drop(&mut self) {
        if let Some(acquisition) = self.acquisition.take() {
            acquisition.close();
        }
    }
}
