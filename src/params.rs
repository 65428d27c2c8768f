use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Longest status message kept, in characters.
pub const STATUS_MAX_CHARS: usize = 24;

/// Named driver parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamId {
    // geometry and format
    SizeX,
    SizeY,
    MaxSizeX,
    MaxSizeY,
    FrameRate,
    ImageFormat,
    ColorMode,
    DataType,
    CameraFormat,
    FormatDescription,
    ApplyFormat,
    AutoAdjust,

    // acquisition
    ImageMode,
    NumImages,
    NumImagesCounter,
    ArrayCounter,
    ArraySize,
    ArraySizeX,
    ArraySizeY,
    Acquire,
    DetectorStatus,
    StatusMessage,

    // device information
    Manufacturer,
    SerialNumber,
    Model,
    UvcCompliance,
    SdkVersion,

    // camera properties
    Exposure,
    Gain,
    Gamma,
    BacklightCompensation,
    Brightness,
    Contrast,
    PowerLine,
    Hue,
    Saturation,
    Sharpness,

    // pan / tilt / zoom
    PanLeft,
    PanRight,
    TiltUp,
    TiltDown,
    ZoomIn,
    ZoomOut,
    PanSpeed,
    TiltSpeed,
    PanTiltStep,
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

/// `DetectorStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Idle = 0,
    Acquire = 1,
    Error = 6,
}

/// Callback receiving published parameter changes.
///
/// Runs with the driver state locked; it must not call back into the driver.
pub type Listener = Box<dyn FnMut(ParamId, &ParamValue) + Send>;

/// Typed key/value store with change notification.
#[derive(Default)]
pub struct ParamStore {
    values: BTreeMap<ParamId, ParamValue>,
    pending: BTreeSet<ParamId>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamStore")
            .field("values", &self.values)
            .field("pending", &self.pending)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, id: ParamId, value: ParamValue) {
        if self.values.get(&id) != Some(&value) {
            self.values.insert(id, value);
            self.pending.insert(id);
        }
    }

    pub fn set_int(&mut self, id: ParamId, value: i64) {
        self.set(id, ParamValue::Int(value));
    }

    pub fn set_float(&mut self, id: ParamId, value: f64) {
        self.set(id, ParamValue::Float(value));
    }

    pub fn set_text(&mut self, id: ParamId, value: impl Into<String>) {
        self.set(id, ParamValue::Text(value.into()));
    }

    pub fn get(&self, id: ParamId) -> Option<&ParamValue> {
        self.values.get(&id)
    }

    /// Integer value, 0 when unset. Floats are truncated.
    pub fn get_int(&self, id: ParamId) -> i64 {
        match self.values.get(&id) {
            Some(ParamValue::Int(value)) => *value,
            Some(ParamValue::Float(value)) => *value as i64,
            _ => 0,
        }
    }

    /// Float value, 0.0 when unset.
    pub fn get_float(&self, id: ParamId) -> f64 {
        match self.values.get(&id) {
            Some(ParamValue::Float(value)) => *value,
            Some(ParamValue::Int(value)) => *value as f64,
            _ => 0.0,
        }
    }

    pub fn get_text(&self, id: ParamId) -> &str {
        match self.values.get(&id) {
            Some(ParamValue::Text(value)) => value,
            _ => "",
        }
    }

    pub fn increment(&mut self, id: ParamId) -> i64 {
        let value = self.get_int(id) + 1;
        self.set_int(id, value);
        value
    }

    /// Status message, cut to [`STATUS_MAX_CHARS`] characters.
    pub fn set_status(&mut self, message: &str) {
        let message: String = message.chars().take(STATUS_MAX_CHARS).collect();
        self.set_text(ParamId::StatusMessage, message);
    }

    pub fn status(&self) -> &str {
        self.get_text(ParamId::StatusMessage)
    }

    pub fn set_detector_status(&mut self, status: DetectorStatus) {
        self.set_int(ParamId::DetectorStatus, status as i64);
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Hand every change since the last publish to the listeners.
    /// Returns the number of changed parameters.
    pub fn publish(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        for id in &pending {
            if let Some(value) = self.values.get(id) {
                for listener in &mut self.listeners {
                    listener(*id, value);
                }
            }
        }
        pending.len()
    }
}
