use thiserror::Error;

use crate::descriptor::Compression;
use crate::params::ParamId;

/// Failure categories reported by a device SDK backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkErrorKind {
    Io,
    InvalidParam,
    Access,
    NoDevice,
    NotFound,
    Busy,
    Timeout,
    NotSupported,
    InvalidMode,
    CallbackExists,
    Other,
}

impl SdkErrorKind {
    /// Numeric code, matching the libuvc error numbering.
    pub fn code(self) -> i32 {
        match self {
            SdkErrorKind::Io => -1,
            SdkErrorKind::InvalidParam => -2,
            SdkErrorKind::Access => -3,
            SdkErrorKind::NoDevice => -4,
            SdkErrorKind::NotFound => -5,
            SdkErrorKind::Busy => -6,
            SdkErrorKind::Timeout => -7,
            SdkErrorKind::NotSupported => -12,
            SdkErrorKind::InvalidMode => -51,
            SdkErrorKind::CallbackExists => -52,
            SdkErrorKind::Other => -99,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SdkErrorKind::Io => "I/O error",
            SdkErrorKind::InvalidParam => "Invalid parameter",
            SdkErrorKind::Access => "Access denied",
            SdkErrorKind::NoDevice => "No such device",
            SdkErrorKind::NotFound => "Not found",
            SdkErrorKind::Busy => "Resource busy",
            SdkErrorKind::Timeout => "Timeout",
            SdkErrorKind::NotSupported => "Not supported",
            SdkErrorKind::InvalidMode => "Invalid mode",
            SdkErrorKind::CallbackExists => "Callback exists",
            SdkErrorKind::Other => "Unknown error",
        }
    }
}

/// Error raised by the device SDK collaborator.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.label())]
pub struct SdkError {
    pub kind: SdkErrorKind,
    pub message: String,
}

impl SdkError {
    pub fn new(kind: SdkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(SdkErrorKind::NotSupported, message)
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => SdkErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => SdkErrorKind::Access,
            std::io::ErrorKind::TimedOut => SdkErrorKind::Timeout,
            std::io::ErrorKind::InvalidInput => SdkErrorKind::InvalidParam,
            _ if err.raw_os_error() == Some(16) => SdkErrorKind::Busy,
            _ => SdkErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

/// Catalog could not be built; the device stays usable with manual settings.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("device handle is not open")]
    DeviceNotOpen,

    #[error("failed to read capability tree: {0}")]
    Sdk(#[from] SdkError),
}

/// Per-frame failure. Contained inside the frame handler: the frame is dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unable to allocate {bytes} byte image buffer")]
    Allocation { bytes: usize },

    #[error("unsupported frame format {0:?}")]
    UnsupportedCompression(Compression),

    #[error("frame has {actual} bytes, buffer expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("color conversion failed: {0}")]
    Conversion(#[from] SdkError),
}

/// Session-level failure returned to the caller of `start`.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("cannot acquire with unsupported image format")]
    UnsupportedCompression,

    #[error("stream negotiation failed: {0}")]
    Negotiation(#[source] SdkError),

    #[error("failed to start streaming: {0}")]
    Streaming(#[source] SdkError),
}

/// Error surfaced by the device-control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no device connected")]
    NotConnected,

    #[error("unsupported image mode {0}")]
    UnsupportedMode(i64),

    #[error("catalog index {0} out of range")]
    InvalidCatalogIndex(i64),

    #[error("catalog entry {0} is not used")]
    UnusedCatalogEntry(usize),

    #[error("parameter {0:?} does not accept this value type")]
    WrongValueType(ParamId),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}
