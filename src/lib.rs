//! Driver core for USB video-class cameras.
//!
//! [`control::CameraControl`] connects to a camera through a [`sdk::DeviceSdk`],
//! builds a ranked [`catalog::Catalog`] of its stream modes and runs
//! acquisition sessions whose frames are normalized into
//! [`pool::ImageBuffer`]s and handed to an [`output::ImageSink`].

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod normalize;
pub mod output;
pub mod params;
pub mod pool;
pub mod sdk;
pub mod state;

pub use acquisition::{Acquisition, AcquisitionSession, AcquisitionState, ImageMode, StreamRequest};
pub use catalog::Catalog;
pub use config::DriverConfig;
pub use control::CameraControl;
pub use descriptor::{ColorLayout, Compression, ElementType, StreamDescriptor};
pub use error::{AcquisitionError, CatalogError, ControlError, FrameError, SdkError};
pub use params::{ParamId, ParamValue};
pub use pool::{BufferPool, HeapPool, ImageBuffer};
