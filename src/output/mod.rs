mod channel;
mod png;

pub use channel::ChannelSink;
pub use png::PngWriter;

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::pool::ImageBuffer;

/// Destination of canonical image buffers (the imaging pipeline).
pub trait ImageSink: Send {
    /// Take ownership of one delivered frame.
    fn deliver(&mut self, buffer: ImageBuffer) -> Result<()>;
}

/// Sink shared between the control surface and the frame callback.
pub type SharedSink = Arc<Mutex<Box<dyn ImageSink>>>;

pub fn shared(sink: impl ImageSink + 'static) -> SharedSink {
    Arc::new(Mutex::new(Box::new(sink)))
}
