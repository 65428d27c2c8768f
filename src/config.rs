use crate::acquisition::ImageMode;
use crate::descriptor::Compression;
use crate::sdk::DeviceSelector;

/// Driver start-up configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub selector: DeviceSelector,
    /// Initial stream settings, used until a catalog entry is applied.
    pub compression: Compression,
    pub size_x: u32,
    pub size_y: u32,
    pub frame_rate: i32,
    pub image_mode: ImageMode,
    /// Buffer pool limits, 0 for unlimited.
    pub max_buffers: usize,
    pub max_memory: usize,
    /// Repair the color layout of uncompressed frames from their byte count.
    pub auto_adjust: bool,
    /// Number of steps across the zoom range.
    pub zoom_steps: i32,
    /// Seconds between a pan/tilt move and the halt command.
    pub pan_tilt_step: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            selector: DeviceSelector::Index(0),
            compression: Compression::Mjpeg,
            size_x: 640,
            size_y: 480,
            frame_rate: 30,
            image_mode: ImageMode::Continuous,
            max_buffers: 0,
            max_memory: 0,
            auto_adjust: true,
            zoom_steps: 10,
            pan_tilt_step: 0.5,
        }
    }
}
