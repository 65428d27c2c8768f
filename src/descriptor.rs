use std::fmt;

/// Wire encoding of a camera mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Compression {
    Mjpeg,
    Uncompressed,
    Rgb,
    Yuyv,
    Uyvy,
    Gray8,
    Gray16,
    Unsupported,
}

impl Compression {
    /// Integer code used for the `ImageFormat` parameter.
    pub fn code(self) -> i64 {
        match self {
            Compression::Unsupported => -1,
            Compression::Mjpeg => 0,
            Compression::Rgb => 1,
            Compression::Yuyv => 2,
            Compression::Gray8 => 3,
            Compression::Gray16 => 4,
            Compression::Uyvy => 5,
            Compression::Uncompressed => 6,
        }
    }

    /// Unknown codes map to `Unsupported`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Compression::Mjpeg,
            1 => Compression::Rgb,
            2 => Compression::Yuyv,
            3 => Compression::Gray8,
            4 => Compression::Gray16,
            5 => Compression::Uyvy,
            6 => Compression::Uncompressed,
            _ => Compression::Unsupported,
        }
    }

    pub fn is_compressed(self) -> bool {
        self == Compression::Mjpeg
    }

    /// Canonical layout and element type a frame of this encoding normalizes to.
    pub fn canonical(self) -> (ColorLayout, ElementType) {
        match self {
            Compression::Mjpeg | Compression::Rgb | Compression::Yuyv | Compression::Uyvy => {
                (ColorLayout::Rgb, ElementType::UInt8)
            }
            Compression::Uncompressed | Compression::Gray16 => {
                (ColorLayout::Mono, ElementType::UInt16)
            }
            Compression::Gray8 | Compression::Unsupported => (ColorLayout::Mono, ElementType::UInt8),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Mjpeg => "MJPEG",
            Compression::Uncompressed => "Uncompressed",
            Compression::Rgb => "RGB",
            Compression::Yuyv => "YUYV",
            Compression::Uyvy => "UYVY",
            Compression::Gray8 => "Gray8",
            Compression::Gray16 => "Gray16",
            Compression::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel layout of a canonical image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLayout {
    Mono,
    Rgb,
}

impl ColorLayout {
    pub fn code(self) -> i64 {
        match self {
            ColorLayout::Mono => 0,
            ColorLayout::Rgb => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ColorLayout::Mono),
            1 => Some(ColorLayout::Rgb),
            _ => None,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            ColorLayout::Mono => 1,
            ColorLayout::Rgb => 3,
        }
    }
}

/// Element type of a canonical image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    UInt8,
    UInt16,
}

impl ElementType {
    pub fn code(self) -> i64 {
        match self {
            ElementType::UInt8 => 0,
            ElementType::UInt16 => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ElementType::UInt8),
            1 => Some(ElementType::UInt16),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            ElementType::UInt8 => 1,
            ElementType::UInt16 => 2,
        }
    }
}

/// One candidate camera mode.
///
/// The canonical layout and element type are derived from the compression
/// when the descriptor is created and cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    description: String,
    width: u32,
    height: u32,
    frame_rate_hz: i32,
    compression: Compression,
    color_layout: ColorLayout,
    element_type: ElementType,
}

impl StreamDescriptor {
    pub fn new(compression: Compression, width: u32, height: u32, frame_rate_hz: i32) -> Self {
        let (color_layout, element_type) = compression.canonical();
        Self {
            description: format!("{compression} {width}x{height} @ {frame_rate_hz} fps"),
            width,
            height,
            frame_rate_hz,
            compression,
            color_layout,
            element_type,
        }
    }

    /// Placeholder for an empty catalog slot.
    pub fn unused() -> Self {
        let (color_layout, element_type) = Compression::Unsupported.canonical();
        Self {
            description: "Unused camera format".to_owned(),
            width: 0,
            height: 0,
            frame_rate_hz: 0,
            compression: Compression::Unsupported,
            color_layout,
            element_type,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate_hz(&self) -> i32 {
        self.frame_rate_hz
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn color_layout(&self) -> ColorLayout {
        self.color_layout
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn is_unused(&self) -> bool {
        self.compression == Compression::Unsupported
    }

    /// Structural equality: every field except the description.
    pub fn same_mode(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.frame_rate_hz == other.frame_rate_hz
            && self.compression == other.compression
            && self.color_layout == other.color_layout
            && self.element_type == other.element_type
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_fields_follow_compression() {
        let mjpeg = StreamDescriptor::new(Compression::Mjpeg, 1280, 720, 30);
        assert_eq!(mjpeg.color_layout(), ColorLayout::Rgb);
        assert_eq!(mjpeg.element_type(), ElementType::UInt8);

        let raw = StreamDescriptor::new(Compression::Uncompressed, 640, 480, 60);
        assert_eq!(raw.color_layout(), ColorLayout::Mono);
        assert_eq!(raw.element_type(), ElementType::UInt16);

        let gray = StreamDescriptor::new(Compression::Gray8, 640, 480, 60);
        assert_eq!(gray.color_layout(), ColorLayout::Mono);
        assert_eq!(gray.element_type(), ElementType::UInt8);
    }

    #[test]
    fn same_mode_ignores_description() {
        let a = StreamDescriptor::new(Compression::Mjpeg, 1920, 1080, 30);
        let mut b = a.clone();
        b.description = "renamed".to_owned();
        assert!(a.same_mode(&b));
        assert_ne!(a, b);

        let c = StreamDescriptor::new(Compression::Mjpeg, 1920, 1080, 15);
        assert!(!a.same_mode(&c));
    }

    #[test]
    fn unknown_compression_code_is_unsupported() {
        assert_eq!(Compression::from_code(6), Compression::Uncompressed);
        assert_eq!(Compression::from_code(42), Compression::Unsupported);
        assert_eq!(Compression::from_code(-1), Compression::Unsupported);
    }

    #[test]
    fn unused_sentinel() {
        let unused = StreamDescriptor::unused();
        assert!(unused.is_unused());
        assert_eq!(unused.description(), "Unused camera format");
    }
}
