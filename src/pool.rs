use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::descriptor::{ColorLayout, ElementType};
use crate::error::FrameError;

/// Name of the attribute carrying the buffer's color layout code.
pub const COLOR_MODE_ATTRIBUTE: &str = "ColorMode";

/// Pixel storage. Arrays use column-major order: the first index varies
/// fastest, so `[3, w, h]` is packed RGB and `[w, h]` is row-major mono.
#[derive(Debug, Clone)]
pub enum PixelData {
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub description: String,
    pub value: i64,
}

/// Returns the buffer's bytes to its pool when dropped.
#[derive(Debug)]
struct Lease {
    ledger: Arc<Mutex<Usage>>,
    bytes: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut usage = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        usage.buffers = usage.buffers.saturating_sub(1);
        usage.bytes = usage.bytes.saturating_sub(self.bytes);
    }
}

/// Canonical image buffer handed to the imaging pipeline.
///
/// Dropping the buffer releases it back to the pool it came from.
#[derive(Debug)]
pub struct ImageBuffer {
    pub unique_id: u64,
    pub timestamp: SystemTime,
    dims: Vec<usize>,
    element: ElementType,
    data: PixelData,
    attributes: Vec<Attribute>,
    _lease: Option<Lease>,
}

impl ImageBuffer {
    /// Zeroed buffer outside of any pool.
    pub fn new(dims: &[usize], element: ElementType) -> Self {
        let shape = IxDyn(dims).f();
        let data = match element {
            ElementType::UInt8 => PixelData::UInt8(ArrayD::zeros(shape)),
            ElementType::UInt16 => PixelData::UInt16(ArrayD::zeros(shape)),
        };
        Self {
            unique_id: 0,
            timestamp: SystemTime::now(),
            dims: dims.to_vec(),
            element,
            data,
            attributes: Vec::new(),
            _lease: None,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn element_type(&self) -> ElementType {
        self.element
    }

    pub fn color_layout(&self) -> ColorLayout {
        if self.dims.len() == 3 {
            ColorLayout::Rgb
        } else {
            ColorLayout::Mono
        }
    }

    pub fn width(&self) -> usize {
        match self.color_layout() {
            ColorLayout::Mono => self.dims.first().copied().unwrap_or(0),
            ColorLayout::Rgb => self.dims.get(1).copied().unwrap_or(0),
        }
    }

    pub fn height(&self) -> usize {
        match self.color_layout() {
            ColorLayout::Mono => self.dims.get(1).copied().unwrap_or(0),
            ColorLayout::Rgb => self.dims.get(2).copied().unwrap_or(0),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.dims.iter().product::<usize>() * self.element.size()
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    /// Replace the contents with `bytes` (little-endian for 16-bit data).
    /// The length must match exactly; nothing is copied otherwise.
    pub fn fill_from_le_bytes(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        let expected = self.total_bytes();
        if bytes.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let shape = IxDyn(&self.dims).f();
        let mismatch = |_| FrameError::SizeMismatch {
            expected,
            actual: bytes.len(),
        };
        self.data = match self.element {
            ElementType::UInt8 => {
                PixelData::UInt8(ArrayD::from_shape_vec(shape, bytes.to_vec()).map_err(mismatch)?)
            }
            ElementType::UInt16 => {
                let words = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                PixelData::UInt16(ArrayD::from_shape_vec(shape, words).map_err(mismatch)?)
            }
        };
        Ok(())
    }

    /// Contents in memory order (first index fastest), 16-bit data little-endian.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.data {
            PixelData::UInt8(array) => array.t().iter().copied().collect(),
            PixelData::UInt16(array) => array.t().iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn add_attribute(&mut self, name: &str, description: &str, value: i64) {
        self.attributes.retain(|attr| attr.name != name);
        self.attributes.push(Attribute {
            name: name.to_owned(),
            description: description.to_owned(),
            value,
        });
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Color layout tag attached at delivery.
    pub fn color_mode(&self) -> Option<ColorLayout> {
        self.attribute(COLOR_MODE_ATTRIBUTE)
            .and_then(|attr| ColorLayout::from_code(attr.value))
    }
}

/// Image-buffer pool collaborator.
pub trait BufferPool: Send + Sync {
    /// `None` when the pool is exhausted.
    fn allocate(&self, dims: &[usize], element: ElementType) -> Option<ImageBuffer>;

    /// Give a buffer back. Equivalent to dropping it.
    fn release(&self, buffer: ImageBuffer) {
        drop(buffer);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub buffers: usize,
    pub bytes: usize,
}

/// Heap-backed pool with optional buffer-count and memory limits.
#[derive(Debug, Clone)]
pub struct HeapPool {
    max_buffers: usize,
    max_memory: usize,
    ledger: Arc<Mutex<Usage>>,
}

impl HeapPool {
    /// A limit of 0 means unlimited.
    pub fn new(max_buffers: usize, max_memory: usize) -> Self {
        Self {
            max_buffers,
            max_memory,
            ledger: Arc::new(Mutex::new(Usage::default())),
        }
    }

    pub fn usage(&self) -> Usage {
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl BufferPool for HeapPool {
    fn allocate(&self, dims: &[usize], element: ElementType) -> Option<ImageBuffer> {
        let bytes = dims.iter().product::<usize>() * element.size();
        {
            let mut usage = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            if self.max_buffers != 0 && usage.buffers >= self.max_buffers {
                tracing::warn!("buffer pool exhausted: {} buffers in use", usage.buffers);
                return None;
            }
            if self.max_memory != 0 && usage.bytes + bytes > self.max_memory {
                tracing::warn!(
                    "buffer pool memory limit reached: {} + {} > {}",
                    usage.bytes,
                    bytes,
                    self.max_memory
                );
                return None;
            }
            usage.buffers += 1;
            usage.bytes += bytes;
        }

        let mut buffer = ImageBuffer::new(dims, element);
        buffer._lease = Some(Lease {
            ledger: Arc::clone(&self.ledger),
            bytes,
        });
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_buffer_keeps_packed_byte_order() {
        let mut buffer = ImageBuffer::new(&[3, 2, 1], ElementType::UInt8);
        buffer
            .fill_from_le_bytes(&[1, 2, 3, 4, 5, 6])
            .expect("sizes match");

        let PixelData::UInt8(array) = buffer.data() else {
            panic!("expected 8-bit data");
        };
        // channel, x, y
        assert_eq!(array[[0, 1, 0]], 4);
        assert_eq!(array[[2, 0, 0]], 3);
        assert_eq!(buffer.to_le_bytes(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 1);
    }

    #[test]
    fn mono16_reads_little_endian_words() {
        let mut buffer = ImageBuffer::new(&[2, 1], ElementType::UInt16);
        buffer
            .fill_from_le_bytes(&[0x34, 0x12, 0xff, 0x00])
            .expect("sizes match");

        let PixelData::UInt16(array) = buffer.data() else {
            panic!("expected 16-bit data");
        };
        assert_eq!(array[[0, 0]], 0x1234);
        assert_eq!(array[[1, 0]], 0x00ff);
    }

    #[test]
    fn fill_rejects_wrong_length() {
        let mut buffer = ImageBuffer::new(&[4, 4], ElementType::UInt16);
        let err = buffer.fill_from_le_bytes(&[0; 16]).expect_err("too short");
        assert!(matches!(
            err,
            FrameError::SizeMismatch {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn pool_limits_and_release() {
        let pool = HeapPool::new(2, 0);
        let a = pool.allocate(&[4, 4], ElementType::UInt8).expect("first");
        let b = pool.allocate(&[4, 4], ElementType::UInt16).expect("second");
        assert!(pool.allocate(&[4, 4], ElementType::UInt8).is_none());
        assert_eq!(
            pool.usage(),
            Usage {
                buffers: 2,
                bytes: 16 + 32
            }
        );

        pool.release(a);
        drop(b);
        assert_eq!(pool.usage(), Usage::default());
    }

    #[test]
    fn pool_memory_limit() {
        let pool = HeapPool::new(0, 100);
        let _held = pool.allocate(&[8, 8], ElementType::UInt8).expect("64 bytes");
        assert!(pool.allocate(&[8, 8], ElementType::UInt8).is_none());
    }

    #[test]
    fn color_mode_attribute() {
        let mut buffer = ImageBuffer::new(&[3, 1, 1], ElementType::UInt8);
        assert_eq!(buffer.color_mode(), None);
        buffer.add_attribute(COLOR_MODE_ATTRIBUTE, "Color Mode", ColorLayout::Rgb.code());
        assert_eq!(buffer.color_mode(), Some(ColorLayout::Rgb));
    }
}
