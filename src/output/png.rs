use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::{GrayImage, ImageBuffer as Raster, Luma, Rgb, RgbImage};

use super::ImageSink;
use crate::descriptor::ColorLayout;
use crate::pool::{ImageBuffer, PixelData};

/// Writes each delivered frame to `<dir>/<prefix>_<id>.png`.
pub struct PngWriter {
    dir: PathBuf,
    prefix: String,
    written: usize,
    last: Option<PathBuf>,
}

impl PngWriter {
    pub fn new<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        tracing::info!("Writing frames to {}", dir.display());
        Ok(Self {
            dir,
            prefix: prefix.to_owned(),
            written: 0,
            last: None,
        })
    }

    /// Number of files written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last.as_deref()
    }

    pub fn write(&mut self, buffer: &ImageBuffer) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}_{:06}.png", self.prefix, buffer.unique_id));
        let (width, height) = (buffer.width() as u32, buffer.height() as u32);

        let saved = match (buffer.color_layout(), buffer.data()) {
            (ColorLayout::Rgb, PixelData::UInt8(_)) => {
                RgbImage::from_raw(width, height, buffer.to_le_bytes()).map(|img| img.save(&path))
            }
            (ColorLayout::Mono, PixelData::UInt8(_)) => {
                GrayImage::from_raw(width, height, buffer.to_le_bytes()).map(|img| img.save(&path))
            }
            (ColorLayout::Rgb, PixelData::UInt16(array)) => {
                Raster::<Rgb<u16>, Vec<u16>>::from_raw(width, height, array.t().iter().copied().collect())
                    .map(|img| img.save(&path))
            }
            (ColorLayout::Mono, PixelData::UInt16(array)) => {
                Raster::<Luma<u16>, Vec<u16>>::from_raw(width, height, array.t().iter().copied().collect())
                    .map(|img| img.save(&path))
            }
        };

        match saved {
            Some(result) => {
                result.with_context(|| format!("Failed to write {}", path.display()))?
            }
            None => bail!("buffer {} does not hold a {}x{} image", buffer.unique_id, width, height),
        }

        tracing::debug!("wrote {}", path.display());
        self.written += 1;
        self.last = Some(path.clone());
        Ok(path)
    }
}

impl ImageSink for PngWriter {
    fn deliver(&mut self, buffer: ImageBuffer) -> Result<()> {
        self.write(&buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ElementType;

    #[test]
    fn writes_rgb_and_mono16() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = PngWriter::new(dir.path(), "frame").expect("writer");

        let mut rgb = ImageBuffer::new(&[3, 2, 2], ElementType::UInt8);
        rgb.unique_id = 1;
        rgb.fill_from_le_bytes(&[255; 12]).expect("fill");
        let path = writer.write(&rgb).expect("write rgb");
        assert!(path.ends_with("frame_000001.png"));

        let mut mono = ImageBuffer::new(&[4, 2], ElementType::UInt16);
        mono.unique_id = 2;
        mono.fill_from_le_bytes(&[0x10; 16]).expect("fill");
        writer.write(&mono).expect("write mono16");

        let decoded = image::open(dir.path().join("frame_000002.png")).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
        assert_eq!(decoded.to_luma16().get_pixel(0, 0).0[0], 0x1010);
        assert_eq!(writer.written(), 2);
        assert_eq!(
            writer.last_written(),
            Some(dir.path().join("frame_000002.png").as_path())
        );
    }
}
