use image::ImageFormat;

use super::VendorFrame;
use crate::descriptor::Compression;
use crate::error::{SdkError, SdkErrorKind};

/// Packed RGB (R, G, B per pixel, row-major) produced by a converter.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The SDK's color conversion primitive.
pub trait ColorConverter: Send + Sync {
    fn to_rgb(&self, frame: &VendorFrame<'_>) -> Result<RgbFrame, SdkError>;
}

/// CPU conversion: JPEG decode for MJPEG, BT.601 for packed 4:2:2.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareConverter;

impl ColorConverter for SoftwareConverter {
    fn to_rgb(&self, frame: &VendorFrame<'_>) -> Result<RgbFrame, SdkError> {
        let _span = tracing::debug_span!("to_rgb", format = %frame.compression).entered();

        let data = match frame.compression {
            Compression::Mjpeg => decode_mjpeg(frame)?,
            Compression::Yuyv => packed_422_to_rgb(frame, [0, 1, 2, 3])?,
            Compression::Uyvy => packed_422_to_rgb(frame, [1, 0, 3, 2])?,
            Compression::Rgb => {
                let expected = pixel_count(frame) * 3;
                if frame.data.len() != expected {
                    return Err(SdkError::new(
                        SdkErrorKind::InvalidParam,
                        format!("RGB frame has {} bytes, expected {expected}", frame.data.len()),
                    ));
                }
                frame.data.to_vec()
            }
            other => {
                return Err(SdkError::not_supported(format!(
                    "no RGB conversion for {other}"
                )))
            }
        };

        Ok(RgbFrame {
            data,
            width: frame.width,
            height: frame.height,
        })
    }
}

fn pixel_count(frame: &VendorFrame<'_>) -> usize {
    frame.width as usize * frame.height as usize
}

fn decode_mjpeg(frame: &VendorFrame<'_>) -> Result<Vec<u8>, SdkError> {
    let decoded = image::load_from_memory_with_format(frame.data, ImageFormat::Jpeg)
        .map_err(|err| SdkError::new(SdkErrorKind::Other, format!("MJPEG decode: {err}")))?
        .to_rgb8();

    if decoded.dimensions() != (frame.width, frame.height) {
        return Err(SdkError::new(
            SdkErrorKind::InvalidParam,
            format!(
                "MJPEG frame is {}x{}, stream is {}x{}",
                decoded.width(),
                decoded.height(),
                frame.width,
                frame.height
            ),
        ));
    }

    Ok(decoded.into_raw())
}

/// `order` gives the byte offsets of Y0, U, Y1, V inside each 4-byte group.
fn packed_422_to_rgb(frame: &VendorFrame<'_>, order: [usize; 4]) -> Result<Vec<u8>, SdkError> {
    let pixels = pixel_count(frame);
    if pixels % 2 != 0 {
        return Err(SdkError::new(
            SdkErrorKind::InvalidParam,
            format!("4:2:2 frame {}x{} has an odd pixel count", frame.width, frame.height),
        ));
    }
    let expected = pixels * 2;
    if frame.data.len() < expected {
        return Err(SdkError::new(
            SdkErrorKind::InvalidParam,
            format!("4:2:2 frame has {} bytes, expected {expected}", frame.data.len()),
        ));
    }

    let [y0, u, y1, v] = order;
    let mut rgb = Vec::with_capacity(pixels * 3);
    for group in frame.data[..expected].chunks_exact(4) {
        let (u, v) = (group[u], group[v]);
        for y in [group[y0], group[y1]] {
            let (r, g, b) = yuv_to_rgb(y, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(rgb)
}

/// ITU-R BT.601 conversion.
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v, y);
    let g = 0.714_14f32.mul_add(-v, 0.344_14f32.mul_add(-u, y));
    let b = 1.772f32.mul_add(u, y);

    let clamp = |val: f32| val.clamp(0.0, 255.0) as u8;
    (clamp(r), clamp(g), clamp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn frame(data: &[u8], width: u32, height: u32, compression: Compression) -> VendorFrame<'_> {
        VendorFrame {
            data,
            width,
            height,
            compression,
            sequence: 0,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn yuyv_gray_converts_to_equal_channels() {
        let data = [128, 128, 128, 128];
        let rgb = SoftwareConverter
            .to_rgb(&frame(&data, 2, 1, Compression::Yuyv))
            .expect("conversion should succeed");
        assert_eq!(rgb.data, vec![128; 6]);
    }

    #[test]
    fn uyvy_reads_luma_from_odd_bytes() {
        // U Y0 V Y1 with neutral chroma
        let data = [128, 10, 128, 200];
        let rgb = SoftwareConverter
            .to_rgb(&frame(&data, 2, 1, Compression::Uyvy))
            .expect("conversion should succeed");
        assert_eq!(rgb.data, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn short_yuyv_frame_is_rejected() {
        let data = [0u8; 6];
        let err = SoftwareConverter
            .to_rgb(&frame(&data, 2, 2, Compression::Yuyv))
            .expect_err("frame is too short");
        assert_eq!(err.kind, SdkErrorKind::InvalidParam);
    }

    #[test]
    fn odd_pixel_count_is_rejected() {
        let data = [128u8; 8];
        let err = SoftwareConverter
            .to_rgb(&frame(&data, 3, 1, Compression::Uyvy))
            .expect_err("3 pixels cannot share chroma pairs");
        assert_eq!(err.kind, SdkErrorKind::InvalidParam);
    }

    #[test]
    fn gray_formats_have_no_rgb_conversion() {
        let data = [0u8; 4];
        let err = SoftwareConverter
            .to_rgb(&frame(&data, 2, 2, Compression::Gray8))
            .expect_err("gray is not convertible");
        assert_eq!(err.kind, SdkErrorKind::NotSupported);
    }

    #[test]
    fn mjpeg_decodes_to_stream_size() {
        let jpeg = crate::sdk::mock::synthetic_frame(Compression::Mjpeg, 16, 8);
        let rgb = SoftwareConverter
            .to_rgb(&frame(&jpeg, 16, 8, Compression::Mjpeg))
            .expect("decode should succeed");
        assert_eq!(rgb.data.len(), 16 * 8 * 3);

        let err = SoftwareConverter
            .to_rgb(&frame(&jpeg, 32, 8, Compression::Mjpeg))
            .expect_err("size mismatch");
        assert_eq!(err.kind, SdkErrorKind::InvalidParam);
    }
}
