use crate::descriptor::{ColorLayout, ElementType};

/// Outcome of checking a frame's byte count against the configured layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutCheck {
    /// Configured layout fits the frame.
    Matches,
    /// Configured layout does not fit; the frame suggests this one instead.
    Repaired(ColorLayout, ElementType),
    /// No known layout has this many bytes per pixel.
    Unrepairable { bytes_per_pixel: usize },
}

/// Layout implied by a whole number of bytes per pixel.
pub fn layout_for(bytes_per_pixel: usize) -> Option<(ColorLayout, ElementType)> {
    match bytes_per_pixel {
        2 => Some((ColorLayout::Mono, ElementType::UInt16)),
        3 => Some((ColorLayout::Rgb, ElementType::UInt8)),
        6 => Some((ColorLayout::Rgb, ElementType::UInt16)),
        _ => None,
    }
}

/// Compare `actual` frame bytes against `configured_size` in the configured
/// layout, and derive a replacement layout from the frame size on mismatch.
pub fn check(
    layout: ColorLayout,
    element: ElementType,
    configured_size: (u32, u32),
    frame_size: (u32, u32),
    actual: usize,
) -> LayoutCheck {
    let expected = configured_size.0 as usize
        * configured_size.1 as usize
        * element.size()
        * layout.channels();
    if expected == actual {
        return LayoutCheck::Matches;
    }

    let pixels = frame_size.0 as usize * frame_size.1 as usize;
    let bytes_per_pixel = if pixels == 0 { 0 } else { actual / pixels };
    match layout_for(bytes_per_pixel) {
        Some((layout, element)) => LayoutCheck::Repaired(layout, element),
        None => LayoutCheck::Unrepairable { bytes_per_pixel },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_size_is_accepted() {
        let result = check(ColorLayout::Mono, ElementType::UInt16, (640, 480), (640, 480), 640 * 480 * 2);
        assert_eq!(result, LayoutCheck::Matches);
    }

    #[test]
    fn two_bytes_per_pixel_is_mono16() {
        let result = check(ColorLayout::Rgb, ElementType::UInt8, (640, 480), (640, 480), 640 * 480 * 2);
        assert_eq!(result, LayoutCheck::Repaired(ColorLayout::Mono, ElementType::UInt16));
    }

    #[test]
    fn six_bytes_per_pixel_is_rgb16() {
        let result = check(ColorLayout::Mono, ElementType::UInt8, (8, 8), (8, 8), 8 * 8 * 6);
        assert_eq!(result, LayoutCheck::Repaired(ColorLayout::Rgb, ElementType::UInt16));
    }

    #[test]
    fn odd_ratios_are_left_alone() {
        let result = check(ColorLayout::Mono, ElementType::UInt16, (8, 8), (8, 8), 8 * 8 * 4);
        assert_eq!(result, LayoutCheck::Unrepairable { bytes_per_pixel: 4 });

        let empty = check(ColorLayout::Mono, ElementType::UInt16, (8, 8), (0, 0), 10);
        assert_eq!(empty, LayoutCheck::Unrepairable { bytes_per_pixel: 0 });
    }
}
