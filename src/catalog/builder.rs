use super::Catalog;
use crate::descriptor::{Compression, StreamDescriptor};
use crate::error::CatalogError;
use crate::sdk::{CapabilityTree, DescriptorSubtype, DeviceHandle};

/// Frame intervals are reported in 100 ns units.
const INTERVALS_PER_SECOND: f64 = 10_000_000.0;

/// One descriptor per (format, frame) pair, in discovery order.
///
/// Formats other than MJPEG and uncompressed are skipped, as are frames
/// without a usable default interval.
pub fn flatten(tree: &CapabilityTree) -> Vec<StreamDescriptor> {
    let mut descriptors = Vec::new();

    for interface in &tree.interfaces {
        for format in &interface.formats {
            let compression = match format.subtype {
                DescriptorSubtype::Mjpeg => Compression::Mjpeg,
                DescriptorSubtype::Uncompressed => Compression::Uncompressed,
                other => {
                    tracing::warn!(
                        "interface {}: skipping unsupported format subtype {:#04x}",
                        interface.number,
                        other.code()
                    );
                    continue;
                }
            };

            for frame in &format.frames {
                if frame.default_frame_interval == 0 {
                    tracing::warn!(
                        "interface {}: {} {}x{} has no default frame interval",
                        interface.number,
                        compression,
                        frame.width,
                        frame.height
                    );
                    continue;
                }

                let rate = (INTERVALS_PER_SECOND / f64::from(frame.default_frame_interval)).round();
                descriptors.push(StreamDescriptor::new(
                    compression,
                    frame.width,
                    frame.height,
                    rate as i32,
                ));
            }
        }
    }

    descriptors
}

fn rank(descriptor: &StreamDescriptor) -> (bool, u32, i32) {
    (
        descriptor.compression().is_compressed(),
        descriptor.width(),
        descriptor.frame_rate_hz(),
    )
}

/// Fill `catalog` with the best candidates not yet in it.
///
/// Selection order:
/// 1. MJPEG before anything else
/// 2. Larger width
/// 3. Higher frame rate
///
/// Remaining ties keep discovery order.
pub fn rank_into<const N: usize>(catalog: &mut Catalog<N>, candidates: &[StreamDescriptor]) {
    while !catalog.is_full() {
        let best = candidates
            .iter()
            .filter(|candidate| !catalog.contains(candidate))
            .fold(None::<&StreamDescriptor>, |best, candidate| match best {
                Some(current) if rank(candidate) <= rank(current) => Some(current),
                _ => Some(candidate),
            });

        match best {
            Some(descriptor) => {
                catalog.push(descriptor.clone());
            }
            None => break,
        }
    }
}

/// Enumerate the device's stream descriptors and keep the best `N`.
pub fn build_catalog<const N: usize>(handle: &dyn DeviceHandle) -> Result<Catalog<N>, CatalogError> {
    let _span = tracing::debug_span!("build_catalog").entered();

    if !handle.is_open() {
        return Err(CatalogError::DeviceNotOpen);
    }

    let tree = handle.capability_tree()?;
    let candidates = flatten(&tree);
    tracing::debug!("{} stream descriptors advertised", candidates.len());

    let mut catalog = Catalog::new();
    rank_into(&mut catalog, &candidates);

    for (index, entry) in catalog.iter().enumerate() {
        tracing::info!("Camera format {}: {}", index, entry);
    }
    Ok(catalog)
}
