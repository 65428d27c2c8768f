mod builder;

pub use builder::{build_catalog, flatten, rank_into};

use crate::descriptor::StreamDescriptor;

/// Number of auto-discovered modes kept per connection.
pub const DEFAULT_CAPACITY: usize = 7;

/// Bounded, ranked set of camera modes.
///
/// Entries are stored in rank order. Slots past `len()` hold the unused
/// sentinel, and no two valid entries describe the same mode.
#[derive(Debug, Clone)]
pub struct Catalog<const N: usize = DEFAULT_CAPACITY> {
    slots: [StreamDescriptor; N],
    len: usize,
}

impl<const N: usize> Default for Catalog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Catalog<N> {
    /// Catalog with every slot unused.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| StreamDescriptor::unused()),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slot at `index`, the sentinel for unfilled slots. `None` past capacity.
    pub fn get(&self, index: usize) -> Option<&StreamDescriptor> {
        self.slots.get(index)
    }

    /// Valid entries in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.slots[..self.len].iter()
    }

    /// All slots, valid entries first.
    pub fn slots(&self) -> &[StreamDescriptor; N] {
        &self.slots
    }

    /// Whether a valid entry describes the same mode.
    pub fn contains(&self, descriptor: &StreamDescriptor) -> bool {
        self.iter().any(|entry| entry.same_mode(descriptor))
    }

    /// Append in rank order. Returns `false` when full or already present.
    pub fn push(&mut self, descriptor: StreamDescriptor) -> bool {
        if self.is_full() || self.contains(&descriptor) {
            return false;
        }
        self.slots[self.len] = descriptor;
        self.len += 1;
        true
    }

    /// Resolution of the best-ranked entry.
    pub fn max_size(&self) -> Option<(u32, u32)> {
        self.iter().next().map(|entry| (entry.width(), entry.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Compression;

    #[test]
    fn push_rejects_duplicates_and_overflow() {
        let mut catalog = Catalog::<2>::new();
        assert!(catalog.push(StreamDescriptor::new(Compression::Mjpeg, 640, 480, 30)));
        assert!(!catalog.push(StreamDescriptor::new(Compression::Mjpeg, 640, 480, 30)));
        assert!(catalog.push(StreamDescriptor::new(Compression::Uncompressed, 640, 480, 30)));
        assert!(catalog.is_full());
        assert!(!catalog.push(StreamDescriptor::new(Compression::Mjpeg, 320, 240, 30)));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn unfilled_slots_hold_sentinel() {
        let mut catalog = Catalog::<DEFAULT_CAPACITY>::new();
        catalog.push(StreamDescriptor::new(Compression::Mjpeg, 1280, 720, 30));

        assert_eq!(catalog.max_size(), Some((1280, 720)));
        assert!(catalog.slots()[1..].iter().all(StreamDescriptor::is_unused));
        assert!(catalog.get(DEFAULT_CAPACITY).is_none());
        assert_eq!(catalog.iter().count(), 1);
    }
}
