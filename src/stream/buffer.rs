// Accumulation buffer: bytes received but not yet cut into a window.
//
// The buffer writes straight into the current region's payload, so cutting a
// window moves the region out whole instead of copying the bytes.  A buffer
// is never reused after its region is sealed; the decoder replaces it.

use crate::region::{AllocationError, Region, RegionId};

/// Pending bytes for the next window, stored in the open region.
#[derive(Debug)]
pub struct AccumulationBuffer {
    region: Region,
    capacity: usize,
}

impl AccumulationBuffer {
    pub(crate) fn new(region: Region, capacity: usize) -> Self {
        Self { region, capacity }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.region.payload()
    }

    pub fn len(&self) -> usize {
        self.region.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window capacity this buffer was opened with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that still fit before the window is full.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn region_id(&self) -> RegionId {
        self.region.id()
    }

    /// Make sure `additional` more bytes can be appended without a fallible
    /// allocation.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<(), AllocationError> {
        self.region.reserve_payload(additional)
    }

    /// Append bytes.  Callers never offer more than `remaining()`.
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.remaining());
        self.region.extend_payload(bytes);
    }

    pub(crate) fn into_region(self) -> Region {
        self.region
    }
}
