// Scoped memory regions for window hand-off.
//
// A `Region` owns every allocation made on behalf of one window: the payload
// bytes accumulated from the input stream and the instruction list built over
// them.  Releasing the region frees both in one step.
//
// Lifecycle:
//   Open: the decoder appends payload bytes and builds instructions
//   Closed: sealed inside a delivered `Window`; read-only from here on
//   Released: the consumer released or dropped the window
//
// `RegionAllocator` hands out regions and keeps a shared ledger of those
// transitions.  The ledger is the only state shared between the decoder and
// delivered windows; it exists for accounting (live regions, live bytes, an
// optional live-region limit) and to flag writes to regions that are no
// longer open.
//
// Payload storage starts small and grows on demand up to the window
// capacity, so a short window never pins a full-capacity buffer.  Sealing a
// region trims a reservation that is mostly unused.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::window::Instruction;

/// Identifier of a region, unique per allocator and increasing in allocation order.
pub type RegionId = u64;

/// Payload bytes reserved up front when a region is opened.
pub const INITIAL_RESERVE: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The allocator could not hand out a new region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Too many regions are still live (open, or delivered but not released).
    #[error("region limit reached: {live} regions live, limit is {limit}")]
    RegionLimit { live: usize, limit: usize },

    /// Reserving payload bytes for a region failed.
    #[error("out of memory reserving {requested} bytes for region {region}")]
    OutOfMemory { region: RegionId, requested: usize },
}

// ---------------------------------------------------------------------------
// Instrumentation
// ---------------------------------------------------------------------------

/// Snapshot of the allocator's ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStats {
    /// Regions handed out so far.
    pub opened: u64,
    /// Regions sealed into a window.
    pub closed: u64,
    /// Regions released (explicitly or by drop).
    pub released: u64,
    /// Regions not yet released.
    pub live: usize,
    /// Highest `live` value observed.
    pub peak_live: usize,
    /// Payload bytes reserved by live regions.
    pub live_bytes: usize,
    /// Writes or seals attempted on a region that was not open.
    pub violations: u64,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: RegionId,
    limit: Option<usize>,
    stats: RegionStats,
}

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Hands out regions and tracks their lifecycle.
///
/// Cloning the allocator shares the ledger.
#[derive(Debug, Clone, Default)]
pub struct RegionAllocator {
    ledger: Arc<Mutex<Ledger>>,
}

impl RegionAllocator {
    /// Create an allocator with no live-region limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that refuses to open a region while `max_live`
    /// regions are still live.
    pub fn with_limit(max_live: usize) -> Self {
        let ledger = Ledger {
            limit: Some(max_live),
            ..Ledger::default()
        };
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Current ledger snapshot.
    pub fn stats(&self) -> RegionStats {
        lock(&self.ledger).stats
    }

    /// Open a new region that may hold up to `capacity` payload bytes.
    ///
    /// At most [`INITIAL_RESERVE`] bytes are reserved here; the rest is
    /// reserved as the payload grows.
    pub fn allocate(&self, capacity: usize) -> Result<Region, AllocationError> {
        let mut ledger = lock(&self.ledger);

        if let Some(limit) = ledger.limit
            && ledger.stats.live >= limit
        {
            return Err(AllocationError::RegionLimit {
                live: ledger.stats.live,
                limit,
            });
        }

        let id = ledger.next_id;
        let initial = capacity.min(INITIAL_RESERVE);
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(initial)
            .map_err(|_| AllocationError::OutOfMemory {
                region: id,
                requested: initial,
            })?;

        ledger.next_id += 1;
        let stats = &mut ledger.stats;
        stats.opened += 1;
        stats.live += 1;
        stats.peak_live = stats.peak_live.max(stats.live);
        stats.live_bytes += bytes.capacity();

        Ok(Region {
            id,
            state: RegionState::Open,
            capacity,
            reserved: bytes.capacity(),
            bytes,
            instructions: Vec::new(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Whether a region can still be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Open,
    Closed,
}

/// A scope owning one window's payload and instructions.
///
/// Dropping a region releases it; [`Region::release`] is the explicit form.
#[derive(Debug)]
pub struct Region {
    id: RegionId,
    state: RegionState,
    capacity: usize,
    reserved: usize,
    bytes: Vec<u8>,
    instructions: Vec<Instruction>,
    ledger: Arc<Mutex<Ledger>>,
}

impl Region {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    /// Payload bytes written so far.
    pub fn payload(&self) -> &[u8] {
        &self.bytes
    }

    /// Instructions built over the payload (empty until sealed).
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Append payload bytes.  Refused (and recorded as a violation) unless open.
    pub(crate) fn extend_payload(&mut self, data: &[u8]) {
        if self.state != RegionState::Open {
            self.record_violation();
            return;
        }
        self.bytes.extend_from_slice(data);
        self.sync_reserved();
    }

    /// Make room for `additional` more payload bytes.
    ///
    /// Growth doubles the reservation, capped at the region's capacity
    /// unless the request itself needs more.
    pub(crate) fn reserve_payload(&mut self, additional: usize) -> Result<(), AllocationError> {
        let len = self.bytes.len();
        let needed = len.saturating_add(additional);
        if needed <= self.bytes.capacity() {
            return Ok(());
        }

        let doubled = self.bytes.capacity().saturating_mul(2).min(self.capacity);
        let target = needed.max(doubled);
        self.bytes
            .try_reserve_exact(target - len)
            .map_err(|_| AllocationError::OutOfMemory {
                region: self.id,
                requested: target,
            })?;
        self.sync_reserved();
        Ok(())
    }

    /// Bytes currently reserved for the payload.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Split borrow used while building: the payload stays read-only while the
    /// instruction list is filled in.
    pub(crate) fn build_parts(&mut self) -> (&[u8], &mut Vec<Instruction>) {
        (&self.bytes, &mut self.instructions)
    }

    /// Seal the region.  No payload writes are accepted afterwards.
    ///
    /// A payload using less than half of its reservation is shrunk to fit.
    pub(crate) fn close(&mut self) {
        if self.state != RegionState::Open {
            self.record_violation();
            return;
        }
        self.state = RegionState::Closed;
        if self.bytes.capacity() - self.bytes.len() >= self.bytes.len() {
            self.bytes.shrink_to_fit();
            self.sync_reserved();
        }
        lock(&self.ledger).stats.closed += 1;
    }

    /// Take the payload out without copying, releasing the region.
    pub(crate) fn into_payload(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Release the region and everything allocated from it.
    pub fn release(self) {
        drop(self);
    }

    /// Bring `reserved` and the ledger's `live_bytes` in line with the
    /// payload's actual capacity.
    fn sync_reserved(&mut self) {
        let now = self.bytes.capacity();
        if now == self.reserved {
            return;
        }
        let mut ledger = lock(&self.ledger);
        let stats = &mut ledger.stats;
        stats.live_bytes = stats.live_bytes.saturating_sub(self.reserved) + now;
        self.reserved = now;
    }

    fn record_violation(&self) {
        log::warn!(
            "region {}: write attempted after it was sealed ({:?})",
            self.id,
            self.state
        );
        lock(&self.ledger).stats.violations += 1;
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let mut ledger = lock(&self.ledger);
        let stats = &mut ledger.stats;
        stats.released += 1;
        stats.live = stats.live.saturating_sub(1);
        stats.live_bytes = stats.live_bytes.saturating_sub(self.reserved);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_in_allocation_order() {
        let alloc = RegionAllocator::new();
        let a = alloc.allocate(4).unwrap();
        let b = alloc.allocate(4).unwrap();
        assert!(b.id() > a.id());
        assert_eq!(a.state(), RegionState::Open);
    }

    #[test]
    fn ledger_tracks_open_close_release() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(8).unwrap();
        region.extend_payload(b"abc");
        assert_eq!(region.payload(), b"abc");

        let stats = alloc.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.live, 1);
        assert!(stats.live_bytes >= 8);

        region.close();
        assert_eq!(alloc.stats().closed, 1);

        region.release();
        let stats = alloc.stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.live, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.violations, 0);
    }

    #[test]
    fn writes_after_close_are_flagged() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(4).unwrap();
        region.extend_payload(b"ab");
        region.close();
        region.extend_payload(b"cd");
        region.close();

        assert_eq!(region.payload(), b"ab");
        assert_eq!(alloc.stats().violations, 2);
    }

    #[test]
    fn limit_refuses_until_a_region_is_released() {
        let alloc = RegionAllocator::with_limit(2);
        let a = alloc.allocate(1).unwrap();
        let _b = alloc.allocate(1).unwrap();

        let err = alloc.allocate(1).unwrap_err();
        assert_eq!(err, AllocationError::RegionLimit { live: 2, limit: 2 });

        a.release();
        assert!(alloc.allocate(1).is_ok());
        assert_eq!(alloc.stats().peak_live, 2);
    }

    #[test]
    fn into_payload_releases_without_copy() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(16).unwrap();
        region.extend_payload(b"payload");
        let ptr = region.payload().as_ptr();

        let bytes = region.into_payload();
        assert_eq!(bytes, b"payload");
        assert_eq!(bytes.as_ptr(), ptr);
        assert_eq!(alloc.stats().live, 0);
    }

    #[test]
    fn absurd_reservation_reports_out_of_memory() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(usize::MAX).unwrap();
        assert_eq!(region.reserved(), INITIAL_RESERVE);

        let err = region.reserve_payload(usize::MAX).unwrap_err();
        assert!(matches!(err, AllocationError::OutOfMemory { region: 0, .. }));
        assert_eq!(alloc.stats().live_bytes, INITIAL_RESERVE);
    }

    #[test]
    fn large_capacity_is_reserved_lazily() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(256 << 20).unwrap();
        assert_eq!(alloc.stats().live_bytes, INITIAL_RESERVE);

        region.reserve_payload(3).unwrap();
        region.extend_payload(b"ab\n");
        assert_eq!(region.reserved(), INITIAL_RESERVE);

        region.close();
        let payload = region.into_payload();
        assert_eq!(payload, b"ab\n");
        assert!(payload.capacity() < INITIAL_RESERVE);
        assert_eq!(alloc.stats().live_bytes, 0);
    }

    #[test]
    fn growth_doubles_up_to_capacity() {
        let cap = 3 * INITIAL_RESERVE;
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(cap).unwrap();

        let chunk = vec![7u8; INITIAL_RESERVE];
        region.reserve_payload(chunk.len()).unwrap();
        region.extend_payload(&chunk);
        assert_eq!(region.reserved(), INITIAL_RESERVE);

        region.reserve_payload(1).unwrap();
        assert_eq!(region.reserved(), 2 * INITIAL_RESERVE);
        assert_eq!(alloc.stats().live_bytes, 2 * INITIAL_RESERVE);

        region.extend_payload(&chunk);
        region.reserve_payload(1).unwrap();
        assert_eq!(region.reserved(), cap);
        assert_eq!(alloc.stats().live_bytes, cap);
    }

    #[test]
    fn close_keeps_a_mostly_full_reservation() {
        let alloc = RegionAllocator::new();
        let mut region = alloc.allocate(8).unwrap();
        region.extend_payload(b"abcde");
        let ptr = region.payload().as_ptr();

        region.close();
        assert_eq!(region.reserved(), 8);
        assert_eq!(region.payload().as_ptr(), ptr);
    }
}
