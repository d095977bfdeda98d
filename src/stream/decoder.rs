// Streaming window decoder.
//
// Bytes arrive in arbitrary chunks through `ingest`.  They are appended to
// the accumulation buffer, which lives in the current region, and the moment
// the buffer reaches capacity (or the cut policy reports a boundary) the
// buffer's region is sealed into a `Window` and handed to the consumer.  A
// fresh region is opened before the hand-off, so accumulation resumes at once
// and an allocation failure never loses or half-delivers a window.
//
// States:
//   Accumulating: buffer below capacity, no boundary pending
//   Cutting: a cut was decided but has not completed (only observable
//     after an `AllocationError`; the next call retries it)
//   Halted: the consumer failed; every later call returns `Halted`

use log::{debug, trace, warn};

use super::buffer::AccumulationBuffer;
use super::consumer::Consumer;
use super::error::{DecodeError, Operation};
use super::policy::{CutPolicy, CutStrategy};
use crate::region::{RegionAllocator, RegionStats};
use crate::window::builder::{self, BuilderKind, WindowBuilder};

/// Window capacity used by `DecoderOptions::default()`.
pub const DEFAULT_WINDOW_CAPACITY: usize = 5;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for a `WindowDecoder`.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Maximum bytes per window.  Must be at least 1.
    pub capacity: usize,
    /// Where windows end before reaching capacity.
    pub strategy: CutStrategy,
    /// How instructions are built for each window.
    pub builder: BuilderKind,
    /// Refuse to open a region while this many are live (open, or delivered
    /// and not yet released).  `None` means unbounded.
    pub max_live_regions: Option<usize>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WINDOW_CAPACITY,
            strategy: CutStrategy::Fixed,
            builder: BuilderKind::Literal,
            max_live_regions: None,
        }
    }
}

impl DecoderOptions {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_strategy(mut self, strategy: CutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_builder(mut self, builder: BuilderKind) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_max_live_regions(mut self, limit: usize) -> Self {
        self.max_live_regions = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// Stats / state
// ---------------------------------------------------------------------------

/// Progress counters for one decoding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Input bytes accounted for (buffered or delivered).
    pub bytes_ingested: u64,
    /// Payload bytes in successfully delivered windows.
    pub bytes_delivered: u64,
    /// Windows the consumer accepted.
    pub windows_delivered: u64,
    /// Bytes currently waiting in the accumulation buffer.
    pub buffered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Accumulating,
    Cutting,
    Halted,
}

// ---------------------------------------------------------------------------
// WindowDecoder
// ---------------------------------------------------------------------------

/// Groups an incoming byte stream into windows and hands each one to `C`.
///
/// # Example
/// ```
/// use windelta::stream::{Collector, DecoderOptions, make_decoder};
///
/// let mut dec = make_decoder(Collector::new(), DecoderOptions::default().with_capacity(5)).unwrap();
/// dec.ingest(b"abcdefg").unwrap();
/// assert_eq!(dec.consumer().len(), 1);
/// dec.flush().unwrap();
///
/// let (collector, stats) = dec.finish().unwrap();
/// assert_eq!(collector.concat_payloads(), b"abcdefg");
/// assert_eq!(stats.windows_delivered, 2);
/// ```
pub struct WindowDecoder<C: Consumer> {
    consumer: C,
    allocator: RegionAllocator,
    buffer: AccumulationBuffer,
    policy: Box<dyn CutPolicy>,
    builder: Box<dyn WindowBuilder>,
    capacity: usize,
    state: DecoderState,
    bytes_ingested: u64,
    bytes_delivered: u64,
    windows_delivered: u64,
}

/// Create a decoder delivering windows to `consumer`.
pub fn make_decoder<C: Consumer>(
    consumer: C,
    options: DecoderOptions,
) -> Result<WindowDecoder<C>, DecodeError> {
    WindowDecoder::new(consumer, options)
}

impl<C: Consumer> WindowDecoder<C> {
    /// Create a decoder using the policy named by `options.strategy`.
    pub fn new(consumer: C, options: DecoderOptions) -> Result<Self, DecodeError> {
        let policy = options.strategy.policy();
        Self::with_policy(consumer, options, policy)
    }

    /// Create a decoder with a caller-provided cut policy.
    /// `options.strategy` is ignored.
    pub fn with_policy(
        consumer: C,
        options: DecoderOptions,
        policy: Box<dyn CutPolicy>,
    ) -> Result<Self, DecodeError> {
        if options.capacity == 0 {
            return Err(DecodeError::InvalidCapacity(options.capacity));
        }

        let allocator = match options.max_live_regions {
            Some(limit) => RegionAllocator::with_limit(limit),
            None => RegionAllocator::new(),
        };
        let region = allocator.allocate(options.capacity)?;
        let builder = options.builder.builder();

        debug!(
            "window decoder: capacity {} bytes, {} policy, {} builder",
            options.capacity,
            policy.name(),
            builder.name()
        );

        Ok(Self {
            consumer,
            allocator,
            buffer: AccumulationBuffer::new(region, options.capacity),
            policy,
            builder,
            capacity: options.capacity,
            state: DecoderState::Accumulating,
            bytes_ingested: 0,
            bytes_delivered: 0,
            windows_delivered: 0,
        })
    }

    /// Feed the next chunk of the stream.
    ///
    /// Every window completed by these bytes is delivered before this
    /// returns; the rest stay buffered.  On a consumer failure no further
    /// bytes from `bytes` are processed.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.ensure_running()?;

        let mut rest = bytes;
        while !rest.is_empty() {
            // A cut left over from an allocation failure goes first.
            if self.state == DecoderState::Cutting || self.buffer.is_full() {
                self.cut_window(Operation::Ingest)?;
            }

            let room = self.buffer.remaining();
            let offered = &rest[..room.min(rest.len())];
            self.buffer.reserve(offered.len()).inspect_err(|e| {
                warn!("ingest: cannot grow window buffer: {e}");
            })?;
            let (take, boundary) = match self.policy.find_boundary(self.buffer.as_slice(), offered)
            {
                Some(n) => (n.clamp(1, offered.len()), true),
                None => (offered.len(), false),
            };

            self.buffer.extend(&offered[..take]);
            self.bytes_ingested += take as u64;
            rest = &rest[take..];

            if boundary || self.buffer.is_full() {
                self.cut_window(Operation::Ingest)?;
            }
        }

        Ok(())
    }

    /// Deliver whatever is buffered as a final, possibly short, window.
    /// No-op when the buffer is empty.
    pub fn flush(&mut self) -> Result<(), DecodeError> {
        self.ensure_running()?;

        if self.buffer.is_empty() {
            return Ok(());
        }

        debug!("flushing partial window of {} bytes", self.buffer.len());
        self.cut_window(Operation::Flush)
    }

    /// Flush, then return the consumer and the final counters.
    pub fn finish(mut self) -> Result<(C, DecoderStats), DecodeError> {
        self.flush()?;
        let stats = self.stats();
        Ok((self.consumer, stats))
    }

    /// Seal the current buffer into a window and deliver it.
    fn cut_window(&mut self, op: Operation) -> Result<(), DecodeError> {
        debug_assert!(!self.buffer.is_empty());
        self.state = DecoderState::Cutting;

        let fresh = self.allocator.allocate(self.capacity).inspect_err(|e| {
            warn!("{op}: cannot open region for next window: {e}");
        })?;
        let full = std::mem::replace(
            &mut self.buffer,
            AccumulationBuffer::new(fresh, self.capacity),
        );
        self.policy.reset();

        let index = self.windows_delivered;
        let offset = self.bytes_delivered;
        let byte_count = full.len();
        let window =
            builder::build_window(full.into_region(), self.builder.as_ref(), index, offset);

        trace!("{op}: window {index}: {byte_count} bytes at offset {offset}");

        match self.consumer.consume(window) {
            Ok(()) => {
                self.windows_delivered += 1;
                self.bytes_delivered += byte_count as u64;
                self.state = DecoderState::Accumulating;
                Ok(())
            }
            Err(source) => {
                warn!("{op}: consumer rejected window {index}: {source}");
                self.state = DecoderState::Halted;
                Err(DecodeError::Consumer {
                    op,
                    window: index,
                    offset,
                    source,
                })
            }
        }
    }

    fn ensure_running(&self) -> Result<(), DecodeError> {
        if self.state == DecoderState::Halted {
            return Err(DecodeError::Halted);
        }
        Ok(())
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            bytes_ingested: self.bytes_ingested,
            bytes_delivered: self.bytes_delivered,
            windows_delivered: self.windows_delivered,
            buffered: self.buffer.len(),
        }
    }

    /// Allocator ledger: live regions, releases, violations.
    pub fn region_stats(&self) -> RegionStats {
        self.allocator.stats()
    }

    /// Bytes waiting for the next window.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::INITIAL_RESERVE;
    use crate::stream::consumer::{Collector, ConsumerError};
    use crate::window::{Instruction, Window};

    fn decoder(capacity: usize) -> WindowDecoder<Collector> {
        make_decoder(
            Collector::new(),
            DecoderOptions::default().with_capacity(capacity),
        )
        .unwrap()
    }

    fn payloads(c: &Collector) -> Vec<Vec<u8>> {
        c.windows().iter().map(|w| w.payload().to_vec()).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = make_decoder(Collector::new(), DecoderOptions::default().with_capacity(0))
            .err()
            .unwrap();
        assert!(matches!(err, DecodeError::InvalidCapacity(0)));
    }

    #[test]
    fn single_bytes_cut_eagerly() {
        let mut dec = decoder(5);
        for &b in b"abcdefghij" {
            dec.ingest(&[b]).unwrap();
        }
        assert_eq!(payloads(dec.consumer()), vec![b"abcde".to_vec(), b"fghij".to_vec()]);
        assert!(dec.buffered().is_empty());

        dec.flush().unwrap();
        assert_eq!(dec.consumer().len(), 2);
    }

    #[test]
    fn bulk_ingest_then_flush() {
        let mut dec = decoder(5);
        dec.ingest(b"abcdefg").unwrap();
        assert_eq!(payloads(dec.consumer()), vec![b"abcde".to_vec()]);
        assert_eq!(dec.buffered(), b"fg");

        dec.flush().unwrap();
        assert_eq!(payloads(dec.consumer()), vec![b"abcde".to_vec(), b"fg".to_vec()]);
    }

    #[test]
    fn flush_is_idempotent() {
        let mut dec = decoder(4);
        dec.ingest(b"xy").unwrap();
        dec.flush().unwrap();
        dec.flush().unwrap();
        assert_eq!(dec.consumer().len(), 1);
        dec.flush().unwrap();
        assert_eq!(dec.stats().windows_delivered, 1);
    }

    #[test]
    fn empty_ingest_is_noop() {
        let mut dec = decoder(3);
        dec.ingest(b"").unwrap();
        assert_eq!(dec.stats(), DecoderStats::default());
    }

    #[test]
    fn windows_carry_index_offset_and_single_add() {
        let mut dec = decoder(3);
        dec.ingest(b"abcdefgh").unwrap();
        dec.flush().unwrap();

        let windows = dec.consumer().windows();
        let meta: Vec<(u64, u64, usize)> = windows
            .iter()
            .map(|w| (w.index(), w.stream_offset(), w.len()))
            .collect();
        assert_eq!(meta, vec![(0, 0, 3), (1, 3, 3), (2, 6, 2)]);
        for w in windows {
            assert_eq!(
                w.instructions(),
                &[Instruction::Add {
                    offset: 0,
                    len: w.len()
                }]
            );
        }
    }

    #[test]
    fn consumer_failure_halts_decoder() {
        let mut delivered = Vec::new();
        let consumer = |w: Window| -> Result<(), ConsumerError> {
            if w.index() == 1 {
                return Err("disk full".into());
            }
            delivered.push(w.into_payload());
            Ok(())
        };
        let mut dec = make_decoder(consumer, DecoderOptions::default()).unwrap();

        let err = dec.ingest(b"abcdefghijklm").unwrap_err();
        match &err {
            DecodeError::Consumer {
                op, window, offset, ..
            } => {
                assert_eq!(*op, Operation::Ingest);
                assert_eq!(*window, 1);
                assert_eq!(*offset, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.operation(), Some(Operation::Ingest));
        assert_eq!(dec.state(), DecoderState::Halted);
        assert!(dec.buffered().is_empty());

        let stats = dec.stats();
        assert_eq!(stats.windows_delivered, 1);
        assert_eq!(stats.bytes_delivered, 5);
        assert_eq!(stats.bytes_ingested, 10);

        assert!(matches!(dec.ingest(b"n"), Err(DecodeError::Halted)));
        assert!(matches!(dec.flush(), Err(DecodeError::Halted)));
        drop(dec);
        assert_eq!(delivered, vec![b"abcde".to_vec()]);
    }

    #[test]
    fn flush_failure_names_flush() {
        let consumer = |_: Window| -> Result<(), ConsumerError> { Err("nope".into()) };
        let mut dec = make_decoder(consumer, DecoderOptions::default()).unwrap();
        dec.ingest(b"ab").unwrap();
        let err = dec.flush().unwrap_err();
        assert_eq!(err.operation(), Some(Operation::Flush));
        assert!(err.to_string().starts_with("flush: consumer rejected window 0"));
    }

    #[test]
    fn allocation_failure_keeps_full_buffer_and_retries() {
        // Limit 2: the open region plus one delivered window.
        let mut dec = make_decoder(
            Collector::new(),
            DecoderOptions::default()
                .with_capacity(2)
                .with_max_live_regions(2),
        )
        .unwrap();

        dec.ingest(b"ab").unwrap();
        assert_eq!(dec.consumer().len(), 1);

        let err = dec.ingest(b"cd").unwrap_err();
        assert!(matches!(err, DecodeError::Allocation(_)));
        assert_eq!(dec.state(), DecoderState::Cutting);
        assert_eq!(dec.buffered(), b"cd");
        assert_eq!(dec.consumer().len(), 1);

        // Consumer lets go of its window; the pending cut goes through.
        let released = std::mem::take(dec.consumer_mut());
        drop(released);
        dec.ingest(b"e").unwrap();
        assert_eq!(dec.state(), DecoderState::Accumulating);
        assert_eq!(payloads(dec.consumer()), vec![b"cd".to_vec()]);
        assert_eq!(dec.buffered(), b"e");
        assert_eq!(dec.stats().bytes_ingested, 5);
    }

    #[test]
    fn delimited_strategy_cuts_lines() {
        let mut dec = make_decoder(
            Collector::new(),
            DecoderOptions::default()
                .with_capacity(64)
                .with_strategy(CutStrategy::Delimited(b'\n')),
        )
        .unwrap();
        dec.ingest(b"one\ntw").unwrap();
        dec.ingest(b"o\nthree").unwrap();
        dec.flush().unwrap();
        assert_eq!(
            payloads(dec.consumer()),
            vec![b"one\n".to_vec(), b"two\n".to_vec(), b"three".to_vec()]
        );
        assert_eq!(dec.policy_name(), "delimited");
    }

    #[test]
    fn delimiter_never_exceeds_capacity() {
        let mut dec = make_decoder(
            Collector::new(),
            DecoderOptions::default()
                .with_capacity(4)
                .with_strategy(CutStrategy::Delimited(b';')),
        )
        .unwrap();
        dec.ingest(b"abcdefg;h").unwrap();
        dec.flush().unwrap();
        assert_eq!(
            payloads(dec.consumer()),
            vec![b"abcd".to_vec(), b"efg;".to_vec(), b"h".to_vec()]
        );
    }

    #[test]
    fn run_length_builder_is_transparent_to_decoder() {
        let mut dec = make_decoder(
            Collector::new(),
            DecoderOptions::default()
                .with_capacity(16)
                .with_builder(BuilderKind::RunLength { min_run: 4 }),
        )
        .unwrap();
        let input = b"ab\0\0\0\0\0\0cdefghijklmnop";
        dec.ingest(input).unwrap();
        dec.flush().unwrap();

        let windows = dec.consumer().windows();
        let lens: Vec<usize> = windows.iter().map(Window::len).collect();
        assert_eq!(lens, vec![16, 6]);
        assert_eq!(windows[0].instructions().len(), 3);
        assert_eq!(windows[0].instructions()[1], Instruction::Run { offset: 2, len: 6 });
        assert_eq!(dec.consumer().concat_payloads(), input);
    }

    #[test]
    fn short_windows_do_not_pin_full_capacity() {
        let mut dec = make_decoder(
            Collector::new(),
            DecoderOptions::default()
                .with_capacity(256 << 20)
                .with_strategy(CutStrategy::Delimited(b'\n')),
        )
        .unwrap();
        for _ in 0..40 {
            dec.ingest(b"ab\n").unwrap();
        }
        assert_eq!(dec.consumer().len(), 40);

        // 40 sealed windows plus the open region's initial reservation.
        let live_bytes = dec.region_stats().live_bytes;
        assert!(live_bytes <= 40 * 3 + INITIAL_RESERVE, "live_bytes = {live_bytes}");

        let (collector, _) = dec.finish().unwrap();
        for window in collector.into_windows() {
            let payload = window.into_payload();
            assert_eq!(payload, b"ab\n");
            assert!(payload.capacity() < 1024);
        }
    }

    #[test]
    fn released_regions_are_never_touched_again() {
        let consumer = |w: Window| -> Result<(), ConsumerError> {
            w.release();
            Ok(())
        };
        let mut dec = make_decoder(consumer, DecoderOptions::default().with_capacity(3)).unwrap();
        for chunk in b"the quick brown fox jumps".chunks(4) {
            dec.ingest(chunk).unwrap();
        }
        dec.flush().unwrap();

        let stats = dec.region_stats();
        assert_eq!(stats.violations, 0);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.closed, dec.stats().windows_delivered);
        assert_eq!(stats.released, stats.closed);
        assert_eq!(stats.peak_live, 2);
    }
}
