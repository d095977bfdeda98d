// Window cut policies.
//
// The decoder always cuts when the buffer reaches capacity.  A policy may
// report an earlier boundary; it can never delay a cut past capacity.
//
// Shipped policies:
//   - `FixedSize`: no boundaries of its own; windows are exactly
//     `capacity` bytes (the trailing flush may be shorter)
//   - `Delimited`: cut right after each delimiter byte
//   - `ContentDefined`: gear rolling hash; cut where the low bits hit zero

/// Decides where windows end.
pub trait CutPolicy: Send {
    /// Offer `incoming` bytes that would follow the `pending` bytes already
    /// buffered.  Return `Some(n)` (1 ≤ n ≤ incoming.len()) when a window
    /// boundary falls right after `incoming[n - 1]`, or `None` when the
    /// whole slice can be appended without a cut.
    ///
    /// `incoming` is never empty and never longer than the room left in the
    /// window.
    fn find_boundary(&mut self, pending: &[u8], incoming: &[u8]) -> Option<usize>;

    /// Called after every cut; stateful policies start over.
    fn reset(&mut self) {}

    /// Name for listings and logs.
    fn name(&self) -> &'static str;
}

/// Cut only at capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSize;

impl CutPolicy for FixedSize {
    fn find_boundary(&mut self, _pending: &[u8], _incoming: &[u8]) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Cut right after every occurrence of `delimiter`.
#[derive(Debug, Clone, Copy)]
pub struct Delimited {
    delimiter: u8,
}

impl Delimited {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

impl CutPolicy for Delimited {
    fn find_boundary(&mut self, _pending: &[u8], incoming: &[u8]) -> Option<usize> {
        incoming
            .iter()
            .position(|&b| b == self.delimiter)
            .map(|pos| pos + 1)
    }

    fn name(&self) -> &'static str {
        "delimited"
    }
}

// ---------------------------------------------------------------------------
// Content-defined boundaries
// ---------------------------------------------------------------------------

/// Per-byte gear values (splitmix64 sequence, fixed seed).
const GEAR: [u64; 256] = gear_table();

const fn gear_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        table[i] = z ^ (z >> 31);
        i += 1;
    }
    table
}

/// Default number of low hash bits that must be zero (≈ 4 KiB average window).
pub const DEFAULT_MASK_BITS: u32 = 12;

/// Content-defined boundaries using a gear rolling hash.
///
/// The hash is `h = (h << 1) + GEAR[byte]`, so each byte falls out of the
/// hash after 64 steps.  A boundary is declared after a byte when at least
/// `min_len` bytes are pending and `h & mask == 0`.  Boundaries depend only
/// on content, never on how the input was chunked.
#[derive(Debug, Clone, Copy)]
pub struct ContentDefined {
    min_len: usize,
    mask: u64,
    hash: u64,
}

impl ContentDefined {
    /// `mask_bits` is clamped to 0..=63.
    pub fn new(min_len: usize, mask_bits: u32) -> Self {
        let bits = mask_bits.min(63);
        Self {
            min_len,
            mask: (1u64 << bits) - 1,
            hash: 0,
        }
    }
}

impl CutPolicy for ContentDefined {
    fn find_boundary(&mut self, pending: &[u8], incoming: &[u8]) -> Option<usize> {
        for (i, &byte) in incoming.iter().enumerate() {
            self.hash = (self.hash << 1).wrapping_add(GEAR[byte as usize]);
            if pending.len() + i + 1 >= self.min_len && self.hash & self.mask == 0 {
                return Some(i + 1);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.hash = 0;
    }

    fn name(&self) -> &'static str {
        "content-defined"
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Which cut policy a decoder starts with.
///
/// Custom policies are passed to `WindowDecoder::with_policy` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CutStrategy {
    /// Windows of exactly `capacity` bytes.
    #[default]
    Fixed,
    /// Cut after each occurrence of the byte.
    Delimited(u8),
    /// Gear-hash boundaries.
    ContentDefined { min_len: usize, mask_bits: u32 },
}

impl CutStrategy {
    /// Return a fresh policy implementation.
    pub fn policy(&self) -> Box<dyn CutPolicy> {
        match *self {
            Self::Fixed => Box::new(FixedSize),
            Self::Delimited(delimiter) => Box::new(Delimited::new(delimiter)),
            Self::ContentDefined { min_len, mask_bits } => {
                Box::new(ContentDefined::new(min_len, mask_bits))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
