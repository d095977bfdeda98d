// Window construction.
//
// A `WindowBuilder` decides which instructions describe a finished payload.
// `build_window` runs the builder inside the payload's region, seals the
// region and wraps it in an immutable `Window`.  The payload is never copied
// or mutated on the way.
//
// Shipped builders:
//   - `LiteralBuilder`: one ADD spanning the whole payload
//   - `RunLengthBuilder`: ADD spans plus RUN for long runs of a single byte

use std::fmt;
use std::sync::Arc;

use super::instruction::Instruction;
use crate::region::{Region, RegionId};

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// A completed window: instructions, the payload they reference, and the
/// region owning both.
///
/// Delivered to the consumer exactly once.  Releasing (or dropping) the
/// window releases its region.
#[derive(Debug)]
pub struct Window {
    index: u64,
    stream_offset: u64,
    region: Region,
}

impl Window {
    /// 0-based position of this window in delivery order.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Offset of the first payload byte in the input stream.
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    pub fn payload(&self) -> &[u8] {
        self.region.payload()
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.region.instructions()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.region.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of output bytes the instructions produce when applied.
    pub fn target_len(&self) -> u64 {
        self.instructions()
            .iter()
            .map(|inst| inst.output_len() as u64)
            .sum()
    }

    pub fn region_id(&self) -> RegionId {
        self.region.id()
    }

    /// Adler-32 of the payload.
    pub fn checksum(&self) -> u32 {
        adler32(self.payload())
    }

    /// Take the payload bytes without copying.  Releases the region.
    pub fn into_payload(self) -> Vec<u8> {
        self.region.into_payload()
    }

    /// Release the window's region and everything allocated from it.
    pub fn release(self) {
        self.region.release();
    }
}

/// Build the instructions for `region`'s payload, seal it and wrap it.
pub(crate) fn build_window(
    mut region: Region,
    builder: &dyn WindowBuilder,
    index: u64,
    stream_offset: u64,
) -> Window {
    let (payload, instructions) = region.build_parts();
    builder.build(payload, instructions);
    region.close();
    Window {
        index,
        stream_offset,
        region,
    }
}

// ---------------------------------------------------------------------------
// WindowBuilder trait
// ---------------------------------------------------------------------------

/// Decides the instruction list for a finished payload.
///
/// Implementations append to `instructions` and must leave the payload alone
/// (they only ever see it as `&[u8]`).  The decoder does not inspect what is
/// produced, so richer builders (copy-from-base, run-length) slot in without
/// touching the decoding loop.
pub trait WindowBuilder: Send + Sync {
    fn build(&self, payload: &[u8], instructions: &mut Vec<Instruction>);

    /// Name for listings and logs.
    fn name(&self) -> &'static str;
}

/// One ADD instruction spanning the whole payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralBuilder;

impl WindowBuilder for LiteralBuilder {
    fn build(&self, payload: &[u8], instructions: &mut Vec<Instruction>) {
        instructions.push(Instruction::Add {
            offset: 0,
            len: payload.len(),
        });
    }

    fn name(&self) -> &'static str {
        "literal"
    }
}

/// Default shortest run worth a RUN instruction.
pub const DEFAULT_MIN_RUN: usize = 8;

/// ADD spans with RUN instructions for runs of at least `min_run` equal bytes.
///
/// Instructions tile the payload in order: every payload byte is covered by
/// exactly one ADD or RUN.
#[derive(Debug, Clone, Copy)]
pub struct RunLengthBuilder {
    min_run: usize,
}

impl RunLengthBuilder {
    pub fn new(min_run: usize) -> Self {
        Self {
            min_run: min_run.max(2),
        }
    }

    pub fn min_run(&self) -> usize {
        self.min_run
    }
}

impl Default for RunLengthBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RUN)
    }
}

impl WindowBuilder for RunLengthBuilder {
    fn build(&self, payload: &[u8], instructions: &mut Vec<Instruction>) {
        let mut literal_start = 0usize;
        let mut pos = 0usize;

        while pos < payload.len() {
            let byte = payload[pos];
            let run = payload[pos..].iter().take_while(|&&b| b == byte).count();

            if run >= self.min_run {
                if literal_start < pos {
                    instructions.push(Instruction::Add {
                        offset: literal_start,
                        len: pos - literal_start,
                    });
                }
                instructions.push(Instruction::Run {
                    offset: pos,
                    len: run,
                });
                literal_start = pos + run;
            }
            pos += run;
        }

        if literal_start < payload.len() || payload.is_empty() {
            instructions.push(Instruction::Add {
                offset: literal_start,
                len: payload.len() - literal_start,
            });
        }
    }

    fn name(&self) -> &'static str {
        "run-length"
    }
}

// ---------------------------------------------------------------------------
// Builder selection
// ---------------------------------------------------------------------------

/// Which builder a decoder uses.
#[derive(Clone, Default)]
pub enum BuilderKind {
    /// One ADD per window.
    #[default]
    Literal,
    /// ADD/RUN split with the given minimum run length.
    RunLength { min_run: usize },
    /// A caller-provided builder.
    Custom(Arc<dyn WindowBuilder>),
}

impl fmt::Debug for BuilderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal => write!(f, "Literal"),
            Self::RunLength { min_run } => write!(f, "RunLength {{ min_run: {min_run} }}"),
            Self::Custom(b) => write!(f, "Custom({})", b.name()),
        }
    }
}

impl BuilderKind {
    /// Return the builder implementation.
    pub fn builder(&self) -> Box<dyn WindowBuilder> {
        match self {
            Self::Literal => Box::new(LiteralBuilder),
            Self::RunLength { min_run } => Box::new(RunLengthBuilder::new(*min_run)),
            Self::Custom(b) => Box::new(ArcBuilder(Arc::clone(b))),
        }
    }
}

struct ArcBuilder(Arc<dyn WindowBuilder>);

impl WindowBuilder for ArcBuilder {
    fn build(&self, payload: &[u8], instructions: &mut Vec<Instruction>) {
        self.0.build(payload, instructions);
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

/// Adler-32 checksum of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
