// Window instructions.
//
// An instruction says how to produce a run of output bytes for a window.
// The decoder never interprets them; it only moves the payload they refer to.
// Consumers apply them (see `apply`).

use std::fmt;

/// A single window instruction.
///
/// Offsets are relative to the owning window's payload; `Copy` addresses are
/// absolute offsets into the base text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Instruction {
    /// Emit `len` fresh payload bytes starting at `offset`.
    Add { offset: usize, len: usize },
    /// Emit `len` bytes copied from the base text starting at `addr`.
    Copy { addr: u64, len: usize },
    /// Emit the payload byte at `offset`, repeated `len` times.
    Run { offset: usize, len: usize },
}

impl Instruction {
    /// Number of output bytes this instruction produces.
    pub fn output_len(&self) -> usize {
        match *self {
            Self::Add { len, .. } | Self::Copy { len, .. } | Self::Run { len, .. } => len,
        }
    }

    /// Short mnemonic used in listings.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Copy { .. } => "CPY",
            Self::Run { .. } => "RUN",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Add { offset, len } => write!(f, "ADD {len} @payload+{offset}"),
            Self::Copy { addr, len } => write!(f, "CPY {len} @base+{addr}"),
            Self::Run { offset, len } => write!(f, "RUN {len} @payload+{offset}"),
        }
    }
}
