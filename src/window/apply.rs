// Window application: turning a delivered window back into target bytes.
//
// This is consumer-side code.  The decoder hands windows over without
// looking at their instructions; `apply_window` executes them against the
// window payload and an optional base text, and `WindowWriter` is a ready
// consumer that streams the reconstructed bytes into any `impl Write`.

use std::io::{self, Write};

use thiserror::Error;

use super::builder::Window;
use super::instruction::Instruction;
use crate::stream::consumer::{Consumer, ConsumerError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("window {window}: {mnemonic} spans payload {start}..{end}, payload holds {len} bytes")]
    PayloadOverrun {
        window: u64,
        mnemonic: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("window {window}: base underflow: requested {requested} bytes at offset {offset}, got {got}")]
    BaseUnderflow {
        window: u64,
        offset: u64,
        requested: usize,
        got: usize,
    },

    #[error("copy instruction references the base text but no base was provided")]
    MissingBase,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Base text provider
// ---------------------------------------------------------------------------

/// Provides base-text bytes for COPY instructions.
pub trait BaseSource {
    /// Read bytes from the base at absolute offset `offset` into `buf`.
    /// Returns the number of bytes actually read.
    fn read_base(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, ApplyError>;

    /// Total base length (if known).
    fn base_len(&self) -> Option<u64>;

    /// Direct zero-copy slice access for in-memory bases.
    ///
    /// Returns `None` when `[offset..offset+len]` is not available as one
    /// contiguous slice; `apply_window` then falls back to `read_base`.
    fn base_slice(&self, _offset: u64, _len: usize) -> Option<&[u8]> {
        None
    }
}

/// In-memory base text.
impl BaseSource for &[u8] {
    fn read_base(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, ApplyError> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        if offset >= self.len() {
            return Ok(0);
        }
        let available = &self[offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn base_len(&self) -> Option<u64> {
        Some(self.len() as u64)
    }

    fn base_slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(len)?;
        self.get(offset..end)
    }
}

/// No base text: any COPY instruction fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBase;

impl BaseSource for NoBase {
    fn read_base(&mut self, _offset: u64, _buf: &mut [u8]) -> Result<usize, ApplyError> {
        Err(ApplyError::MissingBase)
    }

    fn base_len(&self) -> Option<u64> {
        None
    }
}

// ---------------------------------------------------------------------------
// Applying a window
// ---------------------------------------------------------------------------

fn payload_span<'a>(
    window: &'a Window,
    mnemonic: &'static str,
    start: usize,
    len: usize,
) -> Result<&'a [u8], ApplyError> {
    let payload = window.payload();
    start
        .checked_add(len)
        .and_then(|end| payload.get(start..end))
        .ok_or(ApplyError::PayloadOverrun {
            window: window.index(),
            mnemonic,
            start,
            end: start.saturating_add(len),
            len: payload.len(),
        })
}

/// Execute `window`'s instructions, appending the produced bytes to `output`.
///
/// `copy_buf` is scratch space for base reads that cannot be served as a
/// zero-copy slice; it persists across calls to avoid per-COPY allocation.
pub fn apply_window<B: BaseSource>(
    window: &Window,
    base: &mut B,
    copy_buf: &mut Vec<u8>,
    output: &mut Vec<u8>,
) -> Result<(), ApplyError> {
    output.reserve(usize::try_from(window.target_len()).unwrap_or(0));

    for inst in window.instructions() {
        match *inst {
            Instruction::Add { offset, len } => {
                output.extend_from_slice(payload_span(window, "ADD", offset, len)?);
            }
            Instruction::Run { offset, len } => {
                let byte = payload_span(window, "RUN", offset, 1)?[0];
                output.resize(output.len() + len, byte);
            }
            Instruction::Copy { addr, len } => {
                if let Some(slice) = base.base_slice(addr, len) {
                    output.extend_from_slice(slice);
                } else {
                    copy_buf.resize(len, 0);
                    let got = base.read_base(addr, copy_buf)?;
                    if got < len {
                        return Err(ApplyError::BaseUnderflow {
                            window: window.index(),
                            offset: addr,
                            requested: len,
                            got,
                        });
                    }
                    output.extend_from_slice(&copy_buf[..len]);
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// WindowWriter consumer
// ---------------------------------------------------------------------------

/// Consumer that applies each window and writes the result to `W`.
///
/// Each window is released as soon as its bytes are written, so only one
/// reconstructed window is held in memory at a time.
pub struct WindowWriter<W: Write, B: BaseSource> {
    writer: W,
    base: B,
    copy_buf: Vec<u8>,
    window_buf: Vec<u8>,
    bytes_written: u64,
    windows_written: u64,
}

impl<W: Write> WindowWriter<W, NoBase> {
    /// Writer for windows that never copy from a base text.
    pub fn new(writer: W) -> Self {
        Self::with_base(writer, NoBase)
    }
}

impl<W: Write, B: BaseSource> WindowWriter<W, B> {
    pub fn with_base(writer: W, base: B) -> Self {
        Self {
            writer,
            base,
            copy_buf: Vec::new(),
            window_buf: Vec::new(),
            bytes_written: 0,
            windows_written: 0,
        }
    }

    /// Apply and write one window, then release it.
    pub fn write_window(&mut self, window: Window) -> Result<u64, ApplyError> {
        self.window_buf.clear();
        apply_window(
            &window,
            &mut self.base,
            &mut self.copy_buf,
            &mut self.window_buf,
        )?;
        window.release();

        self.writer.write_all(&self.window_buf)?;
        let written = self.window_buf.len() as u64;
        self.bytes_written += written;
        self.windows_written += 1;
        Ok(written)
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of windows written so far.
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, B: BaseSource> Consumer for WindowWriter<W, B> {
    fn consume(&mut self, window: Window) -> Result<(), ConsumerError> {
        self.write_window(window)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
