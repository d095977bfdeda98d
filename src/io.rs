// Reader and file helpers around the streaming decoder.
//
// `decode_reader()` pumps any `Read` through a `WindowDecoder` in fixed-size
// chunks.  `decode_file()` wires that to a `WindowWriter` over buffered file
// output and optionally computes a streaming SHA-256 of what was written
// (feature-gated behind `file-io`).  `inspect_reader()` collects one summary
// per window without keeping the windows themselves.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;
use thiserror::Error;

use crate::stream::{Consumer, DecodeError, DecoderOptions, DecoderStats, WindowDecoder};
use crate::window::{BaseSource, Instruction, NoBase, Window, WindowWriter};

/// Chunk size used when a caller passes 0.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    /// Input file size in bytes.
    pub input_size: u64,
    /// Base file size in bytes (0 without a base).
    pub base_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Number of windows delivered.
    pub windows: u64,
    /// Bytes handed to each `ingest` call.
    pub chunk_size: usize,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

/// One line of `inspect_reader()` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    pub index: u64,
    pub stream_offset: u64,
    pub len: usize,
    pub target_len: u64,
    pub checksum: u32,
    pub instructions: Vec<Instruction>,
}

impl WindowSummary {
    fn of(window: &Window) -> Self {
        Self {
            index: window.index(),
            stream_offset: window.stream_offset(),
            len: window.len(),
            target_len: window.target_len(),
            checksum: window.checksum(),
            instructions: window.instructions().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

fn effective_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Stream `reader` through a decoder delivering to `consumer`, then flush.
///
/// `chunk_size` is how many bytes are handed to each `ingest` call (0 picks
/// `DEFAULT_CHUNK_SIZE`).  Window boundaries do not depend on it.
pub fn decode_reader<R: Read, C: Consumer>(
    mut reader: R,
    consumer: C,
    options: DecoderOptions,
    chunk_size: usize,
) -> Result<(C, DecoderStats), IoError> {
    let chunk_size = effective_chunk_size(chunk_size);

    let mut decoder = WindowDecoder::new(consumer, options)?;
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        decoder.ingest(&buf[..n])?;
    }

    Ok(decoder.finish()?)
}

/// Decode `reader` and write the reconstructed bytes to `writer`.
pub fn decode_to_writer<R: Read, W: Write, B: BaseSource>(
    reader: R,
    writer: W,
    base: B,
    options: DecoderOptions,
    chunk_size: usize,
) -> Result<(W, DecoderStats), IoError> {
    let (window_writer, stats) =
        decode_reader(reader, WindowWriter::with_base(writer, base), options, chunk_size)?;
    let mut writer = window_writer.into_inner();
    writer.flush()?;
    Ok((writer, stats))
}

/// Window `reader` and summarize every window.  Windows are released as
/// soon as they are summarized.
pub fn inspect_reader<R: Read>(
    reader: R,
    options: DecoderOptions,
    chunk_size: usize,
) -> Result<(Vec<WindowSummary>, DecoderStats), IoError> {
    let mut summaries = Vec::new();
    let consumer = crate::stream::from_fn(|window| {
        summaries.push(WindowSummary::of(&window));
        window.release();
        Ok(())
    });
    let (_, stats) = decode_reader(reader, consumer, options, chunk_size)?;
    Ok((summaries, stats))
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Window `input_path` and write the reconstructed stream to `output_path`.
///
/// The base (if any) is read fully into memory; it is only consulted by
/// windows carrying COPY instructions.  Input is streamed via `BufReader`,
/// output goes through `BufWriter`.
///
/// When the `file-io` feature is enabled, a SHA-256 checksum of the output
/// is computed incrementally.
///
/// `chunk_size` is passed through to [`decode_reader`] (0 picks
/// `DEFAULT_CHUNK_SIZE`).
pub fn decode_file(
    input_path: &Path,
    output_path: &Path,
    base_path: Option<&Path>,
    options: DecoderOptions,
    chunk_size: usize,
) -> Result<DecodeStats, IoError> {
    let chunk_size = effective_chunk_size(chunk_size);
    let base = base_path.map(std::fs::read).transpose()?;
    let base_size = base.as_ref().map_or(0, |b| b.len() as u64);

    let input_file = File::open(input_path)?;
    let input_size = input_file.metadata()?.len();
    let reader = BufReader::with_capacity(BUF_SIZE, input_file);

    let output_writer = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);

    #[cfg(feature = "file-io")]
    let (stats, output_sha256) = {
        let hashing = HashingWriter {
            inner: output_writer,
            hasher: sha2::Sha256::new(),
        };
        let (hashing, stats) = match base.as_deref() {
            Some(bytes) => decode_to_writer(reader, hashing, bytes, options, chunk_size)?,
            None => decode_to_writer(reader, hashing, NoBase, options, chunk_size)?,
        };
        (stats, Some(hashing.hasher.finalize().into()))
    };

    #[cfg(not(feature = "file-io"))]
    let (stats, output_sha256) = {
        let (_, stats) = match base.as_deref() {
            Some(bytes) => decode_to_writer(reader, output_writer, bytes, options, chunk_size)?,
            None => decode_to_writer(reader, output_writer, NoBase, options, chunk_size)?,
        };
        (stats, None)
    };

    let output_size = std::fs::metadata(output_path)?.len();

    Ok(DecodeStats {
        input_size,
        base_size,
        output_size,
        windows: stats.windows_delivered,
        chunk_size,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Hashing writer (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<W: Write> {
    inner: W,
    hasher: sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
