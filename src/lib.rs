//! Windelta: streaming window decoding with region hand-off.
//!
//! Bytes arrive in arbitrary chunks and are grouped into bounded **windows**.
//! Each completed window carries its payload and an instruction list, and is
//! handed by value to a consumer together with the memory region backing it;
//! the consumer alone decides when that region is released.
//!
//! The crate provides:
//! - Scoped regions with a shared lifecycle ledger (`region`)
//! - Windows, instruction builders and window application (`window`)
//! - The streaming decoder, cut policies and consumers (`stream`)
//! - Reader/file helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use windelta::stream::{DecoderOptions, make_decoder};
//! use windelta::window::WindowWriter;
//!
//! let writer = WindowWriter::new(Vec::new());
//! let mut dec = make_decoder(writer, DecoderOptions::default()).unwrap();
//! dec.ingest(b"hello ").unwrap();
//! dec.ingest(b"windowed world").unwrap();
//!
//! let (writer, stats) = dec.finish().unwrap();
//! assert_eq!(stats.windows_delivered, 4);
//! assert_eq!(writer.into_inner(), b"hello windowed world");
//! ```

pub mod io;
pub mod region;
pub mod stream;
pub mod window;

#[cfg(feature = "cli")]
pub mod cli;
