// Windows: the unit handed from the decoder to its consumer.
//
// # Modules
//
// - `instruction`: ADD / CPY / RUN instructions describing a window's output
// - `builder`: the `Window` record and the pluggable `WindowBuilder`
// - `apply`: consumer-side reconstruction of target bytes from a window

pub mod apply;
pub mod builder;
pub mod instruction;

// Re-export key types for convenience.
pub use apply::{ApplyError, BaseSource, NoBase, WindowWriter, apply_window};
pub use builder::{
    BuilderKind, DEFAULT_MIN_RUN, LiteralBuilder, RunLengthBuilder, Window, WindowBuilder, adler32,
};
pub use instruction::Instruction;
