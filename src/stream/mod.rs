// Streaming decoder: bytes in, windows out.
//
// # Modules
//
// - `buffer`: accumulation buffer living in the open region
// - `policy`: where windows end (fixed size, delimiter, content-defined)
// - `consumer`: the callback contract and a collecting consumer
// - `decoder`: the `WindowDecoder` state machine
// - `error`: `DecodeError`

pub mod buffer;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod policy;

pub use buffer::AccumulationBuffer;
pub use consumer::{Collector, Consumer, ConsumerError, from_fn};
pub use decoder::{
    DEFAULT_WINDOW_CAPACITY, DecoderOptions, DecoderState, DecoderStats, WindowDecoder,
    make_decoder,
};
pub use error::{DecodeError, Operation};
pub use policy::{
    ContentDefined, CutPolicy, CutStrategy, DEFAULT_MASK_BITS, Delimited, FixedSize,
};
