// Decoder errors.

use std::fmt;

use thiserror::Error;

use super::consumer::ConsumerError;
use crate::region::AllocationError;

/// Which public operation was running when a failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ingest,
    Flush,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingest => write!(f, "ingest"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The consumer rejected a window.  Fatal to the decoding session.
    #[error("{op}: consumer rejected window {window} (stream offset {offset})")]
    Consumer {
        op: Operation,
        window: u64,
        offset: u64,
        #[source]
        source: ConsumerError,
    },

    /// A fresh region could not be allocated.  No window was delivered and
    /// the pending bytes are still buffered.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// An earlier consumer failure ended this session.
    #[error("decoder halted after a consumer failure; start a new decoder to continue")]
    Halted,

    #[error("invalid window capacity {0}: must be at least 1 byte")]
    InvalidCapacity(usize),
}

impl DecodeError {
    /// The operation that triggered a consumer failure, if this is one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Consumer { op, .. } => Some(*op),
            _ => None,
        }
    }
}
