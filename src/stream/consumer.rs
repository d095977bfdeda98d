// Consumer contract.
//
// The consumer receives each completed window by value, in delivery order,
// synchronously on the decoder's thread.  Taking the `Window` by value is the
// ownership transfer: from that point the consumer alone decides when the
// window's region is released (explicitly, or by dropping the window).
//
// Returning an error aborts the enclosing `ingest`/`flush` call and halts
// the decoder.

use crate::window::Window;

/// Error a consumer reports for a window it could not handle.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Receives completed windows.
pub trait Consumer {
    fn consume(&mut self, window: Window) -> Result<(), ConsumerError>;
}

/// Closures are consumers; whatever they capture is the consumer context.
impl<F> Consumer for F
where
    F: FnMut(Window) -> Result<(), ConsumerError>,
{
    fn consume(&mut self, window: Window) -> Result<(), ConsumerError> {
        self(window)
    }
}

/// Pin a closure's signature so its error type is inferred as `ConsumerError`.
///
/// ```
/// use windelta::stream::{self, DecoderOptions};
///
/// let mut seen = Vec::new();
/// let consumer = stream::from_fn(|w| {
///     seen.push(w.len());
///     Ok(())
/// });
/// let mut dec = stream::make_decoder(consumer, DecoderOptions::default()).unwrap();
/// dec.ingest(b"abcdefg").unwrap();
/// dec.flush().unwrap();
/// drop(dec);
/// assert_eq!(seen, [5, 2]);
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: FnMut(Window) -> Result<(), ConsumerError>,
{
    f
}

/// Keeps every delivered window, in order.
///
/// Regions stay live until the collector (or the windows taken out of it)
/// is dropped.
#[derive(Debug, Default)]
pub struct Collector {
    windows: Vec<Window>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Payloads of all collected windows, concatenated in delivery order.
    pub fn concat_payloads(&self) -> Vec<u8> {
        self.windows
            .iter()
            .flat_map(|w| w.payload().iter().copied())
            .collect()
    }

    pub fn into_windows(self) -> Vec<Window> {
        self.windows
    }
}

impl Consumer for Collector {
    fn consume(&mut self, window: Window) -> Result<(), ConsumerError> {
        self.windows.push(window);
        Ok(())
    }
}
