//! Event subscription and iteration.
//!
//! Generated binding layers repeat one iterator + watcher pair per event
//! type; here both exist once, generic over a [`DecodeEvent`] implementation
//! supplied by the caller (or [`crate::codec::EventCodec`] for dynamically
//! typed events).

mod iterator;
mod watcher;

pub use iterator::EventIterator;
pub use watcher::EventWatch;

pub(crate) use watcher::spawn;

use crate::{error::BindError, types::LogRecord};

/// Decodes one raw log record into a typed event value.
pub trait DecodeEvent: Send + 'static {
    type Event: Send + 'static;

    fn decode(&self, log: &LogRecord) -> Result<Self::Event, BindError>;
}

/// Any `Fn(&LogRecord) -> Result<T, BindError>` works as a decoder, which is
/// the shape generated wrappers provide for their concrete event types.
impl<T, F> DecodeEvent for F
where
    F: Fn(&LogRecord) -> Result<T, BindError> + Send + 'static,
    T: Send + 'static,
{
    type Event = T;

    fn decode(&self, log: &LogRecord) -> Result<T, BindError> {
        self(log)
    }
}
