//! RawEventSource trait - random-access raw event input
//!
//! The synchronization core never streams: it walks explicit cursors over an
//! indexable sequence, so resynchronization can jump forward without rescans.

use crate::RawEvent;

/// Finite, index-seekable sequence of raw events in arrival order.
///
/// Shared read-only by all channel passes, hence `Send + Sync`.
///
/// # Design Principles
///
/// 1. **Random access**: cursors move by index, never by re-reading a stream
/// 2. **Immutability**: events are never modified once the source is built
/// 3. **Synthetic-friendly**: a plain `Vec<RawEvent>` is a valid source, which
///    keeps state machine tests free of any I/O
///
/// # Example
///
/// ```
/// use contracts::{RawEvent, RawEventSource};
///
/// let events = vec![RawEvent::dpp(0, 0, 10), RawEvent::dpp(2, 0, 12)];
/// assert_eq!(events.len(), 2);
/// assert_eq!(RawEventSource::event(&events, 1).map(|e| e.channel.get()), Some(2));
/// ```
pub trait RawEventSource: Send + Sync {
    /// Number of events in the source
    fn len(&self) -> usize;

    /// Event at `index`, `None` past the end
    fn event(&self, index: usize) -> Option<&RawEvent>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawEventSource for [RawEvent] {
    fn len(&self) -> usize {
        <[RawEvent]>::len(self)
    }

    fn event(&self, index: usize) -> Option<&RawEvent> {
        self.get(index)
    }
}

impl RawEventSource for Vec<RawEvent> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn event(&self, index: usize) -> Option<&RawEvent> {
        self.get(index)
    }
}
