//! Ingestion error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    /// The stream ended inside an event
    #[error("truncated event at byte {offset}: needed {needed} bytes, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown event type {code} at byte {offset} (expected 1 = DPP or 2 = waveform)")]
    UnknownEventType { offset: usize, code: u32 },

    /// The EXTRAS word uses a layout the decoder does not implement
    #[error("unsupported extras selector {extra_select} at byte {offset}")]
    UnsupportedExtras { offset: usize, extra_select: u16 },

    /// The event cannot be represented in the on-disk format
    #[error("cannot encode event: {message}")]
    Encode { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
