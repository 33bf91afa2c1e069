//! Decoder metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by readers of one run
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    pub events_decoded: AtomicU64,
    pub dpp_events: AtomicU64,
    pub waveform_events: AtomicU64,
    pub bytes_read: AtomicU64,
    /// Events whose declared size differs from the decoded size
    pub size_mismatches: AtomicU64,
    /// Extended counter increments added by reconstruction
    pub extended_increments: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoded(&self, waveform: bool, bytes: usize) {
        self.events_decoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        if waveform {
            self.waveform_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dpp_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_size_mismatch(&self) {
        self.size_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extended_increment(&self) {
        self.extended_increments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_decoded: self.events_decoded.load(Ordering::Relaxed),
            dpp_events: self.dpp_events.load(Ordering::Relaxed),
            waveform_events: self.waveform_events.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
            extended_increments: self.extended_increments.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_decoded: u64,
    pub dpp_events: u64,
    pub waveform_events: u64,
    pub bytes_read: u64,
    pub size_mismatches: u64,
    pub extended_increments: u64,
}
