//! # Sync Engine
//!
//! Macropulse synchronization of a channel-multiplexed digitizer stream.
//!
//! Responsibilities:
//! - Build the macropulse marker table from the reference clock channel
//! - Demultiplex every detector channel against that table
//! - Recover from counter wraps, mode switches and beam anomalies
//! - Emit `DppRecord`, `WaveformRecord` and audit `LogEntry` values
//!
//! ## Example
//!
//! ```ignore
//! use sync_engine::{CancelFlag, SyncEngine};
//!
//! let engine = SyncEngine::new(blueprint.to_sync_config());
//! let output = engine.run(&arena, &CancelFlag::new())?;
//!
//! for record in output.records() {
//!     dispatcher.dispatch(record).await?;
//! }
//! ```

mod cancel;
mod classifier;
mod clock;
mod demux;
mod engine;
mod transition;
mod waveform;
mod wrap;

pub use cancel::CancelFlag;
pub use classifier::classify_target;
pub use clock::{ClockStats, ClockTrack, MarkerTable};
pub use demux::{ChannelDemultiplexer, ChannelOutput, ChannelSyncState, Cursor};
pub use engine::{ChannelIndex, SyncEngine, SyncOutput};
pub use transition::{transition, TrackingMode, Transition};
pub use waveform::{WaveformSlot, WaveformTracker};
pub use wrap::{WrapFault, WrapGuard};

// Re-export contracts types
pub use contracts::{
    ChannelId, ChannelStats, ChannelSyncConfig, DppRecord, LogEntry, LogKind, MacropulseMarker,
    OutputRecord, RawEvent, RawEventSource, SyncConfig, WaveformEpoch, WaveformRecord,
};
