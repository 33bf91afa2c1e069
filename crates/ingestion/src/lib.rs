//! # Ingestion
//!
//! Raw digitizer input.
//!
//! Responsibilities:
//! - Decode and encode the `.evt` binary event stream
//! - Rebuild extended timestamps when the hardware did not record them
//! - Hold a run's events in an index-addressable `EventArena`
//! - Generate synthetic runs for tests and simulation
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{EventArena, IngestionMetrics};
//!
//! let metrics = Arc::new(IngestionMetrics::new());
//! let arena = EventArena::load(&path, &blueprint.input, metrics.clone())?;
//! let output = engine.run(&arena, &cancel)?;
//! ```

mod arena;
mod config;
mod error;
mod evt;
mod mock;
mod timebase;

pub use arena::{ChannelSummary, EventArena};
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use evt::{decode_all, encode_event, EvtReader, EvtWriter, ExtrasLayout};
pub use mock::{MockChannel, MockRun, MockRunBuilder, MockRunConfig};
pub use timebase::{rebuild_extended_time, ExtendedTimeRebuilder};
