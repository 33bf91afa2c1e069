//! # Dispatcher
//!
//! Record distribution module.
//!
//! Responsibilities:
//! - Consume `OutputRecord`s in engine order
//! - Fan-out to multiple sinks
//! - Isolate each sink behind its own bounded queue

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{OutputRecord, RecordSink};
pub use dispatcher::{
    DispatchReport, Dispatcher, DispatcherBuilder, DispatcherConfig, create_dispatcher,
};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
