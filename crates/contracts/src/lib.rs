//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the workspace: the raw
//! event model, macropulse markers, synchronized output records, the audit log
//! and the traits at the source/sink boundaries.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Digitizer timestamps are counted in sample ticks (`sample_period_ns` each)
//! - `extended_time` counts wraps of the 32-bit `coarse_time` counter
//! - All derived times are absolute nanoseconds held in `f64`
//! - A mode switch resets the hardware counters, which starts a new epoch

mod blueprint;
mod channel_id;
mod error;
mod event;
mod marker;
mod record;
mod sink;
mod source;
mod sync_config;

pub use blueprint::*;
pub use channel_id::ChannelId;
pub use error::*;
pub use event::*;
pub use marker::*;
pub use record::*;
pub use sink::*;
pub use source::RawEventSource;
pub use sync_config::*;
