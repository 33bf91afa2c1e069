//! Detection of timestamps corrupted around the coarse counter wrap.
//!
//! The extended counter and the 32-bit coarse counter are latched
//! separately. Close to the wrap one of them can be stale, which shifts the
//! complete time by a full wrap period (~8.6 s at 2 ns per tick).

use contracts::{TickStamp, TimeBase, COARSE_WRAP_TICKS};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WrapFault {
    #[error("extended time incremented at coarse {coarse} before the counter reset")]
    ExtendedBeforeReset { coarse: u32 },

    #[error("coarse counter reset to {coarse} without an extended time increment")]
    ResetWithoutExtended { coarse: u32 },
}

/// Per-channel memory of the last accepted counter pair
#[derive(Debug, Clone)]
pub struct WrapGuard {
    guard_ticks: u64,
    previous: Option<TickStamp>,
}

impl WrapGuard {
    pub fn new(timebase: &TimeBase, wrap_guard_ns: f64) -> Self {
        let guard_ticks = (wrap_guard_ns / timebase.sample_period_ns).ceil().max(0.0) as u64;
        Self {
            guard_ticks,
            previous: None,
        }
    }

    pub fn guard_ticks(&self) -> u64 {
        self.guard_ticks
    }

    #[inline]
    fn in_top_band(&self, coarse: u32) -> bool {
        u64::from(coarse) >= COARSE_WRAP_TICKS.saturating_sub(self.guard_ticks)
    }

    #[inline]
    fn in_bottom_band(&self, coarse: u32) -> bool {
        u64::from(coarse) < self.guard_ticks
    }

    /// Check `stamp` against the previous accepted one without remembering it
    pub fn inspect(&self, stamp: TickStamp) -> Result<(), WrapFault> {
        let Some(previous) = self.previous else {
            return Ok(());
        };

        if stamp.extended > previous.extended && self.in_top_band(stamp.coarse) {
            return Err(WrapFault::ExtendedBeforeReset {
                coarse: stamp.coarse,
            });
        }

        if stamp.extended == previous.extended
            && self.in_bottom_band(stamp.coarse)
            && self.in_top_band(previous.coarse)
        {
            return Err(WrapFault::ResetWithoutExtended {
                coarse: stamp.coarse,
            });
        }

        Ok(())
    }

    /// Check `stamp` and remember it when it is sound
    pub fn check(&mut self, stamp: TickStamp) -> Result<(), WrapFault> {
        self.inspect(stamp)?;
        self.previous = Some(stamp);
        Ok(())
    }

    /// Remember `stamp` without checking it
    pub fn commit(&mut self, stamp: TickStamp) {
        self.previous = Some(stamp);
    }

    /// Forget the previous stamp (hardware counters were reset)
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
