//! Waveform epoch chaining.

use contracts::WaveformEpoch;

/// Position of one waveform event inside its epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformSlot {
    pub epoch_id: u64,
    pub sub_index: u64,
    pub opened_epoch: bool,
}

/// Chains waveform events of one channel into `WaveformEpoch`s
#[derive(Debug, Clone, Default)]
pub struct WaveformTracker {
    epochs: Vec<WaveformEpoch>,
    sub_index: u64,
    previous_time: Option<f64>,
}

impl WaveformTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time since the previous waveform event
    #[inline]
    pub fn delta(&self, time: f64) -> Option<f64> {
        self.previous_time.map(|previous| time - previous)
    }

    /// Place an event at `time`, opening a new epoch when asked to
    pub fn advance(&mut self, time: f64, new_epoch: bool) -> WaveformSlot {
        let opened_epoch = new_epoch || self.epochs.is_empty();
        if opened_epoch {
            self.epochs.push(WaveformEpoch {
                epoch_id: self.epochs.len() as u64,
                epoch_start_time: time,
            });
            self.sub_index = 0;
        } else {
            self.sub_index += 1;
        }
        self.previous_time = Some(time);

        WaveformSlot {
            epoch_id: self.epochs.len() as u64 - 1,
            sub_index: self.sub_index,
            opened_epoch,
        }
    }

    pub fn epochs(&self) -> &[WaveformEpoch] {
        &self.epochs
    }

    pub fn into_epochs(self) -> Vec<WaveformEpoch> {
        self.epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_index_restarts_per_epoch() {
        let mut tracker = WaveformTracker::new();
        assert_eq!(tracker.delta(0.0), None);

        let a = tracker.advance(0.0, true);
        let b = tracker.advance(2.0, false);
        let c = tracker.advance(1_500_000.0, true);

        assert_eq!((a.epoch_id, a.sub_index), (0, 0));
        assert_eq!((b.epoch_id, b.sub_index), (0, 1));
        assert_eq!((c.epoch_id, c.sub_index), (1, 0));
        assert!(c.opened_epoch);
        assert_eq!(tracker.epochs()[1].epoch_start_time, 1_500_000.0);
        assert_eq!(tracker.delta(1_500_010.0), Some(10.0));
    }
}
