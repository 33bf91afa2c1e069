//! Synthetic run generator
//!
//! Produces deterministic raw streams for tests and the `simulate` command:
//! clock pulses at the nominal macropulse period carrying target-position
//! charges, detector events inside each beam-on window, optional waveform
//! periods that reset the hardware counters, and injected faults.

use std::collections::BTreeSet;

use contracts::{ChannelId, RawEvent, TargetGateTable, TickStamp, TimeBase, COARSE_WRAP_TICKS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Extra delay injected at an anomaly, in nominal periods (not a multiple)
const ANOMALY_PERIODS: f64 = 5.5;

/// Detector channel of a synthetic run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockChannel {
    pub channel: ChannelId,
    pub offset_ns: f64,
}

/// Generator settings
#[derive(Debug, Clone)]
pub struct MockRunConfig {
    pub seed: u64,
    pub pulses: usize,
    pub timebase: TimeBase,
    pub nominal_period_ns: f64,
    pub clock_channel: ChannelId,
    pub channels: Vec<MockChannel>,
    /// Upper bound of detector events per channel and pulse
    pub events_per_pulse: usize,
    /// Beam-on part of each macropulse that detector events fall into (ns)
    pub beam_on_ns: f64,
    /// Macropulses per target slot before the changer moves on
    pub pulses_per_target: usize,
    /// Insert a waveform period after every n-th pulse
    pub waveform_every: Option<usize>,
    /// Waveform events per channel in one waveform period
    pub waveform_events: usize,
    pub waveform_samples: usize,
    /// Pulses followed by a non-multiple gap
    pub anomalies: BTreeSet<usize>,
    /// Pulses carrying one extra detector event with a wrap-corrupted timestamp
    pub wrap_faults: BTreeSet<usize>,
}

impl Default for MockRunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            pulses: 100,
            timebase: TimeBase::default(),
            nominal_period_ns: 1e9 / 120.0,
            clock_channel: ChannelId::new(0),
            channels: vec![
                MockChannel {
                    channel: ChannelId::new(2),
                    offset_ns: 775.0,
                },
                MockChannel {
                    channel: ChannelId::new(4),
                    offset_ns: 775.0,
                },
                MockChannel {
                    channel: ChannelId::new(6),
                    offset_ns: 767.0,
                },
            ],
            events_per_pulse: 8,
            beam_on_ns: 650_000.0,
            pulses_per_target: 10,
            waveform_every: None,
            waveform_events: 20,
            waveform_samples: 16,
            anomalies: BTreeSet::new(),
            wrap_faults: BTreeSet::new(),
        }
    }
}

/// Generated stream plus the ground truth needed by tests
#[derive(Debug, Clone, Default)]
pub struct MockRun {
    pub events: Vec<RawEvent>,
    /// Absolute start time of each clock pulse, in emission order
    pub pulse_starts: Vec<f64>,
    /// Sound DPP detector events generated, all channels
    pub detector_events: usize,
}

/// Builder for synthetic runs
#[derive(Debug, Clone, Default)]
pub struct MockRunBuilder {
    config: MockRunConfig,
}

impl MockRunBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            config: MockRunConfig {
                seed,
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: MockRunConfig) -> Self {
        Self { config }
    }

    pub fn pulses(mut self, pulses: usize) -> Self {
        self.config.pulses = pulses;
        self
    }

    pub fn channels(mut self, channels: Vec<MockChannel>) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn events_per_pulse(mut self, events: usize) -> Self {
        self.config.events_per_pulse = events;
        self
    }

    pub fn waveform_every(mut self, pulses: usize) -> Self {
        self.config.waveform_every = (pulses > 0).then_some(pulses);
        self
    }

    pub fn anomaly_at(mut self, pulse: usize) -> Self {
        self.config.anomalies.insert(pulse);
        self
    }

    pub fn wrap_fault_at(mut self, pulse: usize) -> Self {
        self.config.wrap_faults.insert(pulse);
        self
    }

    pub fn config(&self) -> &MockRunConfig {
        &self.config
    }

    pub fn build(&self) -> MockRun {
        let config = &self.config;
        let gates = TargetGateTable::default();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut run = MockRun::default();

        // Time since the last counter reset
        let mut now = 1_000_000.0;
        for pulse in 0..config.pulses {
            let slot = (pulse / config.pulses_per_target.max(1)) % gates.len();
            let gate = gates.gates()[slot];
            let charge = rng.random_range(gate.low..gate.high) as u16;
            let start = self.snap(now);
            run.pulse_starts.push(start);

            let mut batch = vec![(start, self.at(config.clock_channel, start).with_charges(charge / 2, charge))];
            for channel in &config.channels {
                let count = rng.random_range(0..=config.events_per_pulse);
                for _ in 0..count {
                    let delay = rng.random_range(0.0..config.beam_on_ns);
                    let time = self.snap(start + channel.offset_ns + delay);
                    let short_gate: u16 = rng.random_range(100..2000);
                    let long_gate = (f64::from(short_gate) * rng.random_range(1.5..2.1)) as u16;
                    let fine: u16 = rng.random_range(0..1024);
                    let fine_ns = f64::from(fine) * config.timebase.sample_period_ns / 1024.0;
                    batch.push((
                        time + fine_ns,
                        self.at(channel.channel, time)
                            .with_charges(short_gate, long_gate)
                            .with_fine_time(fine),
                    ));
                    run.detector_events += 1;
                }
            }
            // Arrival order is time order within a pulse; ties keep the clock first
            batch.sort_by(|a, b| a.0.total_cmp(&b.0));

            if config.wrap_faults.contains(&pulse) {
                if let Some(channel) = config.channels.first() {
                    // A sound event right before gives the guard a reference stamp
                    let anchor = self.snap(start + channel.offset_ns + config.beam_on_ns);
                    batch.push((anchor, self.at(channel.channel, anchor).with_charges(500, 900)));
                    run.detector_events += 1;

                    let stamp = config.timebase.ns_to_stamp(anchor);
                    let corrupted = TickStamp {
                        extended: stamp.extended + 1,
                        coarse: (COARSE_WRAP_TICKS - 10) as u32,
                    };
                    batch.push((
                        start,
                        RawEvent::dpp(channel.channel, corrupted.extended, corrupted.coarse)
                            .with_charges(500, 900),
                    ));
                }
            }
            run.events.extend(batch.into_iter().map(|(_, event)| event));

            now += config.nominal_period_ns;
            if config.anomalies.contains(&pulse) {
                now += ANOMALY_PERIODS * config.nominal_period_ns;
            }

            if let Some(every) = config.waveform_every {
                if (pulse + 1) % every == 0 && pulse + 1 < config.pulses {
                    self.push_waveform_period(&mut rng, &mut run.events);
                    // Counters restart; DPP resumes after the waveform period
                    now = 2_000_000.0;
                }
            }
        }

        run
    }

    fn push_waveform_period(&self, rng: &mut StdRng, events: &mut Vec<RawEvent>) {
        let config = &self.config;
        let mut channels = vec![config.clock_channel];
        channels.extend(config.channels.iter().map(|c| c.channel));

        for i in 0..config.waveform_events {
            let time = self.snap(1_000.0 + i as f64 * 10_000.0);
            for &channel in &channels {
                let samples = (0..config.waveform_samples)
                    .map(|_| rng.random_range(7900..8100))
                    .collect();
                let stamp = config.timebase.ns_to_stamp(time);
                events.push(RawEvent::waveform(channel, 0, stamp.coarse, samples));
            }
        }
    }

    /// Round to the digitizer tick grid
    fn snap(&self, ns: f64) -> f64 {
        let period = self.config.timebase.sample_period_ns;
        (ns / period).round() * period
    }

    fn at(&self, channel: ChannelId, ns: f64) -> RawEvent {
        let stamp = self.config.timebase.ns_to_stamp(ns);
        RawEvent::dpp(channel, stamp.extended, stamp.coarse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EventMode;

    #[test]
    fn test_same_seed_same_stream() {
        let a = MockRunBuilder::new(7).pulses(20).build();
        let b = MockRunBuilder::new(7).pulses(20).build();
        let c = MockRunBuilder::new(8).pulses(20).build();
        assert_eq!(a.events, b.events);
        assert_ne!(a.events, c.events);
    }

    #[test]
    fn test_clock_pulses_at_nominal_period() {
        let run = MockRunBuilder::new(1).pulses(30).build();
        let clock: Vec<&RawEvent> = run
            .events
            .iter()
            .filter(|e| e.channel == ChannelId::new(0))
            .collect();
        assert_eq!(clock.len(), 30);
        assert_eq!(run.pulse_starts.len(), 30);
        for pair in run.pulse_starts.windows(2) {
            assert!((pair[1] - pair[0] - 1e9 / 120.0).abs() <= 2.0);
        }
        // Ten pulses per target slot
        assert!((2000..3500).contains(&clock[0].long_gate_charge));
        assert!((4500..6000).contains(&clock[10].long_gate_charge));
    }

    #[test]
    fn test_anomaly_gap() {
        let run = MockRunBuilder::new(1).pulses(6).anomaly_at(2).build();
        let gap = run.pulse_starts[3] - run.pulse_starts[2];
        assert!((gap / (1e9 / 120.0) - 6.5).abs() < 1e-3);
    }

    #[test]
    fn test_waveform_periods_reset_time() {
        let run = MockRunBuilder::new(3).pulses(10).waveform_every(5).build();
        let waveforms = run
            .events
            .iter()
            .filter(|e| e.mode == EventMode::Waveform)
            .count();
        assert_eq!(waveforms, 20 * 4);
        assert!(run.pulse_starts[5] < run.pulse_starts[4]);
    }

    #[test]
    fn test_wrap_fault_event() {
        let run = MockRunBuilder::new(3).pulses(3).wrap_fault_at(1).build();
        let faulty = run
            .events
            .iter()
            .filter(|e| e.coarse_time == u32::MAX - 9)
            .count();
        assert_eq!(faulty, 1);
    }
}
