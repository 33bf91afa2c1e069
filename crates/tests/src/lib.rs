//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - Reference scenarios run through the whole engine, clock channel included
//! - Run properties on synthetic runs (determinism, ordering, coverage, windows)
//! - `.evt` file -> arena -> engine -> dispatcher pipelines

#[cfg(test)]
mod support {
    use contracts::{ChannelSyncConfig, RawEvent, SyncConfig, TimeBase};
    use ingestion::MockRunBuilder;
    use sync_engine::{CancelFlag, SyncEngine, SyncOutput};

    pub const PERIOD: f64 = 1e9 / 120.0;
    pub const LIMIT: f64 = 8_330_000.0;

    /// Long-gate charge of target slot 2
    pub const CLOCK_CHARGE: u16 = 5000;

    /// DPP event at `ns` on the default 2 ns time base
    pub fn at(channel: u32, ns: f64, long_gate: u16) -> RawEvent {
        let stamp = TimeBase::default().ns_to_stamp(ns);
        RawEvent::dpp(channel, stamp.extended, stamp.coarse).with_charges(long_gate / 2, long_gate)
    }

    pub fn clock(ns: f64) -> RawEvent {
        at(0, ns, CLOCK_CHARGE)
    }

    pub fn waveform(channel: u32, ns: f64) -> RawEvent {
        let stamp = TimeBase::default().ns_to_stamp(ns);
        RawEvent::waveform(channel, stamp.extended, stamp.coarse, vec![8000, 7990, 8004])
    }

    /// Order events by time the way the digitizer interleaves them
    pub fn interleave(mut timed: Vec<(f64, RawEvent)>) -> Vec<RawEvent> {
        timed.sort_by(|a, b| a.0.total_cmp(&b.0));
        timed.into_iter().map(|(_, event)| event).collect()
    }

    pub fn config(channels: Vec<ChannelSyncConfig>) -> SyncConfig {
        SyncConfig {
            channels,
            ..Default::default()
        }
    }

    /// Engine settings matching a synthetic run's channels
    pub fn mock_config(builder: &MockRunBuilder) -> SyncConfig {
        config(
            builder
                .config()
                .channels
                .iter()
                .map(|c| ChannelSyncConfig::new(c.channel, c.offset_ns, LIMIT))
                .collect(),
        )
    }

    pub fn sync(events: &[RawEvent], config: SyncConfig) -> SyncOutput {
        SyncEngine::new(config)
            .run(events, &CancelFlag::new())
            .unwrap()
    }
}

#[cfg(test)]
mod scenario_tests {
    use contracts::{ChannelId, ChannelSyncConfig, LogKind};

    use crate::support::*;

    #[test]
    fn test_events_follow_their_macropulse() {
        let events = interleave(vec![
            (0.0, clock(0.0)),
            (4_000_000.0, at(2, 4_000_000.0, 700)),
            (4_005_000.0, at(2, 4_005_000.0, 650)),
            (8_330_000.0, clock(8_330_000.0)),
            (16_660_000.0, clock(16_660_000.0)),
        ]);
        let output = sync(&events, config(vec![ChannelSyncConfig::new(2, 951.0, LIMIT)]));

        assert_eq!(output.clock.markers.len(), 3);
        assert!(output.clock.markers.iter().all(|m| m.target_position == 2));

        let channel = output.channel(ChannelId::new(2)).unwrap();
        let seen: Vec<(u64, u64)> = channel
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (0, 1)]);
        assert_eq!(channel.dpp[0].macro_start_time, 0.0);
        assert_eq!(channel.dpp[1].absolute_time, 4_005_000.0);
        assert!(channel.log.is_empty());
    }

    #[test]
    fn test_clock_jump_raises_one_beam_anomaly() {
        let starts = [0.0, 8_330_000.0, 100_000_000.0, 108_330_000.0, 116_660_000.0];
        let detector = [1_000_000.0, 20_000_000.0, 50_000_000.0, 101_000_000.0, 109_000_000.0];
        let mut timed: Vec<_> = starts.iter().map(|&t| (t, clock(t))).collect();
        timed.extend(detector.iter().map(|&t| (t, at(2, t, 700))));
        let events = interleave(timed);

        let output = sync(&events, config(vec![ChannelSyncConfig::new(2, 951.0, LIMIT)]));
        let channel = output.channel(ChannelId::new(2)).unwrap();

        let anomalies: Vec<_> = channel
            .log
            .iter()
            .filter(|e| e.kind == LogKind::BeamAnomaly)
            .collect();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].macropulse_index, Some(1));
        assert_eq!(anomalies[0].discarded_events, 3);

        // Nothing between the expected and the actual next marker survives
        assert!(channel
            .dpp
            .iter()
            .all(|r| r.absolute_time < 16_660_000.0 || r.absolute_time > 108_330_000.0));
        let seen: Vec<(u64, u64)> = channel
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (3, 0)]);
        assert_eq!(channel.stats.accounted(), channel.stats.events_seen);
    }

    #[test]
    fn test_reset_without_extended_increment_is_dropped() {
        let start = 8_589_930_000.0;
        let events = vec![
            clock(start),
            contracts::RawEvent::dpp(4, 0, 4_294_967_200).with_charges(300, 600),
            contracts::RawEvent::dpp(4, 0, 40).with_charges(300, 600),
            contracts::RawEvent::dpp(4, 1, 40).with_charges(300, 600),
            clock(start + PERIOD),
        ];
        let mut channel = ChannelSyncConfig::new(4, 0.0, LIMIT);
        channel.use_fine_time = false;
        let output = sync(&events, config(vec![channel]));
        let channel = output.channel(ChannelId::new(4)).unwrap();

        let corrupted: Vec<_> = channel
            .log
            .iter()
            .filter(|e| e.kind == LogKind::CorruptedTimestamp)
            .collect();
        assert_eq!(corrupted.len(), 1);
        assert_eq!(corrupted[0].absolute_time, 80.0);
        assert_eq!(corrupted[0].discarded_events, 1);
        assert_eq!(channel.dpp.len(), 2);
        assert!(channel.dpp.iter().all(|r| r.macropulse_index == 0));
    }

    #[test]
    fn test_waveform_gap_opens_second_epoch() {
        let mut events: Vec<_> = (0..350_000u32)
            .map(|i| waveform(6, f64::from(i) * 2.0))
            .collect();
        events.push(waveform(6, 1_500_000.0));
        events.push(clock(2_000_000.0));

        let output = sync(&events, config(vec![ChannelSyncConfig::new(6, 767.0, LIMIT)]));
        let channel = output.channel(ChannelId::new(6)).unwrap();

        let epochs: Vec<(u64, f64)> = channel
            .epochs
            .iter()
            .map(|e| (e.epoch_id, e.epoch_start_time))
            .collect();
        assert_eq!(epochs, vec![(0, 0.0), (1, 1_500_000.0)]);

        let last = channel.waveform.last().unwrap();
        assert_eq!((last.epoch_id, last.sub_index), (1, 0));
        assert_eq!(channel.waveform[349_999].sub_index, 349_999);
        assert_eq!(channel.stats.waveform_emitted, 350_001);
    }
}

#[cfg(test)]
mod property_tests {
    use contracts::{ChannelId, ChannelSyncConfig, LogKind};
    use ingestion::MockRunBuilder;
    use sync_engine::SyncOutput;

    use crate::support::*;

    /// 50 pulses with a wrap fault, a waveform period after pulse 24 and a
    /// beam anomaly after pulse 30
    fn faulty_run() -> (MockRunBuilder, SyncOutput) {
        let builder = MockRunBuilder::new(42)
            .pulses(50)
            .wrap_fault_at(10)
            .waveform_every(25)
            .anomaly_at(30);
        let run = builder.build();
        let output = sync(&run.events, mock_config(&builder));
        (builder, output)
    }

    #[test]
    fn test_same_input_same_output() {
        let builder = MockRunBuilder::new(9).pulses(40).anomaly_at(12);
        let run = builder.build();
        let first: Vec<_> = sync(&run.events, mock_config(&builder)).records().collect();
        let second: Vec<_> = sync(&run.events, mock_config(&builder)).records().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_macropulse_index_monotonic() {
        let (_, output) = faulty_run();
        for channel in &output.channels {
            assert!(!channel.dpp.is_empty());
            for pair in channel.dpp.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(b.macropulse_index >= a.macropulse_index);
                if b.macropulse_index == a.macropulse_index {
                    assert_eq!(b.within_macro_sequence, a.within_macro_sequence + 1);
                } else {
                    assert_eq!(b.within_macro_sequence, 0);
                }
            }
            assert_eq!(channel.dpp[0].within_macro_sequence, 0);
        }
    }

    #[test]
    fn test_every_event_emitted_or_logged() {
        let (_, output) = faulty_run();
        for channel in &output.channels {
            let stats = &channel.stats;
            assert_eq!(stats.accounted(), stats.events_seen, "channel {}", channel.channel);

            let logged: u64 = channel.log.iter().map(|e| e.discarded_events).sum();
            assert_eq!(
                logged,
                stats.events_seen - stats.dpp_emitted - stats.waveform_emitted,
                "channel {}",
                channel.channel
            );
        }
    }

    #[test]
    fn test_emitted_dpp_inside_window() {
        let (builder, output) = faulty_run();
        let config = mock_config(&builder);
        for channel in &output.channels {
            let settings = config.channel(channel.channel).unwrap();
            for record in &channel.dpp {
                let delta = record.absolute_time - record.macro_start_time - settings.offset_ns;
                assert!(
                    (0.0..settings.period_limit_ns).contains(&delta),
                    "channel {} record at {} outside window",
                    channel.channel,
                    record.absolute_time
                );
            }
        }
    }

    #[test]
    fn test_injected_faults_are_logged() {
        let (_, output) = faulty_run();

        assert_eq!(output.clock.markers.len(), 50);
        let new_epochs: Vec<u64> = output
            .clock
            .markers
            .iter()
            .filter(|m| m.is_new_epoch)
            .map(|m| m.index)
            .collect();
        assert_eq!(new_epochs, vec![25]);
        assert_eq!(output.clock.epochs.len(), 1);

        for channel in &output.channels {
            assert_eq!(channel.stats.beam_anomalies, 1, "channel {}", channel.channel);
            let anomaly = channel
                .log
                .iter()
                .find(|e| e.kind == LogKind::BeamAnomaly)
                .unwrap();
            assert_eq!(anomaly.macropulse_index, Some(30));
            assert!(channel.dpp.iter().all(|r| r.macropulse_index != 31));

            assert_eq!(channel.epochs.len(), 1);
            assert_eq!(channel.stats.waveform_emitted, 20);
            assert!(channel.dpp.iter().any(|r| r.macropulse_index >= 25));
        }

        let first = output.channel(ChannelId::new(2)).unwrap();
        assert_eq!(first.stats.corrupted, 1);
        let others_corrupted: u64 = output
            .channels
            .iter()
            .filter(|c| c.channel != ChannelId::new(2))
            .map(|c| c.stats.corrupted)
            .sum();
        assert_eq!(others_corrupted, 0);
    }

    #[test]
    fn test_period_multiples_are_not_anomalies() {
        let starts = [0.0, PERIOD, 3.0 * PERIOD, 6.0 * PERIOD, 7.0 * PERIOD];
        let mut timed = Vec::new();
        for &start in &starts {
            timed.push((start, clock(start)));
            timed.push((start + 1_000.0, at(2, start + 1_000.0, 700)));
        }
        let output = sync(
            &interleave(timed),
            config(vec![ChannelSyncConfig::new(2, 775.0, LIMIT)]),
        );
        let channel = output.channel(ChannelId::new(2)).unwrap();

        assert_eq!(channel.stats.beam_anomalies, 0);
        assert!(channel.log.is_empty());
        let indices: Vec<u64> = channel.dpp.iter().map(|r| r.macropulse_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_non_multiple_gap_resumes_at_next_valid_marker() {
        let starts = [0.0, PERIOD, 2.0 * PERIOD, 7.5 * PERIOD, 8.5 * PERIOD, 9.5 * PERIOD];
        let mut timed = Vec::new();
        for &start in &starts {
            timed.push((start, clock(start)));
            timed.push((start + 1_000.0, at(2, start + 1_000.0, 700)));
        }
        let output = sync(
            &interleave(timed),
            config(vec![ChannelSyncConfig::new(2, 775.0, LIMIT)]),
        );
        let channel = output.channel(ChannelId::new(2)).unwrap();

        assert_eq!(channel.stats.beam_anomalies, 1);
        let anomaly = &channel.log[0];
        assert_eq!(anomaly.kind, LogKind::BeamAnomaly);
        assert_eq!(anomaly.macropulse_index, Some(2));
        assert_eq!(anomaly.discarded_events, 1);

        let indices: Vec<u64> = channel.dpp.iter().map(|r| r.macropulse_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 4, 5]);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeMap;
    use std::fs::{self, File};
    use std::io::BufWriter;
    use std::path::Path;
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ChannelId, InputConfig, OutputRecord, SinkConfig, SinkType};
    use dispatcher::{create_dispatcher, DispatchReport};
    use ingestion::{EventArena, EvtWriter, IngestionMetrics, MockRunBuilder};
    use sync_engine::{CancelFlag, SyncEngine, SyncOutput};
    use tokio::sync::mpsc;

    use crate::support::*;

    fn write_evt(path: &Path, events: &[contracts::RawEvent]) {
        let mut writer = EvtWriter::new(BufWriter::new(File::create(path).unwrap()));
        for event in events {
            writer.write_event(event).unwrap();
        }
        writer.finish().unwrap();
    }

    fn file_sink(dir: &Path) -> SinkConfig {
        SinkConfig {
            name: "files".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 64,
            params: BTreeMap::from([(
                "base_path".to_string(),
                dir.to_string_lossy().into_owned(),
            )]),
        }
    }

    async fn dispatch(output: &SyncOutput, sinks: Vec<SinkConfig>) -> DispatchReport {
        let (tx, rx) = mpsc::channel::<OutputRecord>(128);
        let handle = create_dispatcher(sinks, rx).await.unwrap().spawn();
        for record in output.records() {
            tx.send(record).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap()
    }

    fn read_dir_sorted(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                (name, fs::read(&path).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    /// End-to-end: synthetic run -> .evt file -> arena -> engine
    #[test]
    fn test_evt_file_feeds_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.evt");
        let builder = MockRunBuilder::new(5).pulses(30).waveform_every(15);
        let run = builder.build();
        write_evt(&path, &run.events);

        let metrics = Arc::new(IngestionMetrics::new());
        let arena = EventArena::load(&path, &InputConfig::default(), metrics.clone()).unwrap();
        assert_eq!(arena.as_slice(), run.events.as_slice());
        assert_eq!(metrics.snapshot().events_decoded, run.events.len() as u64);

        let engine = SyncEngine::new(mock_config(&builder));
        let from_file = engine.run(&arena, &CancelFlag::new()).unwrap();
        let from_memory = engine.run(&run.events, &CancelFlag::new()).unwrap();
        assert_eq!(
            from_file.records().collect::<Vec<_>>(),
            from_memory.records().collect::<Vec<_>>()
        );

        let emitted: u64 = from_file.channels.iter().map(|c| c.stats.dpp_emitted).sum();
        assert_eq!(emitted, run.detector_events as u64);
    }

    /// Two runs over the same input write byte-identical files
    #[tokio::test]
    async fn test_file_output_is_idempotent() {
        let builder = MockRunBuilder::new(11)
            .pulses(40)
            .anomaly_at(7)
            .wrap_fault_at(20)
            .waveform_every(30);
        let run = builder.build();

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [first.path(), second.path()] {
            let output = sync(&run.events, mock_config(&builder));
            let report = dispatch(&output, vec![file_sink(dir)]).await;
            assert_eq!(report.records, output.record_count() as u64);
            assert_eq!(report.total_failures(), 0);
        }

        let a = read_dir_sorted(first.path());
        let b = read_dir_sorted(second.path());
        let names: Vec<&str> = a.iter().map(|(name, _)| name.as_str()).collect();
        assert!(names.contains(&"markers.jsonl"));
        assert!(names.contains(&"ch2_dpp.jsonl"));
        assert!(names.contains(&"ch6_waveform.jsonl"));
        assert!(names.contains(&"error_log.jsonl"));
        assert_eq!(a, b);
    }

    /// End-to-end: TOML run file -> blueprint -> engine -> log and file sinks
    #[tokio::test]
    async fn test_blueprint_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("run.evt");
        let out = dir.path().join("out");

        let builder = MockRunBuilder::new(3).pulses(24).anomaly_at(10);
        let run = builder.build();
        write_evt(&input, &run.events);

        let content = format!(
            r#"
[input]
path = "{input}"

[clock]
channel = 0

[[channels]]
id = 2
name = "monitor"
offset_ns = 775.0

[[channels]]
id = 6
name = "veto"
offset_ns = 767.0

[[sinks]]
name = "summary"
sink_type = "log"

[[sinks]]
name = "files"
sink_type = "file"

[sinks.params]
base_path = "{out}"
"#,
            input = input.display(),
            out = out.display(),
        );
        let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        let config = blueprint.to_sync_config();
        assert_eq!(config.channels[0].channel, ChannelId::new(2));

        let path = blueprint.input.path.clone().unwrap();
        let arena =
            EventArena::load(&path, &blueprint.input, Arc::new(IngestionMetrics::new())).unwrap();
        let output = SyncEngine::new(config)
            .run(&arena, &CancelFlag::new())
            .unwrap();
        // Channel 4 is not configured
        assert_eq!(output.channels.len(), 2);
        assert!(output.channel(ChannelId::new(4)).is_none());

        let report = dispatch(&output, blueprint.sinks.clone()).await;
        assert_eq!(report.sinks.len(), 2);
        for (name, snapshot) in &report.sinks {
            assert_eq!(snapshot.write_count, output.record_count() as u64, "sink {name}");
        }

        let monitor = output.channel(ChannelId::new(2)).unwrap();
        let lines = fs::read_to_string(out.join("ch2_dpp.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), monitor.dpp.len());
        let markers = fs::read_to_string(out.join("markers.jsonl")).unwrap();
        assert_eq!(markers.lines().count(), 24);

        let errors = fs::read_to_string(out.join("error_log.jsonl")).unwrap();
        assert_eq!(
            errors.lines().filter(|l| l.contains("beam_anomaly")).count(),
            2
        );
        assert!(!out.join("ch4_dpp.jsonl").exists());
    }
}
