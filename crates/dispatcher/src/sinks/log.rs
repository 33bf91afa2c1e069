//! LogSink - reports records via tracing

use std::collections::BTreeMap;

use contracts::{ContractError, OutputRecord, RecordSink, Severity};
use tracing::{debug, info, instrument, trace, warn};

/// Sink that traces audit entries and summarizes the rest
pub struct LogSink {
    name: String,
    counts: BTreeMap<&'static str, u64>,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: BTreeMap::new(),
        }
    }

    /// Records seen so far, by kind
    pub fn counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.counts
    }

    fn log_record(&self, record: &OutputRecord) {
        match record {
            OutputRecord::Marker(m) => trace!(
                sink = %self.name,
                macropulse = m.index,
                start_time = m.start_time,
                target = m.target_position,
                new_epoch = m.is_new_epoch,
                "Marker"
            ),
            OutputRecord::Dpp(r) => trace!(
                sink = %self.name,
                channel = %r.channel,
                macropulse = r.macropulse_index,
                sequence = r.within_macro_sequence,
                "DPP record"
            ),
            OutputRecord::Waveform(r) => trace!(
                sink = %self.name,
                channel = %r.channel,
                epoch = r.epoch_id,
                sub_index = r.sub_index,
                "Waveform record"
            ),
            OutputRecord::Log(e) => match e.kind.severity() {
                Severity::Warn => warn!(
                    sink = %self.name,
                    channel = %e.channel,
                    kind = %e.kind,
                    macropulse = ?e.macropulse_index,
                    discarded = e.discarded_events,
                    "{}", e.message
                ),
                Severity::Info => info!(
                    sink = %self.name,
                    channel = %e.channel,
                    kind = %e.kind,
                    discarded = e.discarded_events,
                    "{}", e.message
                ),
                Severity::Debug => debug!(
                    sink = %self.name,
                    channel = %e.channel,
                    kind = %e.kind,
                    discarded = e.discarded_events,
                    "{}", e.message
                ),
            },
        }
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, record: &OutputRecord) -> Result<(), ContractError> {
        self.log_record(record);
        *self.counts.entry(record.kind()).or_insert(0) += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            markers = self.counts.get("marker").copied().unwrap_or(0),
            dpp = self.counts.get("dpp").copied().unwrap_or(0),
            waveforms = self.counts.get("waveform").copied().unwrap_or(0),
            log_entries = self.counts.get("log").copied().unwrap_or(0),
            "LogSink closed"
        );
        Ok(())
    }
}
