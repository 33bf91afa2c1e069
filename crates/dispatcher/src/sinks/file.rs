//! FileSink - writes records as JSON lines, one file per stream
//!
//! Layout under `base_path`:
//! - `markers.jsonl`
//! - `ch{N}_dpp.jsonl`
//! - `ch{N}_waveform.jsonl`
//! - `error_log.jsonl`

use contracts::{ContractError, OutputRecord, RecordSink};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &BTreeMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        Self { base_path }
    }
}

/// Sink that writes records to JSON lines files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writers: HashMap<String, BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink, truncating nothing until a stream is first written
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        Ok(Self {
            name: name.into(),
            config,
            writers: HashMap::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &BTreeMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn base_path(&self) -> &std::path::Path {
        &self.config.base_path
    }

    /// File a record is appended to
    pub fn file_name(record: &OutputRecord) -> String {
        match record {
            OutputRecord::Marker(_) => "markers.jsonl".to_string(),
            OutputRecord::Dpp(r) => format!("{}_dpp.jsonl", r.channel.label()),
            OutputRecord::Waveform(r) => format!("{}_waveform.jsonl", r.channel.label()),
            OutputRecord::Log(_) => "error_log.jsonl".to_string(),
        }
    }

    fn writer(&mut self, file_name: String) -> std::io::Result<&mut BufWriter<File>> {
        use std::collections::hash_map::Entry;

        match self.writers.entry(file_name) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.config.base_path.join(entry.key());
                debug!(sink = %self.name, path = %path.display(), "Opening output stream");
                let file = File::create(path)?;
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    fn append(&mut self, record: &OutputRecord) -> std::io::Result<()> {
        let writer = self.writer(Self::file_name(record))?;
        // Each file holds a single kind, so the payload is written untagged
        let result = match record {
            OutputRecord::Marker(m) => serde_json::to_writer(&mut *writer, m),
            OutputRecord::Dpp(r) => serde_json::to_writer(&mut *writer, r),
            OutputRecord::Waveform(r) => serde_json::to_writer(&mut *writer, r),
            OutputRecord::Log(e) => serde_json::to_writer(&mut *writer, e),
        };
        result.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")
    }

    fn persist_record(&mut self, record: &OutputRecord) -> Result<(), ContractError> {
        self.append(record).map_err(|e| {
            error!(sink = %self.name, kind = record.kind(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    fn flush_all(&mut self) -> Result<(), ContractError> {
        for (file, writer) in &mut self.writers {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, format!("{file}: {e}")))?;
        }
        Ok(())
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, record: &OutputRecord) -> Result<(), ContractError> {
        self.persist_record(record)
    }

    #[instrument(name = "file_sink_flush", skip(self), fields(sink = %self.name))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all()
    }

    #[instrument(name = "file_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all()?;
        let files = self.writers.len();
        self.writers.clear();
        debug!(sink = %self.name, files, "FileSink closed");
        Ok(())
    }
}
