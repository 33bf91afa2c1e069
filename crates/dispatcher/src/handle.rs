//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{OutputRecord, RecordSink};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<OutputRecord>,
    metrics: Arc<SinkMetrics>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: RecordSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a record, waiting while the queue is full
    ///
    /// Synchronized output is never dropped, so this is the dispatcher's path.
    pub async fn send(&self, record: OutputRecord) -> Result<(), DispatcherError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| DispatcherError::WorkerClosed {
                sink_name: self.name.clone(),
            })?;
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
        Ok(())
    }

    /// Queue a record without waiting
    ///
    /// Returns false if the queue was full (record dropped) or the worker is gone.
    pub fn try_send(&self, record: OutputRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.metrics.inc_dropped_count();
                warn!(sink = %self.name, kind = r.kind(), "Queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Dropping the sender ends the worker loop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes records and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: RecordSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<OutputRecord>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(record) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&record).await {
            Ok(()) => metrics.record_written(&record),
            Err(e) => {
                metrics.inc_failure_count();
                error!(
                    sink = %name,
                    kind = record.kind(),
                    error = %e,
                    "Write failed"
                );
                // A failing sink must not stop the others
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, MacropulseMarker};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{Duration, sleep};

    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl RecordSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _record: &OutputRecord) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn marker(index: u64) -> OutputRecord {
        OutputRecord::Marker(MacropulseMarker {
            index,
            start_time: index as f64 * 8_333_333.3,
            target_position: 1,
            is_new_epoch: false,
        })
    }

    fn mock(name: &str, count: &Arc<AtomicU64>, should_fail: bool, delay_ms: u64) -> MockSink {
        MockSink {
            name: name.to_string(),
            write_count: Arc::clone(count),
            should_fail,
            delay_ms,
        }
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(mock("test", &write_count, false, 0), 10);

        for i in 0..5 {
            assert!(handle.try_send(marker(i)));
        }

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn test_send_waits_instead_of_dropping() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(mock("slow", &write_count, false, 5), 2);

        for i in 0..10 {
            handle.send(marker(i)).await.unwrap();
        }
        assert_eq!(handle.metrics().dropped_count(), 0);

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 10);
    }

    #[tokio::test]
    async fn test_try_send_queue_full() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(mock("slow", &write_count, false, 100), 2);

        for i in 0..10 {
            handle.try_send(marker(i));
        }
        assert!(handle.metrics().dropped_count() > 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let write_count = Arc::new(AtomicU64::new(0));
        let handle = SinkHandle::spawn(mock("failing", &write_count, true, 0), 10);

        for i in 0..3 {
            handle.send(marker(i)).await.unwrap();
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failure_count(), 3);

        handle.shutdown().await;
    }
}
