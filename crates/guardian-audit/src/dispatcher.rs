// dispatcher.rs — Asynchronous hand-off from the evaluation path to a sink.
//
// Verdict latency must not depend on audit storage latency, so the engine
// never writes to a sink directly. It hands each record to an
// AuditDispatcher, which queues it on a channel drained by a dedicated
// writer thread that owns the sink.
//
//   evaluate() ──submit()──▶ [mpsc queue] ──▶ writer thread ──▶ AuditSink
//                                                   │
//                                     failure ──────┴──▶ AlertChannel
//
// `submit` never blocks on I/O and never returns an error to the caller.
// Failures are counted and escalated through the AlertChannel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;

use crate::alert::{AlertChannel, AuditFailure, TracingAlertChannel};
use crate::error::{error_chain, AuditError};
use crate::record::AuditRecord;
use crate::sink::AuditSink;

enum Command {
    Record(Box<AuditRecord>),
    Flush(mpsc::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
}

/// Snapshot of dispatcher health counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AuditStats {
    /// Records handed to `submit` (plus records that failed to build).
    pub submitted: u64,
    /// Records the sink accepted.
    pub written: u64,
    /// Records lost to sink or writer failures.
    pub failed: u64,
}

/// Owns the background audit writer.
///
/// Dropping the dispatcher closes the queue, lets the writer drain every
/// pending record, and joins the thread.
pub struct AuditDispatcher {
    sender: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    alerts: Arc<dyn AlertChannel>,
    sink_label: String,
}

impl AuditDispatcher {
    /// Start a writer for `sink`, reporting failures through `tracing`.
    pub fn spawn<S: AuditSink + 'static>(sink: S) -> Result<Self, AuditError> {
        Self::spawn_with_alerts(sink, Arc::new(TracingAlertChannel))
    }

    /// Start a writer for `sink` with a custom alert channel.
    pub fn spawn_with_alerts<S: AuditSink + 'static>(
        mut sink: S,
        alerts: Arc<dyn AlertChannel>,
    ) -> Result<Self, AuditError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let counters = Arc::new(Counters::default());
        let sink_label = sink.describe();

        let worker_counters = Arc::clone(&counters);
        let worker_alerts = Arc::clone(&alerts);
        let worker = std::thread::Builder::new()
            .name("guardian-audit".to_string())
            .spawn(move || {
                for command in receiver {
                    match command {
                        Command::Record(mut record) => {
                            write_one(&mut sink, &mut record, &worker_counters, &*worker_alerts)
                        }
                        Command::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                tracing::debug!(sink = %sink.describe(), "audit writer drained and stopped");
            })
            .map_err(|e| AuditError::WriterStopped(e.to_string()))?;

        tracing::debug!(sink = %sink_label, "audit writer started");

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            counters,
            alerts,
            sink_label,
        })
    }

    /// Queue a record for writing. Returns immediately.
    pub fn submit(&self, record: AuditRecord) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let record_id = record.record_id;
        let actor_id = record.actor_id.clone();
        let queued = match &self.sender {
            Some(sender) => sender.send(Command::Record(Box::new(record))).is_ok(),
            None => false,
        };

        if !queued {
            let error = AuditError::WriterStopped("audit queue is closed".to_string());
            self.escalate(Some(record_id), actor_id, &error);
        }
    }

    /// Report a record that could not even be built (e.g. serialization
    /// failed). Counts as submitted and failed.
    pub fn report_failure(&self, actor_id: &str, error: &AuditError) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.escalate(None, actor_id.to_string(), error);
    }

    /// Block until every record submitted before this call has been handled
    /// by the writer (written or failed).
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if sender.send(Command::Flush(ack_tx)).is_ok() {
            // An Err here means the writer exited; nothing left to wait for.
            let _ = ack_rx.recv();
        }
    }

    /// Current health counters.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn escalate(&self, record_id: Option<uuid::Uuid>, actor_id: String, error: &AuditError) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let consecutive_failures = self
            .counters
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        self.alerts.audit_write_failed(&AuditFailure {
            record_id,
            actor_id,
            sink: self.sink_label.clone(),
            error: error_chain(error),
            consecutive_failures,
        });
    }
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        // Closing the sender ends the writer's receive loop after the backlog.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(
                    target: "guardian::ops_alert",
                    sink = %self.sink_label,
                    "audit writer panicked"
                );
            }
        }
    }
}

fn write_one<S: AuditSink>(
    sink: &mut S,
    record: &mut AuditRecord,
    counters: &Counters,
    alerts: &dyn AlertChannel,
) {
    match sink.append(record) {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
            counters.consecutive_failures.store(0, Ordering::Relaxed);
        }
        Err(error) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let consecutive_failures = counters
                .consecutive_failures
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            alerts.audit_write_failed(&AuditFailure {
                record_id: Some(record.record_id),
                actor_id: record.actor_id.clone(),
                sink: sink.describe(),
                error: error_chain(&error),
                consecutive_failures,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;
    use crate::sink::MemoryAuditSink;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;

    /// Sink that rejects every write.
    struct DownSink;

    impl AuditSink for DownSink {
        fn append(&mut self, _record: &mut AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::SinkUnavailable("backend offline".to_string()))
        }

        fn describe(&self) -> String {
            "down".to_string()
        }
    }

    /// Alert channel that remembers what it was told.
    #[derive(Default)]
    struct RecordingAlerts {
        seen: Mutex<Vec<AuditFailure>>,
    }

    impl AlertChannel for RecordingAlerts {
        fn audit_write_failed(&self, failure: &AuditFailure) {
            self.seen.lock().unwrap().push(failure.clone());
        }
    }

    fn record(actor: &str) -> AuditRecord {
        let request = json!({"actor": actor});
        AuditRecord::capture(actor, &request, &json!({"effect": "ALLOW"}), Utc::now()).unwrap()
    }

    #[test]
    fn records_reach_the_sink_in_order() {
        let sink = MemoryAuditSink::new();
        let dispatcher = AuditDispatcher::spawn(sink.clone()).unwrap();

        for actor in ["a", "b", "c"] {
            dispatcher.submit(record(actor));
        }
        dispatcher.flush();

        let actors: Vec<String> = sink.records().into_iter().map(|r| r.actor_id).collect();
        assert_eq!(actors, vec!["a", "b", "c"]);
        assert_eq!(
            dispatcher.stats(),
            AuditStats {
                submitted: 3,
                written: 3,
                failed: 0
            }
        );
    }

    #[test]
    fn sink_failures_are_escalated_not_swallowed() {
        let alerts = Arc::new(RecordingAlerts::default());
        let dispatcher = AuditDispatcher::spawn_with_alerts(DownSink, alerts.clone()).unwrap();

        dispatcher.submit(record("user-1"));
        dispatcher.submit(record("user-2"));
        dispatcher.flush();

        let seen = alerts.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].actor_id, "user-1");
        assert_eq!(seen[0].sink, "down");
        assert!(seen[0].error.contains("backend offline"));
        assert_eq!(seen[1].consecutive_failures, 2);
        assert_eq!(dispatcher.stats().failed, 2);
        assert_eq!(dispatcher.stats().written, 0);
    }

    /// Log whose first `failures` appends fail before reaching the file.
    struct FlakyLog {
        log: AuditLog,
        failures: usize,
    }

    impl AuditSink for FlakyLog {
        fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(std::io::Error::other("no space left on device").into());
            }
            self.log.append(record)
        }

        fn describe(&self) -> String {
            self.log.describe()
        }
    }

    #[test]
    fn recovered_sink_keeps_an_intact_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FlakyLog {
            log: AuditLog::open(&path).unwrap(),
            failures: 1,
        };
        let alerts = Arc::new(RecordingAlerts::default());
        let dispatcher = AuditDispatcher::spawn_with_alerts(sink, alerts.clone()).unwrap();

        for actor in ["lost", "user-1", "user-2"] {
            dispatcher.submit(record(actor));
        }
        dispatcher.flush();

        assert_eq!(alerts.seen.lock().unwrap()[0].actor_id, "lost");
        assert_eq!((dispatcher.stats().written, dispatcher.stats().failed), (2, 1));
        drop(dispatcher);

        let records = AuditLog::read_all(&path).unwrap();
        let actors: Vec<&str> = records.iter().map(|r| r.actor_id.as_str()).collect();
        assert_eq!(actors, vec!["user-1", "user-2"]);
        assert!(AuditLog::verify_chain(&path).unwrap());
    }

    #[test]
    fn report_failure_counts_and_alerts() {
        let alerts = Arc::new(RecordingAlerts::default());
        let dispatcher =
            AuditDispatcher::spawn_with_alerts(MemoryAuditSink::new(), alerts.clone()).unwrap();

        dispatcher.report_failure("user-9", &AuditError::SinkUnavailable("x".to_string()));

        let seen = alerts.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].record_id.is_none());
        assert_eq!(dispatcher.stats().submitted, 1);
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[test]
    fn drop_drains_pending_records() {
        let sink = MemoryAuditSink::new();
        {
            let dispatcher = AuditDispatcher::spawn(sink.clone()).unwrap();
            for i in 0..50 {
                dispatcher.submit(record(&format!("user-{}", i)));
            }
        }
        assert_eq!(sink.len(), 50);
    }
}
