//! Off-hot-path visit recording
//!
//! The redirect handler hands each visit to [`VisitRecorder::record`], which
//! only does a `try_send` into a bounded channel. A single actor task owns the
//! buffer and writes it to storage in batches, either when the batch is full
//! or when the flush interval elapses, whichever comes first.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::VisitConfig;
use crate::models::VisitEvent;
use crate::storage::Storage;
use crate::visits::ip::hash_ip;

enum RecorderMessage {
    Record(VisitEvent),
    /// Persist everything queued so far, then acknowledge
    Flush(oneshot::Sender<()>),
    /// Persist everything queued so far and stop
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    persisted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the recorder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    /// Events written to storage
    pub persisted: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
    /// Events lost to a failed batch write or IP hashing error
    pub failed: u64,
}

struct RecorderActor {
    receiver: mpsc::Receiver<RecorderMessage>,
    storage: Arc<dyn Storage>,
    buffer: Vec<VisitEvent>,
    batch_size: usize,
    flush_interval: Duration,
    counters: Arc<Counters>,
}

impl RecorderActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first tick which fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(RecorderMessage::Record(event)) => {
                        self.buffer.push(event);
                        if self.buffer.len() >= self.batch_size {
                            self.persist().await;
                        }
                    }
                    Some(RecorderMessage::Flush(ack)) => {
                        self.persist().await;
                        let _ = ack.send(());
                    }
                    Some(RecorderMessage::Shutdown(ack)) => {
                        info!("Visit recorder received shutdown signal, flushing...");
                        self.persist().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        warn!("Visit recorder channel closed unexpectedly, flushing...");
                        self.persist().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.persist().await;
                }
            }
        }
    }

    async fn persist(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        match self.storage.record_visits(&batch).await {
            Ok(stored) => {
                self.counters.persisted.fetch_add(stored, Ordering::Relaxed);
                debug!(events = batch.len(), stored, "Flushed visit batch");
            }
            Err(e) => {
                self.counters
                    .failed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                error!(events = batch.len(), "Failed to persist visit batch: {e:#}");
            }
        }
    }
}

/// Handle to the recording actor. Cheap to share behind an `Arc`.
pub struct VisitRecorder {
    sender: mpsc::Sender<RecorderMessage>,
    counters: Arc<Counters>,
    ip_hash_salt: String,
}

impl VisitRecorder {
    /// Spawn the actor on the current runtime.
    pub fn spawn(storage: Arc<dyn Storage>, config: &VisitConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let counters = Arc::new(Counters::default());

        let actor = RecorderActor {
            receiver,
            storage,
            buffer: Vec::with_capacity(config.batch_size),
            batch_size: config.batch_size,
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(actor.run());

        let recorder = Self {
            sender,
            counters,
            ip_hash_salt: config.ip_hash_salt.clone(),
        };
        (recorder, handle)
    }

    /// Queue a visit. Never blocks and never fails the caller; a full queue
    /// drops the event and counts it.
    pub fn record(
        &self,
        short_code: &str,
        referer: Option<String>,
        user_agent: Option<String>,
        client_ip: IpAddr,
    ) {
        let ip_hash = match hash_ip(client_ip, &self.ip_hash_salt) {
            Ok(hash) => hash,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(short_code = %short_code, "Failed to hash client IP: {e}");
                return;
            }
        };

        let event = VisitEvent {
            short_code: short_code.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            referer: referer.filter(|r| !r.is_empty()),
            user_agent: user_agent.unwrap_or_default(),
            ip_hash,
        };
        self.enqueue(event);
    }

    /// Queue an already-built event.
    pub fn enqueue(&self, event: VisitEvent) {
        match self.sender.try_send(RecorderMessage::Record(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Visit queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Visit recorder stopped, dropping event");
            }
        }
    }

    /// Wait until every event queued before this call has been written
    /// (or counted as failed).
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(RecorderMessage::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Flush and stop the actor. Later `record` calls are dropped.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(RecorderMessage::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
