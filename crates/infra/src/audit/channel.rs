//! Bounded, non-blocking audit forwarding.
//!
//! `record` only enqueues (`try_send`); a background task drains the queue
//! into an [`AuditWriter`]. The authorization path therefore never waits on
//! durable persistence.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use guardian_auth::{AuditEvent, AuditSink, AuditSinkError};

use crate::config::GuardianConfig;

/// Durable destination drained by the audit worker.
#[async_trait::async_trait]
pub trait AuditWriter: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

#[async_trait::async_trait]
impl<W> AuditWriter for Arc<W>
where
    W: AuditWriter + ?Sized,
{
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        (**self).write(event).await
    }
}

/// Producer side of the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Spawn the drain task on the current runtime.
    pub fn spawn<W>(writer: W, capacity: usize) -> (Self, AuditWorkerHandle)
    where
        W: AuditWriter + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(worker_loop(writer, rx, shutdown_rx));

        (
            Self { tx },
            AuditWorkerHandle {
                shutdown: shutdown_tx,
                join,
            },
        )
    }

    /// Spawn with the queue sized by `GUARDIAN_AUDIT_CHANNEL_CAPACITY`.
    pub fn spawn_with_config<W>(writer: W, config: &GuardianConfig) -> (Self, AuditWorkerHandle)
    where
        W: AuditWriter + 'static,
    {
        Self::spawn(writer, config.audit_channel_capacity)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        self.tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => AuditSinkError::Full,
            mpsc::error::TrySendError::Closed(_) => AuditSinkError::Closed,
        })
    }
}

/// Handle to stop and join the audit worker. Dropping it also stops the
/// worker after the queue is flushed.
#[derive(Debug)]
pub struct AuditWorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<u64>,
}

impl AuditWorkerHandle {
    /// Flush what is already queued, stop the worker and return the number of
    /// events it wrote.
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown.send(());
        match self.join.await {
            Ok(written) => written,
            Err(err) => {
                warn!(error = %err, "audit worker terminated abnormally");
                0
            }
        }
    }
}

async fn worker_loop<W>(writer: W, mut rx: mpsc::Receiver<AuditEvent>, mut shutdown: oneshot::Receiver<()>) -> u64
where
    W: AuditWriter,
{
    let mut written = 0;

    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(event) => written += write_one(&writer, &event).await,
                // Every sink dropped.
                None => break,
            },
            _ = &mut shutdown => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    written += write_one(&writer, &event).await;
                }
                break;
            }
        }
    }

    debug!(written, "audit worker stopped");
    written
}

async fn write_one<W: AuditWriter>(writer: &W, event: &AuditEvent) -> u64 {
    match writer.write(event).await {
        Ok(()) => 1,
        Err(err) => {
            warn!(event_id = %event.event_id(), error = %err, "audit write failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use guardian_auth::{DecisionEvent, Requirement};
    use guardian_core::UserId;

    use super::*;
    use crate::audit::InMemoryAuditSink;

    fn event() -> AuditEvent {
        AuditEvent::Decision(DecisionEvent::failed(
            UserId::new(),
            &Requirement::single("reports.export"),
            "test",
            Utc::now(),
        ))
    }

    struct FailingWriter;

    #[async_trait::async_trait]
    impl AuditWriter for FailingWriter {
        async fn write(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
            Err(AuditSinkError::Write("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn queued_events_reach_the_writer() {
        let store = InMemoryAuditSink::new();
        let (sink, handle) = ChannelAuditSink::spawn(store.clone(), 8);

        for _ in 0..3 {
            sink.record(event()).unwrap();
        }
        assert_eq!(handle.shutdown().await, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn full_queue_is_reported_not_awaited() {
        // Current-thread runtime: the worker cannot drain until we yield.
        let (sink, handle) = ChannelAuditSink::spawn(InMemoryAuditSink::new(), 1);

        assert!(sink.record(event()).is_ok());
        assert_eq!(sink.record(event()), Err(AuditSinkError::Full));
        assert_eq!(handle.shutdown().await, 1);
    }

    #[tokio::test]
    async fn record_after_shutdown_is_closed() {
        let (sink, handle) = ChannelAuditSink::spawn(InMemoryAuditSink::new(), 4);
        handle.shutdown().await;
        assert_eq!(sink.record(event()), Err(AuditSinkError::Closed));
    }

    #[tokio::test]
    async fn writer_failures_do_not_stop_the_worker() {
        let (sink, handle) = ChannelAuditSink::spawn(FailingWriter, 4);
        sink.record(event()).unwrap();
        sink.record(event()).unwrap();
        assert_eq!(handle.shutdown().await, 0);
    }

    #[tokio::test]
    async fn configured_capacity_bounds_the_queue() {
        let config = GuardianConfig {
            audit_channel_capacity: 2,
            ..GuardianConfig::default()
        };
        let (sink, handle) = ChannelAuditSink::spawn_with_config(InMemoryAuditSink::new(), &config);

        assert!(sink.record(event()).is_ok());
        assert!(sink.record(event()).is_ok());
        assert_eq!(sink.record(event()), Err(AuditSinkError::Full));
        assert_eq!(handle.shutdown().await, 2);
    }
}
