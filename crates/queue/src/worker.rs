//! Queue worker: fetch → decode → ingest → commit.
//!
//! Records are handled in offset order. The committed offset only moves
//! past a record once it has been ingested or rejected for good; a
//! retryable ingestion error stops the batch so that record is fetched
//! again on the next round.

use batch_core::wire::decode_queue_message;
use batch_core::{Error, Result};
use pipeline::Ingestor;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

use crate::consumer::{QueueRecord, RecordSource};

/// What one fetch round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub ingested: usize,
    pub rejected: usize,
    /// Offset committed at the end of the round, if it moved
    pub committed: Option<i64>,
}

enum Handled {
    Ingested,
    Rejected,
}

/// Feeds queue records into the ingestor.
pub struct QueueWorker {
    source: Arc<dyn RecordSource>,
    ingestor: Arc<Ingestor>,
    retry_backoff: Duration,
}

impl QueueWorker {
    pub fn new(source: Arc<dyn RecordSource>, ingestor: Arc<Ingestor>) -> Self {
        Self {
            source,
            ingestor,
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Main loop. Runs until the task is aborted.
    pub async fn run(&self) {
        info!(source = %self.source.describe(), "Queue worker starting");

        loop {
            match self.process_batch().await {
                Ok(outcome) => {
                    if outcome.ingested + outcome.rejected > 0 {
                        debug!(
                            ingested = outcome.ingested,
                            rejected = outcome.rejected,
                            "Processed queue batch"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "Queue batch stopped");
                    tokio::time::sleep(self.retry_backoff).await;
                    self.source.reset().await;
                }
            }
        }
    }

    /// Processes one fetch round.
    ///
    /// On a retryable error the done prefix is still committed and the
    /// error is returned.
    pub async fn process_batch(&self) -> Result<BatchOutcome> {
        let records = self.source.fetch().await?;
        let mut outcome = BatchOutcome::default();
        let mut next_offset = None;
        let mut stopped = None;

        for record in &records {
            match self.handle(record).await {
                Ok(Handled::Ingested) => outcome.ingested += 1,
                Ok(Handled::Rejected) => outcome.rejected += 1,
                Err(e) => {
                    warn!(
                        offset = record.offset,
                        error = %e,
                        "Ingestion unavailable, leaving message for redelivery"
                    );
                    stopped = Some(e);
                    break;
                }
            }
            next_offset = Some(record.offset + 1);
        }

        if let Some(next) = next_offset {
            self.source.commit(next).await?;
            outcome.committed = Some(next);
        }

        match stopped {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    async fn handle(&self, record: &QueueRecord) -> Result<Handled> {
        let Some(value) = record.value.as_deref() else {
            metrics().queue_messages_malformed.inc();
            warn!(offset = record.offset, "Queue record without a value");
            return Ok(Handled::Rejected);
        };

        let decoded = std::str::from_utf8(value)
            .map_err(|e| Error::internal(format!("message is not UTF-8: {}", e)))
            .and_then(|body| decode_queue_message(body.trim_end_matches(['\r', '\n'])));

        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                metrics().queue_messages_malformed.inc();
                warn!(offset = record.offset, error = %e, "Malformed queue message");
                return Ok(Handled::Rejected);
            }
        };

        let raw = message.into_raw_record(self.ingestor.registry().default_config());
        match self.ingestor.ingest(raw).await {
            Ok(_) => {
                metrics().queue_messages_consumed.inc();
                Ok(Handled::Ingested)
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                warn!(offset = record.offset, error = %e, "Queue message rejected");
                Ok(Handled::Rejected)
            }
        }
    }
}
