//! Concurrent bulk ingestion with per-record retry.
//!
//! Each worker owns its own leftover queue of overloaded records and merges it
//! into the next batch it pulls. Once the channel is closed the worker keeps
//! resubmitting its leftover until nothing remains. Retry is unbounded: a
//! destination that never recovers keeps its worker busy.

use crate::error::{EndpointError, TransferError};
use crate::models::{Batch, IngestReport, TransferRecord};
use crate::traits::{BulkItem, BulkWriter};
use async_channel::Receiver;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Created,
    /// The id already exists. Counted as delivered, since a resubmitted batch
    /// may contain records an earlier attempt already wrote.
    Conflict,
    /// Rate limited or temporarily unavailable.
    Overloaded,
    Rejected,
}

impl ItemStatus {
    pub fn classify(status: u16) -> Self {
        match status {
            200..=299 => ItemStatus::Created,
            409 => ItemStatus::Conflict,
            429 | 503 => ItemStatus::Overloaded,
            _ => ItemStatus::Rejected,
        }
    }
}

/// Partition of one bulk round.
#[derive(Debug, Default)]
pub struct RoundOutcome {
    pub delivered: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub retry: Vec<TransferRecord>,
}

impl RoundOutcome {
    pub fn partition(records: Vec<TransferRecord>, items: Vec<BulkItem>) -> Result<Self, EndpointError> {
        if records.len() != items.len() {
            return Err(EndpointError::BackendResponse {
                backend: "bulk".to_string(),
                details: format!(
                    "{} items reported for {} submitted records",
                    items.len(),
                    records.len()
                ),
            });
        }

        let mut outcome = RoundOutcome::default();
        for (record, item) in records.into_iter().zip(items) {
            match ItemStatus::classify(item.status) {
                ItemStatus::Created => outcome.delivered += 1,
                ItemStatus::Conflict => {
                    outcome.delivered += 1;
                    outcome.duplicates += 1;
                }
                ItemStatus::Overloaded => outcome.retry.push(record),
                ItemStatus::Rejected => {
                    warn!(
                        id = %record.id,
                        collection = %record.collection,
                        status = item.status,
                        "dropping record rejected by destination"
                    );
                    outcome.dropped += 1;
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub parallelism: usize,
    /// Pause before each leftover-only resubmission after input is exhausted.
    pub retry_backoff: Duration,
}

/// Drains `src` with `config.parallelism` workers and returns once every
/// worker has emptied its leftover queue. A transport error from any worker
/// aborts the others and is returned as is.
pub async fn ingest<W>(writer: W, config: IngestConfig, src: Receiver<Batch>) -> Result<IngestReport, TransferError>
where
    W: BulkWriter + Clone + 'static,
{
    if config.parallelism == 0 {
        return Err(TransferError::InvalidArgument(
            "parallelism must be greater than zero".to_string(),
        ));
    }

    let mut workers = JoinSet::new();
    for worker_id in 0..config.parallelism {
        let worker = IngestWorker {
            worker_id,
            writer: writer.clone(),
            retry_backoff: config.retry_backoff,
            leftover: Vec::new(),
            report: IngestReport::default(),
        };
        workers.spawn(worker.run(src.clone()));
    }
    drop(src);

    let mut report = IngestReport::default();
    while let Some(joined) = workers.join_next().await {
        let outcome = joined.map_err(TransferError::from).and_then(|result| result);
        match outcome {
            Ok(worker_report) => report.merge(worker_report),
            Err(error) => {
                workers.abort_all();
                return Err(error);
            }
        }
    }

    info!(
        batches = report.batches,
        delivered = report.delivered,
        duplicates = report.duplicates,
        dropped = report.dropped,
        retried = report.retried,
        "ingestion finished"
    );
    Ok(report)
}

struct IngestWorker<W> {
    worker_id: usize,
    writer: W,
    retry_backoff: Duration,
    leftover: Vec<TransferRecord>,
    report: IngestReport,
}

impl<W> IngestWorker<W>
where
    W: BulkWriter,
{
    async fn run(mut self, src: Receiver<Batch>) -> Result<IngestReport, TransferError> {
        while let Ok(batch) = src.recv().await {
            self.report.batches += 1;
            let mut records = batch.into_records();
            records.append(&mut self.leftover);
            self.submit(records).await?;
        }

        while !self.leftover.is_empty() {
            debug!(
                worker = self.worker_id,
                leftover = self.leftover.len(),
                "pushing in leftover records"
            );
            if !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff).await;
            }
            let records = std::mem::take(&mut self.leftover);
            self.submit(records).await?;
        }

        Ok(self.report)
    }

    async fn submit(&mut self, records: Vec<TransferRecord>) -> Result<(), TransferError> {
        let submitted = records.len();
        let items = self.writer.bulk_create(&records).await?;
        let outcome = RoundOutcome::partition(records, items)?;

        self.report.submitted += submitted;
        self.report.delivered += outcome.delivered;
        self.report.duplicates += outcome.duplicates;
        self.report.dropped += outcome.dropped;
        self.report.retried += outcome.retry.len();

        debug!(
            worker = self.worker_id,
            imported = outcome.delivered,
            submitted,
            leftover = outcome.retry.len(),
            "imported batch"
        );
        self.leftover = outcome.retry;
        Ok(())
    }
}
