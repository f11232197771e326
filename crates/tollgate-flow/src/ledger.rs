//! Append-only run ledger and the durable stores behind it.
//!
//! The ledger never updates or removes a record. Recency is defined by
//! `startedAt` descending; records sharing a start time are ordered by
//! append order, later first.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tollgate_core::{Error, Result};

use crate::metrics::FlowMetrics;
use crate::run::{PipelineRunRecord, RunInput};

/// Durable storage for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Appends one record.
    async fn append(&self, record: &PipelineRunRecord) -> Result<()>;

    /// Lists at most `limit` records, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<PipelineRunRecord>>;
}

/// Read-only view of the ingestion backlog.
#[async_trait]
pub trait BacklogStore: Send + Sync {
    /// Counts items not yet ingested.
    async fn count_pending(&self) -> Result<u64>;

    /// Returns the receive time of the oldest item not yet ingested.
    async fn oldest_pending(&self) -> Result<Option<DateTime<Utc>>>;

    /// Returns the earliest scheduled retry among items not yet ingested.
    async fn earliest_next_retry(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Append-only pipeline run history.
#[derive(Clone)]
pub struct PipelineRunLedger {
    store: Arc<dyn RunStore>,
    metrics: FlowMetrics,
}

impl std::fmt::Debug for PipelineRunLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunLedger").finish_non_exhaustive()
    }
}

impl PipelineRunLedger {
    /// Creates a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            metrics: FlowMetrics::new(),
        }
    }

    /// Normalizes and appends one run report.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[tracing::instrument(skip(self, input), fields(status = %input.status))]
    pub async fn record(&self, input: RunInput) -> Result<PipelineRunRecord> {
        let record = PipelineRunRecord::from_input(input, Utc::now());
        self.store.append(&record).await?;
        self.metrics.record_run(record.status.as_str());
        tracing::info!(run_id = %record.id, "pipeline run recorded");
        Ok(record)
    }

    /// Returns at most `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn recent(&self, limit: usize) -> Result<Vec<PipelineRunRecord>> {
        self.store.list_recent(limit).await
    }
}

/// In-memory run store for local mode and tests.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    records: Mutex<Vec<PipelineRunRecord>>,
    failing: Mutex<Option<String>>,
}

impl MemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `message`.
    pub fn inject_failure(&self, message: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(message.into());
        }
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = None;
        }
    }

    /// Returns every record in append order.
    #[must_use]
    pub fn records(&self) -> Vec<PipelineRunRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn check_failure(&self) -> Result<()> {
        let failing = self.failing.lock().map_err(|_| Error::Internal {
            message: "run store lock poisoned".to_string(),
        })?;
        match failing.as_deref() {
            Some(message) => Err(Error::upstream(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn append(&self, record: &PipelineRunRecord) -> Result<()> {
        self.check_failure()?;
        self.records
            .lock()
            .map_err(|_| Error::Internal {
                message: "run store lock poisoned".to_string(),
            })?
            .push(record.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PipelineRunRecord>> {
        self.check_failure()?;
        let records = self.records.lock().map_err(|_| Error::Internal {
            message: "run store lock poisoned".to_string(),
        })?;
        let mut indexed: Vec<(usize, &PipelineRunRecord)> = records.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.started_at.cmp(&a.started_at).then(ib.cmp(ia)));
        Ok(indexed
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// One backlog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogItem {
    /// When the item was received.
    pub received_at: DateTime<Utc>,
    /// When the item was ingested, if it has been.
    pub ingested_at: Option<DateTime<Utc>>,
    /// When the next delivery attempt is scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl BacklogItem {
    /// A pending item received at `received_at`.
    #[must_use]
    pub const fn pending(received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            ingested_at: None,
            next_retry_at: None,
        }
    }

    /// Schedules a retry.
    #[must_use]
    pub const fn with_retry(mut self, at: DateTime<Utc>) -> Self {
        self.next_retry_at = Some(at);
        self
    }

    const fn is_pending(&self) -> bool {
        self.ingested_at.is_none()
    }
}

/// In-memory backlog for local mode and tests.
#[derive(Debug, Default)]
pub struct MemoryBacklogStore {
    items: Mutex<Vec<BacklogItem>>,
    failing: Mutex<Option<String>>,
}

impl MemoryBacklogStore {
    /// Creates an empty backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item.
    pub fn push(&self, item: BacklogItem) {
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
    }

    /// Marks every pending item as ingested at `at`.
    pub fn ingest_all(&self, at: DateTime<Utc>) {
        if let Ok(mut items) = self.items.lock() {
            for item in items.iter_mut().filter(|i| i.is_pending()) {
                item.ingested_at = Some(at);
                item.next_retry_at = None;
            }
        }
    }

    /// Makes every subsequent read fail with `message`.
    pub fn inject_failure(&self, message: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(message.into());
        }
    }

    /// Clears an injected failure.
    pub fn clear_failure(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = None;
        }
    }

    fn pending(&self) -> Result<Vec<BacklogItem>> {
        let failing = self.failing.lock().map_err(|_| Error::Internal {
            message: "backlog lock poisoned".to_string(),
        })?;
        if let Some(message) = failing.as_deref() {
            return Err(Error::upstream(message));
        }
        drop(failing);

        let items = self.items.lock().map_err(|_| Error::Internal {
            message: "backlog lock poisoned".to_string(),
        })?;
        Ok(items.iter().filter(|i| i.is_pending()).cloned().collect())
    }
}

#[async_trait]
impl BacklogStore for MemoryBacklogStore {
    async fn count_pending(&self) -> Result<u64> {
        Ok(u64::try_from(self.pending()?.len()).unwrap_or(u64::MAX))
    }

    async fn oldest_pending(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.pending()?.iter().map(|i| i.received_at).min())
    }

    async fn earliest_next_retry(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.pending()?.iter().filter_map(|i| i.next_retry_at).min())
    }
}
