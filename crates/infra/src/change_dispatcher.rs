//! Change event dispatcher: turns invoice `INSERT` events into stored PDFs.
//!
//! Each record of a batch runs through decode, render, persist and index on
//! its own tokio task. Records never affect each other: a failing record is
//! reported in the [`BatchReport`] and the rest of the batch carries on.
//! Persist and index are upserts by key, so redelivering an event is safe.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use invoicer_core::InvoiceId;
use invoicer_events::{ChangeBatch, ChangeEvent, ChangeKind};
use invoicer_invoicing::{DecodeError, DocumentRenderer, Invoice, RenderError};

use crate::artifact_store::{ArtifactStore, StorageKey, StoreError};
use crate::pointer_index::{ArtifactPointer, IndexError, PointerIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound for each render/persist/index step.
    pub step_timeout: Duration,
    pub max_concurrent_records: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
            max_concurrent_records: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Render,
    Persist,
    Index,
    /// The record task itself died before reporting.
    Dispatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Render => "render",
            Self::Persist => "persist",
            Self::Index => "index",
            Self::Dispatch => "dispatch",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insert event carries no new image")]
    MissingImage,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("{stage} step timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("record task failed: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub enum RecordOutcome {
    Processed {
        invoice_id: InvoiceId,
        storage_key: StorageKey,
    },
    /// Not an insert; nothing to do.
    Skipped { kind: ChangeKind },
    Failed { stage: Stage, error: PipelineError },
}

impl RecordOutcome {
    fn failed(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self::Failed {
            stage,
            error: error.into(),
        }
    }
}

#[derive(Debug)]
pub struct RecordReport {
    pub event_id: Uuid,
    pub sequence_number: u64,
    pub outcome: RecordOutcome,
}

/// Per-record outcomes of one batch, in batch order.
#[derive(Debug, Default)]
pub struct BatchReport {
    records: Vec<RecordReport>,
}

impl BatchReport {
    pub fn records(&self) -> &[RecordReport] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    /// Events the host should redeliver.
    pub fn failed_event_ids(&self) -> Vec<Uuid> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Failed { .. }))
            .map(|r| r.event_id)
            .collect()
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

struct Pipeline<R, A, P> {
    renderer: R,
    artifacts: A,
    pointers: P,
    step_timeout: Duration,
}

impl<R, A, P> Pipeline<R, A, P>
where
    R: DocumentRenderer + 'static,
    A: ArtifactStore + 'static,
    P: PointerIndex + 'static,
{
    async fn process(self: Arc<Self>, event: ChangeEvent) -> RecordOutcome {
        if event.kind() != ChangeKind::Insert {
            return RecordOutcome::Skipped { kind: event.kind() };
        }

        let invoice = match event.new_image() {
            None => return RecordOutcome::failed(Stage::Decode, PipelineError::MissingImage),
            Some(image) => match Invoice::from_image(image) {
                Ok(invoice) => invoice,
                Err(e) => return RecordOutcome::failed(Stage::Decode, e),
            },
        };
        let invoice_id = invoice.invoice_id.clone();
        let storage_key = StorageKey::for_invoice(&invoice_id);

        let bytes = match self.clone().render(invoice).await {
            Ok(bytes) => bytes,
            Err(e) => return RecordOutcome::failed(Stage::Render, e),
        };
        info!(invoice_id = %invoice_id, size = bytes.len(), "generated invoice document");

        if let Err(e) = self.step(Stage::Persist, self.artifacts.put(&storage_key, bytes)).await {
            return RecordOutcome::failed(Stage::Persist, e);
        }
        info!(invoice_id = %invoice_id, key = %storage_key, "uploaded invoice document");

        let pointer = ArtifactPointer::new(invoice_id.clone(), storage_key.clone());
        if let Err(e) = self.step(Stage::Index, self.pointers.put(&pointer)).await {
            return RecordOutcome::failed(Stage::Index, e);
        }
        info!(invoice_id = %invoice_id, key = %storage_key, "indexed invoice document");

        RecordOutcome::Processed {
            invoice_id,
            storage_key,
        }
    }

    /// Rendering is CPU-bound, so it runs on the blocking pool.
    async fn render(self: Arc<Self>, invoice: Invoice) -> Result<Bytes, PipelineError> {
        let after = self.step_timeout;
        let task = tokio::task::spawn_blocking(move || self.renderer.render(&invoice));

        match timeout(after, task).await {
            Err(_) => Err(PipelineError::Timeout {
                stage: Stage::Render,
                after,
            }),
            Ok(Err(join)) => Err(PipelineError::Panicked(join.to_string())),
            Ok(Ok(rendered)) => Ok(Bytes::from(rendered?)),
        }
    }

    async fn step<T, E>(
        &self,
        stage: Stage,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, PipelineError>
    where
        E: Into<PipelineError>,
    {
        match timeout(self.step_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(PipelineError::Timeout {
                stage,
                after: self.step_timeout,
            }),
        }
    }
}

/// Fans a batch of change events out over the document pipeline.
pub struct ChangeDispatcher<R, A, P> {
    pipeline: Arc<Pipeline<R, A, P>>,
    max_concurrent_records: usize,
}

impl<R, A, P> Clone for ChangeDispatcher<R, A, P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            max_concurrent_records: self.max_concurrent_records,
        }
    }
}

impl<R, A, P> ChangeDispatcher<R, A, P>
where
    R: DocumentRenderer + 'static,
    A: ArtifactStore + 'static,
    P: PointerIndex + 'static,
{
    pub fn new(renderer: R, artifacts: A, pointers: P, config: DispatcherConfig) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                renderer,
                artifacts,
                pointers,
                step_timeout: config.step_timeout,
            }),
            max_concurrent_records: config.max_concurrent_records.max(1),
        }
    }

    /// Process every event of `batch`. Never fails as a whole; see the report.
    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn dispatch_batch(&self, batch: ChangeBatch) -> BatchReport {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_records));

        let tasks: Vec<_> = batch
            .events
            .into_iter()
            .map(|event| {
                let event_id = event.event_id();
                let sequence_number = event.sequence_number();
                let pipeline = Arc::clone(&self.pipeline);
                let permits = Arc::clone(&permits);
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    pipeline.process(event).await
                });
                (event_id, sequence_number, handle)
            })
            .collect();

        let mut records = Vec::with_capacity(tasks.len());
        for (event_id, sequence_number, handle) in tasks {
            let outcome = handle.await.unwrap_or_else(|join| {
                RecordOutcome::failed(Stage::Dispatch, PipelineError::Panicked(join.to_string()))
            });

            if let RecordOutcome::Failed { stage, error } = &outcome {
                warn!(
                    event_id = %event_id,
                    sequence_number,
                    stage = %stage,
                    error = %error,
                    "change event processing failed"
                );
            }

            records.push(RecordReport {
                event_id,
                sequence_number,
                outcome,
            });
        }

        let report = BatchReport { records };
        info!(
            processed = report.processed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "change batch dispatched"
        );
        report
    }
}
