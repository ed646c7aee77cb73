//! Write-behind pipeline of the repository backend.
//!
//! Two long-lived tasks per backend: the publisher (collect -> write ->
//! stage/commit/push, one batch at a time) and the status reconciler. Both
//! are started by [`Pipeline::spawn`] and joined by [`Pipeline::shutdown`].

pub mod collector;
pub mod committer;
pub mod reconciler;
pub mod writer;

use std::{path::PathBuf, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub use self::{
   collector::{Batch, collect_batch},
   committer::{BatchResult, CommitOutcome, Publisher, publish_batch},
   reconciler::{ReconcileStats, run_reconciler},
   writer::{normalize_file_name, write_batch},
};
use crate::{
   Result,
   catalog::Catalog,
   config::RepoConfig,
   error::Error,
   hash::ContentHash,
   record::{StatusUpdate, StorageStatus, status_reason},
};

/// Queue element handed from the facade to the collector.
#[derive(Debug, Clone)]
pub struct PendingFile {
   pub name:    String,
   pub hash:    ContentHash,
   pub content: Vec<u8>,
}

/// Per-file result produced by the write pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
   pub name:   String,
   pub hash:   ContentHash,
   pub status: StorageStatus,
   pub reason: String,
}

impl FileOutcome {
   pub fn success(name: impl Into<String>, hash: ContentHash) -> Self {
      Self {
         name: name.into(),
         hash,
         status: StorageStatus::Success,
         reason: status_reason(StorageStatus::Success, ""),
      }
   }

   pub fn failed(name: impl Into<String>, hash: ContentHash, reason: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         hash,
         status: StorageStatus::Failed,
         reason: status_reason(StorageStatus::Failed, reason),
      }
   }

   /// Overrides this outcome with a batch-level failure.
   pub fn fail(self, reason: impl Into<String>) -> Self {
      Self::failed(self.name, self.hash, reason)
   }

   pub fn into_update(self) -> StatusUpdate {
      StatusUpdate::new(self.hash, self.status, self.reason)
   }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
   pub workdir:         PathBuf,
   pub file_extension:  String,
   pub write_workers:   usize,
   pub max_batch_files: usize,
   pub batch_window:    Duration,
}

impl PipelineSettings {
   pub fn from_config(cfg: &RepoConfig) -> Self {
      Self {
         workdir:         cfg.workdir.clone(),
         file_extension:  cfg.file_extension.clone(),
         write_workers:   cfg.write_workers.max(1),
         max_batch_files: cfg.max_batch_files.max(1),
         batch_window:    cfg.batch_window(),
      }
   }

   /// Ingestion queue capacity: twice the batch size.
   pub const fn queue_capacity(&self) -> usize {
      self.max_batch_files.saturating_mul(2)
   }
}

/// Counters reported by the publisher loop when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
   pub batches:        usize,
   pub failed_batches: usize,
   pub files:          usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
   pub publish:   PublishStats,
   pub reconcile: ReconcileStats,
}

/// Handle to the running background tasks.
pub struct Pipeline {
   queue:      Mutex<Option<mpsc::Sender<PendingFile>>>,
   cancel:     CancellationToken,
   publisher:  Mutex<Option<JoinHandle<PublishStats>>>,
   reconciler: Mutex<Option<JoinHandle<ReconcileStats>>>,
}

impl Pipeline {
   /// Starts the publisher and reconciler tasks. Must be called from within
   /// a tokio runtime.
   pub fn spawn<P: Publisher>(publisher: P, catalog: Catalog, settings: PipelineSettings) -> Self {
      let capacity = settings.queue_capacity().max(1);
      let (queue_tx, queue_rx) = mpsc::channel(capacity);
      let (outcome_tx, outcome_rx) = mpsc::channel(capacity);
      let cancel = CancellationToken::new();

      let publisher_task = tokio::spawn(run_publisher(
         publisher,
         queue_rx,
         outcome_tx,
         settings,
         cancel.clone(),
      ));
      let reconciler_task = tokio::spawn(run_reconciler(catalog, outcome_rx));

      Self {
         queue: Mutex::new(Some(queue_tx)),
         cancel,
         publisher: Mutex::new(Some(publisher_task)),
         reconciler: Mutex::new(Some(reconciler_task)),
      }
   }

   /// Queues a file for the next batch, waiting while the queue is full.
   pub async fn enqueue(&self, file: PendingFile) -> Result<()> {
      let sender = self.queue.lock().clone().ok_or(Error::QueueClosed)?;
      sender.send(file).await.map_err(|_| Error::QueueClosed)
   }

   pub fn is_closed(&self) -> bool {
      self.queue.lock().is_none()
   }

   /// Closes the queue, cuts the current window short and waits for both
   /// tasks. Files still queued, including those of saves still waiting for
   /// capacity, are published in full batches. Calling it again is a no-op.
   pub async fn shutdown(&self) -> Result<PipelineStats> {
      self.queue.lock().take();
      self.cancel.cancel();

      let publisher = self.publisher.lock().take();
      let reconciler = self.reconciler.lock().take();

      let mut stats = PipelineStats::default();
      let mut first_err = None;
      if let Some(handle) = publisher {
         match handle.await {
            Ok(publish) => stats.publish = publish,
            Err(e) => first_err = Some(e.into()),
         }
      }
      if let Some(handle) = reconciler {
         match handle.await {
            Ok(reconcile) => stats.reconcile = reconcile,
            Err(e) => {
               first_err.get_or_insert(e.into());
            },
         }
      }

      match first_err {
         Some(e) => Err(e),
         None => Ok(stats),
      }
   }
}

impl Drop for Pipeline {
   fn drop(&mut self) {
      self.cancel.cancel();
   }
}

/// Collector -> write pool -> committer loop. Runs until the queue closes or
/// shutdown is requested, then publishes whatever senders still deliver.
async fn run_publisher<P: Publisher>(
   publisher: P,
   mut queue: mpsc::Receiver<PendingFile>,
   outcomes: mpsc::Sender<FileOutcome>,
   settings: PipelineSettings,
   cancel: CancellationToken,
) -> PublishStats {
   let publisher = Arc::new(Mutex::new(publisher));
   let mut stats = PublishStats::default();
   loop {
      let batch = collect_batch(
         &mut queue,
         settings.max_batch_files,
         settings.batch_window,
         &cancel,
      )
      .await;
      let closed = batch.closed;

      if !batch.is_empty() {
         publish_files(&publisher, batch.files, &settings, &outcomes, &mut stats).await;
      }

      if closed {
         break;
      }
   }

   // A save may hold a queue slot it has not filled yet; recv waits for it.
   queue.close();
   let mut late = Vec::new();
   while let Some(file) = queue.recv().await {
      late.push(file);
   }
   if !late.is_empty() {
      tracing::debug!(count = late.len(), "publishing files delivered during shutdown");
   }
   let mut late = late.into_iter().peekable();
   while late.peek().is_some() {
      let files: Vec<_> = late.by_ref().take(settings.max_batch_files).collect();
      publish_files(&publisher, files, &settings, &outcomes, &mut stats).await;
   }

   tracing::info!(batches = stats.batches, files = stats.files, "publisher stopped");
   stats
}

/// Writes, commits and pushes one batch and forwards its outcomes. A
/// publisher that panics fails the batch; the next batch reuses it.
async fn publish_files<P: Publisher>(
   publisher: &Arc<Mutex<P>>,
   files: Vec<PendingFile>,
   settings: &PipelineSettings,
   outcomes: &mpsc::Sender<FileOutcome>,
   stats: &mut PublishStats,
) {
   let written = write_batch(
      files,
      &settings.workdir,
      &settings.file_extension,
      settings.write_workers,
   )
   .await;

   let fallback = written.clone();
   let shared = Arc::clone(publisher);
   let result =
      match tokio::task::spawn_blocking(move || publish_batch(&mut *shared.lock(), written)).await {
         Ok(result) => result,
         Err(e) => {
            let reason = format!("git publish error: {e}");
            tracing::error!("{reason}");
            BatchResult::Failed { reason, outcomes: fallback }
         },
      };

   stats.batches += 1;
   stats.files += result.len();
   if !result.is_committed() {
      stats.failed_batches += 1;
   }
   for outcome in result.into_outcomes() {
      if outcomes.send(outcome).await.is_err() {
         tracing::warn!("status reconciler is gone; dropping outcome");
      }
   }
}
