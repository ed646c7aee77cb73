use async_trait::async_trait;
use tokio::io::AsyncWrite;

use super::Backend;
use crate::{
   Result,
   catalog::Catalog,
   config::RepoConfig,
   error::Error,
   hash::ContentHash,
   pipeline::{PendingFile, Pipeline, PipelineSettings, PipelineStats, Publisher},
   record::{BackendKind, ContentRecord, StatusUpdate, StorageStatus},
   repo::bootstrap,
};

/// Write-behind backend replicating files into a git remote.
///
/// `save` returns once the record is inserted as `InProgress` and the bytes
/// are queued; the terminal status lands later through the reconciler.
pub struct RepoBackend {
   catalog:  Catalog,
   pipeline: Pipeline,
}

impl RepoBackend {
   /// Prepares the working tree, then starts the background tasks.
   pub async fn init(cfg: &RepoConfig, catalog: Catalog) -> Result<Self> {
      cfg.validate()?;
      let owned = cfg.clone();
      let prepared = tokio::task::spawn_blocking(move || bootstrap::prepare(&owned)).await??;
      tracing::info!(
         origin = %prepared.origin,
         head = prepared.workspace.head_sha().as_deref().unwrap_or("-"),
         "repository backend ready"
      );
      Ok(Self::with_publisher(prepared.workspace, catalog, cfg))
   }

   /// Starts the pipeline around an already prepared publisher.
   pub fn with_publisher<P: Publisher>(publisher: P, catalog: Catalog, cfg: &RepoConfig) -> Self {
      let settings = PipelineSettings::from_config(cfg);
      let pipeline = Pipeline::spawn(publisher, catalog.clone(), settings);
      Self { catalog, pipeline }
   }

   /// Like [`Backend::close`], returning what the background tasks did.
   pub async fn shutdown(&self) -> Result<PipelineStats> {
      let stats = self.pipeline.shutdown().await?;
      tracing::info!(
         batches = stats.publish.batches,
         failed_batches = stats.publish.failed_batches,
         applied = stats.reconcile.applied,
         "repository backend stopped"
      );
      self.catalog.flush().await?;
      Ok(stats)
   }
}

#[async_trait]
impl Backend for RepoBackend {
   fn kind(&self) -> BackendKind {
      BackendKind::Repo
   }

   fn catalog(&self) -> &Catalog {
      &self.catalog
   }

   async fn save(&self, mut record: ContentRecord, data: Vec<u8>) -> Result<ContentRecord> {
      record.backend = Some(BackendKind::Repo);
      record.set_status(StorageStatus::InProgress, "");
      self.catalog.add(record.clone()).await?;

      let file = PendingFile { name: record.name.clone(), hash: record.hash, content: data };
      if let Err(e) = self.pipeline.enqueue(file).await {
         let update = StatusUpdate::new(record.hash, StorageStatus::Failed, e.to_string());
         if let Err(update_err) = self.catalog.update(update).await {
            tracing::warn!(hash = %record.hash, "failed to mark rejected save: {update_err}");
         }
         return Err(e);
      }
      tracing::debug!(hash = %record.hash, "queued file for replication");
      Ok(record)
   }

   async fn get(
      &self,
      _hash: &ContentHash,
      _out: &mut (dyn AsyncWrite + Unpin + Send),
   ) -> Result<ContentRecord> {
      Err(Error::Unimplemented("get"))
   }

   /// Removes the metadata record only; the file stays in repository history.
   async fn delete(&self, hash: &ContentHash) -> Result<()> {
      self.catalog.delete(hash).await
   }

   async fn close(&self) -> Result<()> {
      self.shutdown().await.map(drop)
   }
}
