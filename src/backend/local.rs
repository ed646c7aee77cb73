use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use super::Backend;
use crate::{
   Result,
   catalog::Catalog,
   config::LocalConfig,
   hash::ContentHash,
   record::{BackendKind, ContentRecord, StorageStatus},
};

/// Plain directory backend: one file per hash, written before the call
/// returns.
pub struct LocalBackend {
   root:    PathBuf,
   catalog: Catalog,
}

impl LocalBackend {
   pub async fn init(cfg: &LocalConfig, catalog: Catalog) -> Result<Self> {
      tokio::fs::create_dir_all(&cfg.path).await?;
      Ok(Self { root: cfg.path.clone(), catalog })
   }

   pub fn root(&self) -> &Path {
      &self.root
   }

   fn blob_path(&self, hash: &ContentHash) -> PathBuf {
      self.root.join(hash.to_hex())
   }
}

#[async_trait]
impl Backend for LocalBackend {
   fn kind(&self) -> BackendKind {
      BackendKind::Local
   }

   fn catalog(&self) -> &Catalog {
      &self.catalog
   }

   async fn save(&self, mut record: ContentRecord, data: Vec<u8>) -> Result<ContentRecord> {
      record.backend = Some(BackendKind::Local);
      tokio::fs::write(self.blob_path(&record.hash), &data).await?;
      record.set_status(StorageStatus::Success, "");
      self.catalog.add(record.clone()).await?;
      tracing::debug!(hash = %record.hash, size = data.len(), "stored file locally");
      Ok(record)
   }

   async fn get(
      &self,
      hash: &ContentHash,
      out: &mut (dyn AsyncWrite + Unpin + Send),
   ) -> Result<ContentRecord> {
      let record = self.catalog.get(hash).await?;
      let mut file = tokio::fs::File::open(self.blob_path(hash)).await?;
      tokio::io::copy(&mut file, out).await?;
      Ok(record)
   }

   async fn delete(&self, hash: &ContentHash) -> Result<()> {
      tokio::fs::remove_file(self.blob_path(hash)).await?;
      self.catalog.delete(hash).await
   }

   async fn close(&self) -> Result<()> {
      self.catalog.flush().await
   }
}
