//! Storage backends behind one async interface.
//!
//! Both implementations share a [`Catalog`] for every metadata lookup; they
//! differ only in how file bytes are persisted.

pub mod local;
pub mod repo;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

pub use self::{local::LocalBackend, repo::RepoBackend};
use crate::{
   Result,
   catalog::Catalog,
   config::Config,
   hash::ContentHash,
   meta::JsonMetaStore,
   record::{BackendKind, ContentRecord, ListQuery},
};

#[async_trait]
pub trait Backend: Send + Sync {
   fn kind(&self) -> BackendKind;

   fn catalog(&self) -> &Catalog;

   /// Stores `data` under `record.hash` and inserts the record.
   ///
   /// Callers deduplicate with [`Backend::exists`] first; two concurrent
   /// saves of one hash race and the loser gets `AlreadyExists`.
   async fn save(&self, record: ContentRecord, data: Vec<u8>) -> Result<ContentRecord>;

   /// Streams the stored bytes into `out`.
   async fn get(
      &self,
      hash: &ContentHash,
      out: &mut (dyn AsyncWrite + Unpin + Send),
   ) -> Result<ContentRecord>;

   async fn delete(&self, hash: &ContentHash) -> Result<()>;

   /// Stops background work and flushes the metadata store.
   async fn close(&self) -> Result<()>;

   async fn get_meta(&self, hash: &ContentHash) -> Result<ContentRecord> {
      self.catalog().get(hash).await
   }

   async fn get_history(&self, hash: &ContentHash, limit: usize) -> Result<Vec<ContentRecord>> {
      self.catalog().history(hash, limit).await
   }

   async fn exists(&self, hash: &ContentHash) -> Result<bool> {
      self.catalog().exists(hash).await
   }

   async fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      self.catalog().search_exact(name, limit).await
   }

   async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      self.catalog().search(pattern, limit).await
   }

   async fn list(&self, query: ListQuery) -> Result<Vec<ContentRecord>> {
      self.catalog().list(query).await
   }
}

/// Opens the metadata store and the backend selected by `storage.kind`.
pub async fn open_backend(config: &Config) -> Result<Box<dyn Backend>> {
   config.validate()?;
   let store = JsonMetaStore::open(&config.db.path)?;
   let catalog = Catalog::new(Arc::new(store));
   tracing::info!(kind = %config.storage.kind, db = %config.db.path.display(), "opening backend");

   let backend: Box<dyn Backend> = match config.storage.kind {
      BackendKind::Local => Box::new(LocalBackend::init(&config.local, catalog).await?),
      BackendKind::Repo => Box::new(RepoBackend::init(&config.repo, catalog).await?),
   };
   Ok(backend)
}
