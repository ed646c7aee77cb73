//! Metadata helper shared by every backend.

use std::{collections::HashSet, sync::Arc};

use crate::{
   Result,
   error::Error,
   hash::ContentHash,
   meta::MetaStore,
   record::{ContentRecord, ListQuery, StatusUpdate},
};

/// Thin wrapper over a [`MetaStore`] with the lookups both backends expose.
#[derive(Clone)]
pub struct Catalog {
   store: Arc<dyn MetaStore>,
}

impl Catalog {
   pub fn new(store: Arc<dyn MetaStore>) -> Self {
      Self { store }
   }

   pub fn store(&self) -> &Arc<dyn MetaStore> {
      &self.store
   }

   pub async fn add(&self, record: ContentRecord) -> Result<()> {
      self.store.add(record).await
   }

   pub async fn update(&self, update: StatusUpdate) -> Result<()> {
      self.store.update(update).await
   }

   pub async fn get(&self, hash: &ContentHash) -> Result<ContentRecord> {
      self.store.get(hash).await
   }

   /// Not-found maps to `false`; any other store error propagates.
   pub async fn exists(&self, hash: &ContentHash) -> Result<bool> {
      match self.store.get(hash).await {
         Ok(_) => Ok(true),
         Err(Error::NotFound(_)) => Ok(false),
         Err(e) => Err(e),
      }
   }

   /// Walks `prev_hash` links starting at `hash`, newest first.
   ///
   /// `limit == 0` walks the whole chain. A missing link fails with
   /// `NotFound` rather than truncating, and so does a link that points back
   /// into the chain already walked.
   pub async fn history(&self, hash: &ContentHash, limit: usize) -> Result<Vec<ContentRecord>> {
      let mut out = Vec::new();
      let mut seen = HashSet::new();
      let mut next = Some(*hash);
      while let Some(current) = next {
         if limit != 0 && out.len() >= limit {
            break;
         }
         if !seen.insert(current) {
            tracing::warn!(%current, "version chain loops back on itself");
            return Err(Error::NotFound(current));
         }
         let record = self.store.get(&current).await?;
         next = record.prev_hash;
         out.push(record);
      }
      Ok(out)
   }

   pub async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      self.store.search(pattern, limit).await
   }

   pub async fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      self.store.search_exact(name, limit).await
   }

   pub async fn list(&self, query: ListQuery) -> Result<Vec<ContentRecord>> {
      self.store.list(query).await
   }

   pub async fn delete(&self, hash: &ContentHash) -> Result<()> {
      self.store.delete(hash).await
   }

   pub async fn flush(&self) -> Result<()> {
      self.store.flush().await
   }
}
