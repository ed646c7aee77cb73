//! Synchronous admission path in front of [`Backend::save`].

use serde::Serialize;

use crate::{
   Result,
   backend::Backend,
   error::Error,
   hash::ContentHash,
   record::ContentRecord,
};

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
   pub name:            String,
   pub data:            Vec<u8>,
   /// Digest the client claims for `data`, checked before hashing.
   pub declared_sha256: Option<String>,
   pub prev_hash:       Option<ContentHash>,
   pub message:         String,
   pub authors:         String,
}

impl UploadRequest {
   pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
      Self { name: name.into(), data, ..Self::default() }
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
   pub sha256: ContentHash,
   pub size:   u64,
}

/// Hashes, deduplicates and hands the upload to the backend.
///
/// Returns as soon as the backend accepts the record; for the repository
/// backend durability must be confirmed later with `get_meta`.
pub async fn upload(backend: &dyn Backend, req: UploadRequest) -> Result<UploadReceipt> {
   if req.name.trim().is_empty() {
      return Err(Error::InvalidRequest("file name is required".to_string()));
   }

   let declared = match req.declared_sha256.as_deref().map(str::trim) {
      Some(hex) if !hex.is_empty() => {
         let declared: ContentHash = hex.parse()?;
         if backend.exists(&declared).await? {
            return Err(Error::AlreadyExists(declared));
         }
         Some(declared)
      },
      _ => None,
   };

   let hash = ContentHash::sum(&req.data);
   if let Some(declared) = declared
      && declared != hash
   {
      return Err(Error::HashMismatch { declared: declared.to_hex(), computed: hash });
   }
   if backend.exists(&hash).await? {
      return Err(Error::AlreadyExists(hash));
   }

   let size = req.data.len() as u64;
   let record = ContentRecord::new(hash, req.name)
      .with_size(size)
      .with_prev_hash(req.prev_hash)
      .with_message(req.message)
      .with_authors(req.authors);
   backend.save(record, req.data).await?;
   tracing::info!(%hash, size, "upload accepted");

   Ok(UploadReceipt { sha256: hash, size })
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use tempfile::TempDir;

   use super::*;
   use crate::{
      backend::LocalBackend, catalog::Catalog, config::LocalConfig, meta::JsonMetaStore,
   };

   async fn local(dir: &TempDir) -> LocalBackend {
      let cfg = LocalConfig { path: dir.path().to_path_buf() };
      LocalBackend::init(&cfg, Catalog::new(Arc::new(JsonMetaStore::in_memory())))
         .await
         .unwrap()
   }

   #[tokio::test]
   async fn same_bytes_twice_is_already_exists() {
      let dir = TempDir::new().unwrap();
      let backend = local(&dir).await;

      let first = upload(&backend, UploadRequest::new("a", b"payload".to_vec()))
         .await
         .unwrap();
      assert_eq!(first.sha256, ContentHash::sum(b"payload"));
      assert_eq!(first.size, 7);

      let err = upload(&backend, UploadRequest::new("b", b"payload".to_vec()))
         .await
         .unwrap_err();
      assert!(matches!(err, Error::AlreadyExists(h) if h == first.sha256));
   }

   #[tokio::test]
   async fn declared_hash_is_checked() {
      let dir = TempDir::new().unwrap();
      let backend = local(&dir).await;

      let mut req = UploadRequest::new("a", b"one".to_vec());
      req.declared_sha256 = Some(ContentHash::sum(b"two").to_hex());
      assert!(matches!(upload(&backend, req).await, Err(Error::HashMismatch { .. })));

      let mut req = UploadRequest::new("a", b"one".to_vec());
      req.declared_sha256 = Some("not-hex".to_string());
      assert!(matches!(upload(&backend, req).await, Err(Error::InvalidHash(_))));

      let mut req = UploadRequest::new("a", b"one".to_vec());
      req.declared_sha256 = Some(ContentHash::sum(b"one").to_hex());
      upload(&backend, req).await.unwrap();
   }

   #[tokio::test]
   async fn record_carries_version_link() {
      let dir = TempDir::new().unwrap();
      let backend = local(&dir).await;
      let v1 = upload(&backend, UploadRequest::new("map", b"v1".to_vec()))
         .await
         .unwrap();

      let mut req = UploadRequest::new("map", b"v2".to_vec());
      req.prev_hash = Some(v1.sha256);
      req.message = "second pass".to_string();
      let v2 = upload(&backend, req).await.unwrap();

      let chain = backend.get_history(&v2.sha256, 0).await.unwrap();
      let hashes: Vec<_> = chain.iter().map(|r| r.hash).collect();
      assert_eq!(hashes, [v2.sha256, v1.sha256]);
      assert_eq!(chain[0].message, "second pass");
   }
}
