mod support;

use mapstore::{
   Error,
   backend::open_backend,
   config::Config,
   hash::ContentHash,
   record::{BackendKind, ListQuery, OrderField, StorageStatus},
   upload::{UploadRequest, upload},
};
use tempfile::TempDir;

fn local_config(dir: &TempDir) -> Config {
   let mut cfg = Config::default();
   cfg.storage.kind = BackendKind::Local;
   cfg.db.path = dir.path().join("meta").join("file_meta.json");
   cfg.local.path = dir.path().join("uploads");
   cfg
}

#[tokio::test]
async fn records_survive_reopen() {
   let dir = TempDir::new().expect("temp dir");
   let cfg = local_config(&dir);

   let backend = open_backend(&cfg).await.expect("open");
   assert_eq!(backend.kind(), BackendKind::Local);
   let receipt = upload(backend.as_ref(), UploadRequest::new("valley", b"green".to_vec()))
      .await
      .expect("upload");
   backend.close().await.expect("close");

   let reopened = open_backend(&cfg).await.expect("reopen");
   let record = reopened.get_meta(&receipt.sha256).await.expect("meta");
   assert_eq!(record.name, "valley");
   assert_eq!(record.size, 5);
   assert_eq!(record.status, StorageStatus::Success);

   let mut out = Vec::new();
   reopened.get(&receipt.sha256, &mut out).await.expect("get");
   assert_eq!(out, b"green");
}

#[tokio::test]
async fn search_and_list() {
   let dir = TempDir::new().expect("temp dir");
   let backend = open_backend(&local_config(&dir)).await.expect("open");
   for (name, body) in [("alpine", "a"), ("alpine-2", "bb"), ("basin", "ccc")] {
      upload(backend.as_ref(), UploadRequest::new(name, body.as_bytes().to_vec()))
         .await
         .expect("upload");
   }

   let fuzzy = backend.search("alp", 0).await.expect("search");
   assert_eq!(fuzzy.len(), 2);
   let exact = backend.search_exact("alpine", 0).await.expect("exact");
   assert_eq!(exact.len(), 1);

   let by_size = backend
      .list(ListQuery { page: 1, desc: true, order: OrderField::Size, limit: 2 })
      .await
      .expect("list");
   let names: Vec<_> = by_size.iter().map(|r| r.name.as_str()).collect();
   assert_eq!(names, ["basin", "alpine-2"]);

   let second_page = backend
      .list(ListQuery { page: 2, desc: true, order: OrderField::Size, limit: 2 })
      .await
      .expect("list");
   assert_eq!(second_page.len(), 1);
   assert_eq!(second_page[0].name, "alpine");
}

#[tokio::test]
async fn broken_history_is_not_found() {
   let dir = TempDir::new().expect("temp dir");
   let backend = open_backend(&local_config(&dir)).await.expect("open");

   let missing = ContentHash::sum(b"never uploaded");
   let mut req = UploadRequest::new("orphan", b"v2".to_vec());
   req.prev_hash = Some(missing);
   let receipt = upload(backend.as_ref(), req).await.expect("upload");

   let err = backend
      .get_history(&receipt.sha256, 0)
      .await
      .expect_err("broken chain");
   assert!(matches!(err, Error::NotFound(h) if h == missing));

   let first = backend.get_history(&receipt.sha256, 1).await.expect("limited");
   assert_eq!(first.len(), 1);
}

#[tokio::test]
async fn get_of_unknown_hash_is_not_found() {
   let dir = TempDir::new().expect("temp dir");
   let backend = open_backend(&local_config(&dir)).await.expect("open");
   let mut out = Vec::new();
   let err = backend
      .get(&ContentHash::sum(b"nope"), &mut out)
      .await
      .expect_err("unknown");
   assert!(err.is_not_found());
   assert_eq!(err.exit_code(), 3);
}
