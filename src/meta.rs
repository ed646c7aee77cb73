//! Metadata store: records keyed by content hash.

use std::{
   cmp::Ordering,
   collections::HashMap,
   fs,
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
   Result,
   error::Error,
   hash::ContentHash,
   record::{ContentRecord, DEFAULT_LIMIT, ListQuery, OrderField, StatusUpdate},
};

pub const META_SCHEMA_VERSION: u32 = 1;

/// Key-value store over content hash with name search and paged listing.
///
/// Implementations must serialize concurrent writers themselves; the
/// backends call into it from request handlers and the reconciler at once.
#[async_trait]
pub trait MetaStore: Send + Sync {
   /// Inserts a new record; fails with `AlreadyExists` if the hash is taken.
   async fn add(&self, record: ContentRecord) -> Result<()>;

   /// Changes only the status fields of an existing record.
   async fn update(&self, update: StatusUpdate) -> Result<()>;

   async fn get(&self, hash: &ContentHash) -> Result<ContentRecord>;

   async fn delete(&self, hash: &ContentHash) -> Result<()>;

   /// Substring match on name.
   async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<ContentRecord>>;

   /// Exact match on name.
   async fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<ContentRecord>>;

   async fn list(&self, query: ListQuery) -> Result<Vec<ContentRecord>>;

   /// Persists any buffered state. Called when a backend closes.
   async fn flush(&self) -> Result<()> {
      Ok(())
   }
}

#[derive(Serialize, Deserialize, Default)]
struct MetaFile {
   #[serde(default)]
   schema_version: u32,
   #[serde(default)]
   records:        Vec<ContentRecord>,
}

/// In-memory record map persisted as a JSON document.
///
/// Every mutation rewrites the file through a temp file + rename so a crash
/// never leaves a torn document behind. The snapshot is taken under the
/// record lock and written on the blocking pool; `writer` keeps snapshots
/// reaching disk in mutation order. With no path it is purely in-memory.
pub struct JsonMetaStore {
   path:    Option<PathBuf>,
   records: RwLock<HashMap<ContentHash, ContentRecord>>,
   writer:  Mutex<()>,
}

impl JsonMetaStore {
   pub fn in_memory() -> Self {
      Self { path: None, records: RwLock::new(HashMap::new()), writer: Mutex::new(()) }
   }

   /// Loads the store from disk, creating an empty one if it doesn't exist
   pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
      let path = path.into();
      let records = match fs::read_to_string(&path) {
         Ok(raw) => {
            let file: MetaFile = serde_json::from_str(&raw)?;
            file
               .records
               .into_iter()
               .map(|r| (r.hash, r))
               .collect()
         },
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
         Err(e) => return Err(e.into()),
      };
      tracing::debug!(path = %path.display(), records = records.len(), "opened metadata store");
      Ok(Self { path: Some(path), records: RwLock::new(records), writer: Mutex::new(()) })
   }

   pub fn path(&self) -> Option<&Path> {
      self.path.as_deref()
   }

   pub fn len(&self) -> usize {
      self.records.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.records.read().is_empty()
   }

   /// Serialized document for `records`, or `None` for an in-memory store.
   fn snapshot(&self, records: &HashMap<ContentHash, ContentRecord>) -> Result<Option<Snapshot>> {
      let Some(path) = &self.path else {
         return Ok(None);
      };
      let mut sorted: Vec<ContentRecord> = records.values().cloned().collect();
      sorted.sort_by(|a, b| a.hash.cmp(&b.hash));
      let file = MetaFile { schema_version: META_SCHEMA_VERSION, records: sorted };
      let data = serde_json::to_string_pretty(&file)?;
      Ok(Some(Snapshot { path: path.clone(), data }))
   }

   fn select(
      &self,
      limit: usize,
      mut filter: impl FnMut(&ContentRecord) -> bool,
   ) -> Vec<ContentRecord> {
      let limit = effective_limit(limit);
      let records = self.records.read();
      let mut out: Vec<ContentRecord> = records.values().filter(|r| filter(r)).cloned().collect();
      out.sort_by(|a, b| compare(a, b, OrderField::CreateTime));
      out.truncate(limit);
      out
   }
}

struct Snapshot {
   path: PathBuf,
   data: String,
}

impl Snapshot {
   fn write(self) -> Result<()> {
      if let Some(parent) = self.path.parent()
         && !parent.as_os_str().is_empty()
      {
         fs::create_dir_all(parent)?;
      }
      let tmp_path = temp_path(&self.path);
      fs::write(&tmp_path, self.data)?;
      fs::rename(&tmp_path, &self.path)?;
      Ok(())
   }
}

async fn persist(snapshot: Option<Snapshot>) -> Result<()> {
   match snapshot {
      Some(snapshot) => tokio::task::spawn_blocking(move || snapshot.write()).await?,
      None => Ok(()),
   }
}

fn temp_path(path: &Path) -> PathBuf {
   let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("meta.json");
   path.with_file_name(format!("{name}.tmp"))
}

const fn effective_limit(limit: usize) -> usize {
   if limit == 0 { DEFAULT_LIMIT } else { limit }
}

fn compare(a: &ContentRecord, b: &ContentRecord, order: OrderField) -> Ordering {
   let primary = match order {
      OrderField::Hash => Ordering::Equal,
      OrderField::Name => a.name.cmp(&b.name),
      OrderField::Size => a.size.cmp(&b.size),
      OrderField::CreateTime => a.create_time.cmp(&b.create_time),
   };
   primary.then_with(|| a.hash.cmp(&b.hash))
}

#[async_trait]
impl MetaStore for JsonMetaStore {
   async fn add(&self, record: ContentRecord) -> Result<()> {
      let _writer = self.writer.lock().await;
      let hash = record.hash;
      let snapshot = {
         let mut records = self.records.write();
         if records.contains_key(&hash) {
            return Err(Error::AlreadyExists(hash));
         }
         records.insert(hash, record);
         match self.snapshot(&records) {
            Ok(snapshot) => snapshot,
            Err(e) => {
               records.remove(&hash);
               return Err(e);
            },
         }
      };
      if let Err(e) = persist(snapshot).await {
         self.records.write().remove(&hash);
         return Err(e);
      }
      Ok(())
   }

   async fn update(&self, update: StatusUpdate) -> Result<()> {
      let _writer = self.writer.lock().await;
      let snapshot = {
         let mut records = self.records.write();
         let Some(record) = records.get_mut(&update.hash) else {
            return Err(Error::NotFound(update.hash));
         };
         record.apply(&update);
         self.snapshot(&records)?
      };
      persist(snapshot).await
   }

   async fn get(&self, hash: &ContentHash) -> Result<ContentRecord> {
      self
         .records
         .read()
         .get(hash)
         .cloned()
         .ok_or(Error::NotFound(*hash))
   }

   async fn delete(&self, hash: &ContentHash) -> Result<()> {
      let _writer = self.writer.lock().await;
      let snapshot = {
         let mut records = self.records.write();
         if records.remove(hash).is_none() {
            return Err(Error::NotFound(*hash));
         }
         self.snapshot(&records)?
      };
      persist(snapshot).await
   }

   async fn search(&self, pattern: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      Ok(self.select(limit, |r| r.name.contains(pattern)))
   }

   async fn search_exact(&self, name: &str, limit: usize) -> Result<Vec<ContentRecord>> {
      Ok(self.select(limit, |r| r.name == name))
   }

   async fn list(&self, query: ListQuery) -> Result<Vec<ContentRecord>> {
      let limit = effective_limit(query.limit);
      let page = query.page.max(1);
      let records = self.records.read();
      let mut out: Vec<&ContentRecord> = records.values().collect();
      out.sort_by(|a, b| {
         let ord = compare(a, b, query.order);
         if query.desc { ord.reverse() } else { ord }
      });
      Ok(out
         .into_iter()
         .skip((page - 1).saturating_mul(limit))
         .take(limit)
         .cloned()
         .collect())
   }

   async fn flush(&self) -> Result<()> {
      let _writer = self.writer.lock().await;
      let snapshot = self.snapshot(&self.records.read())?;
      persist(snapshot).await
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;
   use crate::record::{STATUS_MSG_UNKNOWN, StorageStatus};

   fn record(name: &str, size: u64, create_time: i64) -> ContentRecord {
      let mut r = ContentRecord::new(ContentHash::sum(name.as_bytes()), name).with_size(size);
      r.create_time = create_time;
      r
   }

   #[tokio::test]
   async fn add_rejects_duplicate_hash() {
      let store = JsonMetaStore::in_memory();
      store.add(record("a.map", 1, 1)).await.unwrap();
      let err = store.add(record("a.map", 1, 2)).await.unwrap_err();
      assert!(matches!(err, Error::AlreadyExists(_)));
   }

   #[tokio::test]
   async fn missing_hash_is_not_found() {
      let store = JsonMetaStore::in_memory();
      let hash = ContentHash::sum(b"nope");
      assert!(store.get(&hash).await.unwrap_err().is_not_found());
      assert!(store.delete(&hash).await.unwrap_err().is_not_found());
      let update = StatusUpdate::new(hash, StorageStatus::Failed, "");
      assert!(store.update(update).await.unwrap_err().is_not_found());
   }

   #[tokio::test]
   async fn update_is_partial() {
      let store = JsonMetaStore::in_memory();
      let r = record("a.map", 42, 7).with_message("hello");
      let hash = r.hash;
      store.add(r).await.unwrap();
      store
         .update(StatusUpdate::new(hash, StorageStatus::Failed, ""))
         .await
         .unwrap();
      let got = store.get(&hash).await.unwrap();
      assert_eq!(got.status, StorageStatus::Failed);
      assert_eq!(got.status_reason, STATUS_MSG_UNKNOWN);
      assert_eq!(got.size, 42);
      assert_eq!(got.message, "hello");
      assert_eq!(got.create_time, 7);
   }

   #[tokio::test]
   async fn search_and_exact_search() {
      let store = JsonMetaStore::in_memory();
      for (i, name) in ["forest.map", "forest_v2.map", "desert.map"].iter().enumerate() {
         store.add(record(name, 1, i as i64)).await.unwrap();
      }
      let fuzzy = store.search("forest", 0).await.unwrap();
      assert_eq!(fuzzy.len(), 2);
      let exact = store.search_exact("forest.map", 0).await.unwrap();
      assert_eq!(exact.len(), 1);
      assert_eq!(exact[0].name, "forest.map");
      let limited = store.search(".map", 1).await.unwrap();
      assert_eq!(limited.len(), 1);
   }

   #[tokio::test]
   async fn list_pages_and_orders() {
      let store = JsonMetaStore::in_memory();
      for i in 0..5 {
         store
            .add(record(&format!("m{i}.map"), 10 - i as u64, i))
            .await
            .unwrap();
      }

      let first = store
         .list(ListQuery { page: 1, desc: false, order: OrderField::CreateTime, limit: 2 })
         .await
         .unwrap();
      assert_eq!(first.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["m0.map", "m1.map"]);

      let third = store
         .list(ListQuery { page: 3, desc: false, order: OrderField::CreateTime, limit: 2 })
         .await
         .unwrap();
      assert_eq!(third.len(), 1);
      assert_eq!(third[0].name, "m4.map");

      let by_size_desc = store
         .list(ListQuery { page: 0, desc: true, order: OrderField::Size, limit: 0 })
         .await
         .unwrap();
      assert_eq!(by_size_desc[0].name, "m0.map");
      assert_eq!(by_size_desc.len(), 5);
   }

   #[tokio::test]
   async fn persists_across_reopen() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("meta").join("records.json");
      let r = record("a.map", 3, 1);
      let hash = r.hash;
      {
         let store = JsonMetaStore::open(&path).unwrap();
         store.add(r).await.unwrap();
         store
            .update(StatusUpdate::new(hash, StorageStatus::Success, ""))
            .await
            .unwrap();
      }
      let reopened = JsonMetaStore::open(&path).unwrap();
      assert_eq!(reopened.len(), 1);
      let got = reopened.get(&hash).await.unwrap();
      assert_eq!(got.status, StorageStatus::Success);
      assert!(!path.with_file_name("records.json.tmp").exists());
   }

   #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
   async fn concurrent_writers_leave_the_latest_state_on_disk() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("records.json");
      let store = std::sync::Arc::new(JsonMetaStore::open(&path).unwrap());

      let tasks: Vec<_> = (0..16)
         .map(|i| {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
               let r = record(&format!("m{i}.map"), i, i as i64);
               let hash = r.hash;
               store.add(r).await.unwrap();
               store
                  .update(StatusUpdate::new(hash, StorageStatus::Success, ""))
                  .await
                  .unwrap();
            })
         })
         .collect();
      for task in tasks {
         task.await.unwrap();
      }

      let reopened = JsonMetaStore::open(&path).unwrap();
      assert_eq!(reopened.len(), 16);
      let listed = reopened
         .list(ListQuery { page: 1, desc: false, order: OrderField::Size, limit: 100 })
         .await
         .unwrap();
      assert!(listed.iter().all(|r| r.status == StorageStatus::Success));
   }
}
