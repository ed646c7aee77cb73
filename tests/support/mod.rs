#![allow(dead_code)]

use std::{
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use git2::{Repository, RepositoryInitOptions};
use mapstore::{
   backend::Backend,
   catalog::Catalog,
   config::RepoConfig,
   hash::ContentHash,
   meta::JsonMetaStore,
   record::{ContentRecord, StorageStatus},
};
use tempfile::TempDir;

/// Scratch directory holding a bare remote and a working tree path.
pub struct Sandbox {
   pub dir:     TempDir,
   pub remote:  PathBuf,
   pub workdir: PathBuf,
}

impl Sandbox {
   /// A sandbox whose remote exists but has no commits.
   pub fn empty_remote() -> Self {
      let dir = TempDir::new().expect("temp dir");
      let remote = dir.path().join("remote.git");
      init_bare(&remote);
      let workdir = dir.path().join("work");
      Self { dir, remote, workdir }
   }

   pub fn repo_config(&self) -> RepoConfig {
      RepoConfig {
         workdir: self.workdir.clone(),
         remote_url: self.remote.to_string_lossy().into_owned(),
         max_batch_files: 4,
         batch_window_secs: 1,
         ..RepoConfig::default()
      }
   }

   /// Config for a second checkout of the same remote.
   pub fn second_checkout(&self, name: &str) -> RepoConfig {
      RepoConfig { workdir: self.dir.path().join(name), ..self.repo_config() }
   }

   pub fn remote_repo(&self) -> Repository {
      Repository::open_bare(&self.remote).expect("open bare remote")
   }

   /// Names of the files on the remote's `master` tip.
   pub fn remote_files(&self) -> Vec<String> {
      let repo = self.remote_repo();
      let commit = repo
         .find_reference("refs/heads/master")
         .expect("master ref")
         .peel_to_commit()
         .expect("tip commit");
      let tree = commit.tree().expect("tip tree");
      let mut names: Vec<_> = tree
         .iter()
         .filter_map(|e| e.name().map(str::to_string))
         .collect();
      names.sort();
      names
   }

   pub fn remote_commit_count(&self) -> usize {
      let repo = self.remote_repo();
      let mut walk = repo.revwalk().expect("revwalk");
      walk.push_ref("refs/heads/master").expect("push master");
      walk.count()
   }
}

pub fn init_bare(path: &Path) {
   let mut opts = RepositoryInitOptions::new();
   opts.bare(true).initial_head("master");
   Repository::init_opts(path, &opts).expect("init bare remote");
}

pub fn memory_catalog() -> Catalog {
   Catalog::new(Arc::new(JsonMetaStore::in_memory()))
}

pub fn record_for(name: &str, body: &[u8]) -> ContentRecord {
   ContentRecord::new(ContentHash::sum(body), name).with_size(body.len() as u64)
}

/// Polls `get_meta` until the record leaves `InProgress`.
pub async fn wait_terminal(backend: &dyn Backend, hash: &ContentHash) -> ContentRecord {
   for _ in 0..100 {
      let record = backend.get_meta(hash).await.expect("record");
      if record.status != StorageStatus::InProgress {
         return record;
      }
      tokio::time::sleep(Duration::from_millis(100)).await;
   }
   panic!("record {hash} never reached a terminal status");
}
