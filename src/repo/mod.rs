//! Git working tree used by the repository backend.

pub mod bootstrap;

use std::{
   cell::{Cell, RefCell},
   fs,
   path::Path,
};

use git2::{
   AutotagOption, BranchType, Commit, Cred, Direction, ErrorCode, FetchOptions, IndexAddOption,
   PushOptions, Remote, RemoteCallbacks, Repository, RepositoryInitOptions, Signature,
   build::{CheckoutBuilder, RepoBuilder},
};

pub use self::bootstrap::{BootstrapState, Prepared, prepare};
use crate::{
   config::RepoConfig,
   error::{BootstrapError, Error, Result},
   pipeline::{CommitOutcome, Publisher},
};

/// Credential callbacks give up after this many attempts; libgit2 otherwise
/// keeps asking when a key is refused.
const MAX_CREDENTIAL_ATTEMPTS: usize = 4;

/// Message of the commit that seeds an empty remote.
pub const INITIAL_COMMIT_MESSAGE: &str = "initial repo";

/// Checks if a path is a git repository
pub fn is_git_repo(path: &Path) -> bool {
   Repository::open(path).is_ok()
}

/// Result of the startup pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
   UpToDate,
   FastForwarded(String),
}

/// Why a clone did not produce a usable working tree.
#[derive(Debug)]
pub enum CloneFailure {
   /// The remote exists but has no commits.
   EmptyRemote,
   Failed(git2::Error),
}

/// An opened repository plus the settings it was opened with.
pub struct Workspace {
   repo: Repository,
   cfg:  RepoConfig,
}

impl Workspace {
   pub fn open(cfg: &RepoConfig) -> Result<Self, git2::Error> {
      let repo = Repository::open(&cfg.workdir)?;
      Ok(Self { repo, cfg: cfg.clone() })
   }

   /// Clones `remote_url` into `workdir`.
   ///
   /// The remote's advertised references decide emptiness before anything
   /// is written: no reference with a commit is [`CloneFailure::EmptyRemote`].
   /// Every clone error is [`CloneFailure::Failed`].
   pub fn clone_remote(cfg: &RepoConfig) -> Result<Self, CloneFailure> {
      if !remote_has_commits(cfg).map_err(CloneFailure::Failed)? {
         return Err(CloneFailure::EmptyRemote);
      }

      let mut fetch = FetchOptions::new();
      fetch.remote_callbacks(credential_callbacks(cfg, None));

      let mut builder = RepoBuilder::new();
      builder.fetch_options(fetch);
      builder.remote_create(|repo, _name, url| repo.remote(&cfg.remote_name, url));

      let repo = builder
         .clone(&cfg.remote_url, &cfg.workdir)
         .map_err(CloneFailure::Failed)?;
      if repo.is_empty().map_err(CloneFailure::Failed)? {
         return Err(CloneFailure::EmptyRemote);
      }
      Ok(Self { repo, cfg: cfg.clone() })
   }

   /// Creates a fresh repository in `workdir`, commits the placeholder file,
   /// adds the remote and pushes to seed it.
   pub fn init_seeded(cfg: &RepoConfig) -> Result<Self> {
      let mut opts = RepositoryInitOptions::new();
      opts.initial_head(&cfg.branch);
      let repo = Repository::init_opts(&cfg.workdir, &opts)?;
      let mut ws = Self { repo, cfg: cfg.clone() };

      let placeholder = ws.workdir()?.join(&cfg.init_file_name);
      fs::write(&placeholder, &cfg.init_file_content)?;
      ws.stage_all()?;
      ws.commit_all(INITIAL_COMMIT_MESSAGE)?;
      ws.repo.remote(&cfg.remote_name, &cfg.remote_url)?;
      ws.push()?;
      tracing::info!(remote = %cfg.remote_url, "seeded empty remote");
      Ok(ws)
   }

   pub fn repository(&self) -> &Repository {
      &self.repo
   }

   pub fn config(&self) -> &RepoConfig {
      &self.cfg
   }

   pub fn workdir(&self) -> Result<&Path> {
      self
         .repo
         .workdir()
         .ok_or_else(|| Error::NoWorkingDirectory(self.repo.path().to_path_buf()))
   }

   /// Returns the current HEAD commit SHA, if any.
   pub fn head_sha(&self) -> Option<String> {
      let head = self.repo.head().ok()?;
      head.target().map(|oid| oid.to_string())
   }

   /// Makes the configured branch the checked-out `HEAD`, creating it from
   /// the remote-tracking branch or the current `HEAD` when missing.
   pub fn ensure_branch(&self) -> Result<()> {
      let branch = &self.cfg.branch;
      let branch_ref = self.cfg.branch_ref();
      let current = self.repo.head().ok().and_then(|h| h.name().map(str::to_string));
      if current.as_deref() == Some(branch_ref.as_str()) {
         return Ok(());
      }

      if self.repo.find_branch(branch, BranchType::Local).is_err() {
         let tracking = format!("{}/{}", self.cfg.remote_name, branch);
         let start = match self.repo.find_branch(&tracking, BranchType::Remote) {
            Ok(remote) => Some(remote.get().peel_to_commit()?),
            Err(_) => self.head_commit()?,
         };
         let Some(start) = start else {
            // Unborn HEAD: point it at the branch and let the first commit create it.
            self.repo.set_head(&branch_ref)?;
            return Ok(());
         };
         let mut local = self.repo.branch(branch, &start, false)?;
         if self.repo.find_branch(&tracking, BranchType::Remote).is_ok() {
            local.set_upstream(Some(tracking.as_str()))?;
         }
      }

      self.repo.set_head(&branch_ref)?;
      self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
      Ok(())
   }

   /// Fetches the configured branch and fast-forwards to it.
   pub fn pull(&self) -> Result<PullOutcome> {
      let branch = &self.cfg.branch;
      let tracking_ref = format!("refs/remotes/{}/{}", self.cfg.remote_name, branch);
      let refspec = format!("+{}:{tracking_ref}", self.cfg.branch_ref());

      let mut remote = self.repo.find_remote(&self.cfg.remote_name)?;
      let mut fetch = FetchOptions::new();
      fetch.remote_callbacks(credential_callbacks(&self.cfg, self.repo.config().ok()));
      fetch.download_tags(AutotagOption::None);
      remote.fetch(&[refspec.as_str()], Some(&mut fetch), None)?;

      let tracking = match self.repo.find_reference(&tracking_ref) {
         Ok(r) => r,
         Err(e) if e.code() == ErrorCode::NotFound => return Ok(PullOutcome::UpToDate),
         Err(e) => return Err(e.into()),
      };
      let incoming = self.repo.reference_to_annotated_commit(&tracking)?;
      let (analysis, _) = self.repo.merge_analysis(&[&incoming])?;

      if analysis.is_up_to_date() {
         return Ok(PullOutcome::UpToDate);
      }
      if !(analysis.is_fast_forward() || analysis.is_unborn()) {
         return Err(BootstrapError::Diverged { branch: branch.clone() }.into());
      }

      let target = incoming.id();
      let branch_ref = self.cfg.branch_ref();
      match self.repo.find_reference(&branch_ref) {
         Ok(mut local) => {
            local.set_target(target, "pull: fast-forward")?;
         },
         Err(_) => {
            self
               .repo
               .reference(&branch_ref, target, true, "pull: create branch")?;
         },
      }
      self.repo.set_head(&branch_ref)?;
      self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
      Ok(PullOutcome::FastForwarded(target.to_string()))
   }

   /// Stages every addition, modification and removal in the working tree.
   pub fn stage_all(&mut self) -> Result<()> {
      let mut index = self.repo.index()?;
      index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
      index.update_all(["*"].iter(), None)?;
      index.write()?;
      Ok(())
   }

   /// Commits the index onto `HEAD`. Returns [`CommitOutcome::Empty`] when
   /// the staged tree equals the parent tree.
   pub fn commit_all(&mut self, message: &str) -> Result<CommitOutcome> {
      let mut index = self.repo.index()?;
      let tree_id = index.write_tree()?;
      let parent = self.head_commit()?;
      if let Some(parent) = &parent
         && parent.tree_id() == tree_id
      {
         return Ok(CommitOutcome::Empty);
      }

      let tree = self.repo.find_tree(tree_id)?;
      let sig = Signature::now(&self.cfg.commit_author, &self.cfg.commit_email)?;
      let parents: Vec<&Commit<'_>> = parent.iter().collect();
      let oid = self
         .repo
         .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
      Ok(CommitOutcome::Created(oid.to_string()))
   }

   /// Pushes the configured branch to the same name on the remote.
   pub fn push(&mut self) -> Result<()> {
      let branch_ref = self.cfg.branch_ref();
      let refspec = format!("{branch_ref}:{branch_ref}");
      let mut remote = self.repo.find_remote(&self.cfg.remote_name)?;

      let rejected: RefCell<Option<String>> = RefCell::new(None);
      {
         let mut callbacks = credential_callbacks(&self.cfg, self.repo.config().ok());
         callbacks.push_update_reference(|_ref_name, status| {
            if let Some(msg) = status {
               *rejected.borrow_mut() = Some(msg.to_string());
            }
            Ok(())
         });
         let mut opts = PushOptions::new();
         opts.remote_callbacks(callbacks);
         remote.push(&[refspec.as_str()], Some(&mut opts))?;
      }

      if let Some(msg) = rejected.into_inner() {
         return Err(Error::PushRejected(msg));
      }
      Ok(())
   }

   fn head_commit(&self) -> Result<Option<Commit<'_>>> {
      match self.repo.head() {
         Ok(head) => Ok(Some(head.peel_to_commit()?)),
         Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
         Err(e) => Err(e.into()),
      }
   }
}

impl Publisher for Workspace {
   fn stage(&mut self) -> Result<()> {
      self.stage_all()
   }

   fn commit(&mut self, message: &str) -> Result<CommitOutcome> {
      self.commit_all(message)
   }

   fn push(&mut self) -> Result<()> {
      Workspace::push(self)
   }
}

/// Lists the remote's references; an unborn `HEAD` is advertised with a
/// zero id or not at all.
fn remote_has_commits(cfg: &RepoConfig) -> Result<bool, git2::Error> {
   let mut remote = Remote::create_detached(cfg.remote_url.as_str())?;
   let connection =
      remote.connect_auth(Direction::Fetch, Some(credential_callbacks(cfg, None)), None)?;
   let has_commits = connection
      .list()?
      .iter()
      .any(|head| !head.oid().is_zero());
   Ok(has_commits)
}

/// Credentials in order: configured key file, ssh agent, git credential
/// helper, then the default.
fn credential_callbacks<'a>(
   cfg: &RepoConfig,
   git_cfg: Option<git2::Config>,
) -> RemoteCallbacks<'a> {
   let key_path = cfg.ssh_key_path.clone();
   let attempts = Cell::new(0usize);
   let mut callbacks = RemoteCallbacks::new();
   callbacks.credentials(move |url, username_from_url, allowed| {
      let attempt = attempts.get();
      attempts.set(attempt + 1);
      if attempt >= MAX_CREDENTIAL_ATTEMPTS {
         return Err(git2::Error::from_str("no usable credentials for remote"));
      }

      if allowed.is_ssh_key() {
         let user = username_from_url.unwrap_or("git");
         if attempt == 0
            && let Some(key) = &key_path
         {
            return Cred::ssh_key(user, None, key, None);
         }
         return Cred::ssh_key_from_agent(user);
      }
      if allowed.is_user_pass_plaintext()
         && let Some(cfg) = &git_cfg
         && let Ok(cred) = Cred::credential_helper(cfg, url, username_from_url)
      {
         return Ok(cred);
      }
      Cred::default()
   });
   callbacks
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   fn bare_remote(dir: &Path) -> String {
      let mut opts = RepositoryInitOptions::new();
      opts.bare(true).initial_head("master");
      Repository::init_opts(dir, &opts).unwrap();
      dir.to_string_lossy().into_owned()
   }

   fn repo_cfg(workdir: &Path, remote: String) -> RepoConfig {
      RepoConfig { workdir: workdir.to_path_buf(), remote_url: remote, ..RepoConfig::default() }
   }

   #[test]
   fn init_seeded_pushes_placeholder_commit() {
      let tmp = TempDir::new().unwrap();
      let remote = bare_remote(&tmp.path().join("remote.git"));
      let cfg = repo_cfg(&tmp.path().join("work"), remote.clone());

      let ws = Workspace::init_seeded(&cfg).unwrap();
      assert!(ws.workdir().unwrap().join("Placeholder").exists());

      let bare = Repository::open_bare(&remote).unwrap();
      let head = bare
         .find_reference("refs/heads/master")
         .unwrap()
         .peel_to_commit()
         .unwrap();
      assert_eq!(head.message(), Some(INITIAL_COMMIT_MESSAGE));
      assert_eq!(ws.head_sha(), Some(head.id().to_string()));
   }

   #[test]
   fn commit_without_changes_is_empty() {
      let tmp = TempDir::new().unwrap();
      let remote = bare_remote(&tmp.path().join("remote.git"));
      let mut ws = Workspace::init_seeded(&repo_cfg(&tmp.path().join("work"), remote)).unwrap();

      ws.stage_all().unwrap();
      assert_eq!(ws.commit_all("noop").unwrap(), CommitOutcome::Empty);

      fs::write(ws.workdir().unwrap().join("a.map"), "alpha").unwrap();
      ws.stage_all().unwrap();
      assert!(matches!(ws.commit_all("one").unwrap(), CommitOutcome::Created(_)));
   }

   #[test]
   fn clone_of_empty_remote_is_detected() {
      let tmp = TempDir::new().unwrap();
      let remote = bare_remote(&tmp.path().join("remote.git"));
      let cfg = repo_cfg(&tmp.path().join("work"), remote);
      assert!(matches!(Workspace::clone_remote(&cfg), Err(CloneFailure::EmptyRemote)));
      assert!(!cfg.workdir.exists());
   }

   #[test]
   fn clone_into_occupied_directory_is_a_plain_failure() {
      let tmp = TempDir::new().unwrap();
      let remote = bare_remote(&tmp.path().join("remote.git"));
      drop(Workspace::init_seeded(&repo_cfg(&tmp.path().join("seed"), remote.clone())).unwrap());

      let cfg = repo_cfg(&tmp.path().join("work"), remote);
      fs::create_dir_all(&cfg.workdir).unwrap();
      fs::write(cfg.workdir.join("notes.txt"), "mine").unwrap();
      assert!(matches!(Workspace::clone_remote(&cfg), Err(CloneFailure::Failed(_))));
   }

   #[test]
   fn pull_fast_forwards_to_remote() {
      let tmp = TempDir::new().unwrap();
      let remote = bare_remote(&tmp.path().join("remote.git"));
      let first = repo_cfg(&tmp.path().join("first"), remote.clone());
      let mut seeded = Workspace::init_seeded(&first).unwrap();

      let second = repo_cfg(&tmp.path().join("second"), remote);
      let other = Workspace::clone_remote(&second).ok().unwrap();
      other.ensure_branch().unwrap();
      assert_eq!(other.pull().unwrap(), PullOutcome::UpToDate);

      fs::write(seeded.workdir().unwrap().join("b.map"), "beta").unwrap();
      seeded.stage_all().unwrap();
      seeded.commit_all("1 maps").unwrap();
      seeded.push().unwrap();

      let PullOutcome::FastForwarded(sha) = other.pull().unwrap() else {
         panic!("expected fast-forward");
      };
      assert_eq!(Some(sha), seeded.head_sha());
      assert!(other.workdir().unwrap().join("b.map").exists());
   }
}
