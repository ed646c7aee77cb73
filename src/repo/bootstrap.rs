//! Startup sequence that turns a configured path and remote into a working
//! tree the pipeline can publish from.
//!
//! ```text
//! Unknown -> { Opened | Cloned | Initialized } -> WorkingTreeReady -> (pull) -> Running
//! ```
//!
//! An existing repository at `workdir` is opened. Otherwise the remote is
//! cloned; a remote that advertises no commits is seeded from a fresh local
//! repository instead. A `workdir` holding other files is never cloned or
//! initialized into. Every other failure aborts startup.

use std::{fmt, fs, path::Path};

use super::{CloneFailure, PullOutcome, Workspace, is_git_repo};
use crate::{
   config::RepoConfig,
   error::{BootstrapError, Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
   Unknown,
   Opened,
   Cloned,
   Initialized,
   WorkingTreeReady,
   Running,
}

impl fmt::Display for BootstrapState {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Unknown => "unknown",
         Self::Opened => "opened",
         Self::Cloned => "cloned",
         Self::Initialized => "initialized",
         Self::WorkingTreeReady => "working_tree_ready",
         Self::Running => "running",
      })
   }
}

/// A working tree that passed the startup pull.
pub struct Prepared {
   pub workspace: Workspace,
   /// How the working tree was obtained.
   pub origin:    BootstrapState,
   pub pull:      PullOutcome,
   /// Every state visited, in order.
   pub trace:     Vec<BootstrapState>,
}

struct Machine {
   state: BootstrapState,
   trace: Vec<BootstrapState>,
}

impl Machine {
   fn new() -> Self {
      Self { state: BootstrapState::Unknown, trace: vec![BootstrapState::Unknown] }
   }

   fn advance(&mut self, next: BootstrapState) {
      tracing::debug!(from = %self.state, to = %next, "bootstrap transition");
      self.state = next;
      self.trace.push(next);
   }
}

/// Runs the startup sequence. Blocking; call it off the async runtime.
pub fn prepare(cfg: &RepoConfig) -> Result<Prepared> {
   let mut machine = Machine::new();

   let workspace = obtain(cfg, &mut machine)?;
   let origin = machine.state;

   workspace
      .ensure_branch()
      .map_err(|e| BootstrapError::Checkout(Box::new(e)))?;
   machine.advance(BootstrapState::WorkingTreeReady);

   let pull = workspace.pull().map_err(|e| match e {
      Error::Bootstrap(inner) => inner,
      other => BootstrapError::Pull(Box::new(other)),
   })?;
   match &pull {
      PullOutcome::UpToDate => tracing::info!("working tree already up to date"),
      PullOutcome::FastForwarded(sha) => {
         tracing::info!(commit = %sha, "fast-forwarded working tree");
      },
   }
   machine.advance(BootstrapState::Running);

   Ok(Prepared { workspace, origin, pull, trace: machine.trace })
}

fn obtain(cfg: &RepoConfig, machine: &mut Machine) -> Result<Workspace> {
   let workdir = cfg.workdir.as_path();

   if is_git_repo(workdir) {
      tracing::info!("opening existing working tree {}", workdir.display());
      let ws = Workspace::open(cfg)
         .map_err(|source| BootstrapError::Open { path: workdir.to_path_buf(), source })?;
      machine.advance(BootstrapState::Opened);
      return Ok(ws);
   }

   let created = !workdir.exists();
   if !created && has_entries(workdir)? {
      return Err(BootstrapError::Occupied { path: workdir.to_path_buf() }.into());
   }
   tracing::info!(remote = %cfg.remote_url, "cloning into {}", workdir.display());
   match Workspace::clone_remote(cfg) {
      Ok(ws) => {
         machine.advance(BootstrapState::Cloned);
         Ok(ws)
      },
      Err(CloneFailure::EmptyRemote) => {
         tracing::info!("remote has no commits; initializing a local repository");
         discard_clone(workdir, created)?;
         let ws = Workspace::init_seeded(cfg).map_err(|e| {
            discard_clone(workdir, created).ok();
            BootstrapError::Init(Box::new(e))
         })?;
         machine.advance(BootstrapState::Initialized);
         Ok(ws)
      },
      Err(CloneFailure::Failed(source)) => {
         discard_clone(workdir, created)?;
         Err(BootstrapError::Clone { url: cfg.remote_url.clone(), source }.into())
      },
   }
}

fn has_entries(dir: &Path) -> Result<bool> {
   Ok(fs::read_dir(dir)?.next().is_some())
}

/// Removes what a failed clone left behind, leaving a pre-existing
/// directory in place.
fn discard_clone(workdir: &Path, created: bool) -> Result<()> {
   let target = if created { workdir.to_path_buf() } else { workdir.join(".git") };
   match fs::remove_dir_all(&target) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
   }
}
