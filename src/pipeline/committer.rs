//! Stage, commit and push one batch, reducing the batch to a single result.

use chrono::{DateTime, Local};

use super::FileOutcome;
use crate::Result;

/// Result of creating a commit from the staged index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
   Created(String),
   /// The staged tree matches `HEAD`; nothing to commit.
   Empty,
}

/// Repository operations the pipeline needs, one batch at a time.
///
/// Implementations run on the blocking pool and are never called
/// concurrently.
pub trait Publisher: Send + 'static {
   /// Stages every change in the working tree.
   fn stage(&mut self) -> Result<()>;

   fn commit(&mut self, message: &str) -> Result<CommitOutcome>;

   /// Pushes the configured branch to the remote.
   fn push(&mut self) -> Result<()>;
}

/// Batch-level verdict. Only `Committed` carries per-file results through
/// unchanged; `Failed` applies one reason to every file of the batch.
#[derive(Debug)]
pub enum BatchResult {
   Committed {
      commit:   Option<String>,
      outcomes: Vec<FileOutcome>,
   },
   Failed {
      reason:   String,
      outcomes: Vec<FileOutcome>,
   },
}

impl BatchResult {
   pub const fn is_committed(&self) -> bool {
      matches!(self, Self::Committed { .. })
   }

   pub fn len(&self) -> usize {
      match self {
         Self::Committed { outcomes, .. } | Self::Failed { outcomes, .. } => outcomes.len(),
      }
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// Final per-file outcomes to hand to the reconciler.
   pub fn into_outcomes(self) -> Vec<FileOutcome> {
      match self {
         Self::Committed { outcomes, .. } => outcomes,
         Self::Failed { reason, outcomes } => outcomes
            .into_iter()
            .map(|o| o.fail(reason.clone()))
            .collect(),
      }
   }
}

pub fn commit_message(count: usize, now: DateTime<Local>) -> String {
   format!("{count} maps , {}", now.format("%Y-%m-%dT%H:%M:%S%:z"))
}

/// Runs stage -> commit -> push for a written batch.
pub fn publish_batch<P: Publisher + ?Sized>(
   publisher: &mut P,
   outcomes: Vec<FileOutcome>,
) -> BatchResult {
   tracing::info!("adding all files to git index");
   if let Err(e) = publisher.stage() {
      let reason = format!("git add error: {e}");
      tracing::error!("{reason}");
      return BatchResult::Failed { reason, outcomes };
   }

   let message = commit_message(outcomes.len(), Local::now());
   tracing::info!(%message, "creating commit");
   let commit = match publisher.commit(&message) {
      Ok(CommitOutcome::Created(id)) => id,
      Ok(CommitOutcome::Empty) => {
         tracing::info!("git commit is empty, skipping push");
         return BatchResult::Committed { commit: None, outcomes };
      },
      Err(e) => {
         let reason = format!("git create commit error: {e}");
         tracing::error!("{reason}");
         return BatchResult::Failed { reason, outcomes };
      },
   };

   if let Err(e) = publisher.push() {
      let reason = format!("git push error: {e}");
      tracing::error!("{reason}");
      return BatchResult::Failed { reason, outcomes };
   }

   tracing::info!(commit = %commit, files = outcomes.len(), "batch published");
   BatchResult::Committed { commit: Some(commit), outcomes }
}
