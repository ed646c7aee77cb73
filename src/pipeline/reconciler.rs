//! Applies terminal per-file outcomes to the metadata store.

use tokio::sync::mpsc;

use super::FileOutcome;
use crate::catalog::Catalog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
   pub applied: usize,
   pub failed:  usize,
}

/// Consumes outcomes until the channel closes.
///
/// Update failures are logged and dropped; the record then stays
/// `InProgress`.
pub async fn run_reconciler(
   catalog: Catalog,
   mut rx: mpsc::Receiver<FileOutcome>,
) -> ReconcileStats {
   let mut stats = ReconcileStats::default();
   while let Some(outcome) = rx.recv().await {
      tracing::debug!(
         hash = %outcome.hash,
         status = %outcome.status,
         "updating metadata record for {}",
         outcome.name
      );
      let name = outcome.name.clone();
      match catalog.update(outcome.into_update()).await {
         Ok(()) => stats.applied += 1,
         Err(e) => {
            stats.failed += 1;
            tracing::warn!("failed to record status for {name}: {e}");
         },
      }
   }
   tracing::debug!(applied = stats.applied, failed = stats.failed, "status reconciler stopped");
   stats
}
