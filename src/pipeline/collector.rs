//! Size-or-timeout batching over the ingestion queue.

use std::time::Duration;

use tokio::{
   sync::mpsc::{self, error::TryRecvError},
   time,
};
use tokio_util::sync::CancellationToken;

use super::PendingFile;

/// Files gathered by one collector cycle.
#[derive(Debug, Default)]
pub struct Batch {
   pub files:  Vec<PendingFile>,
   /// The queue is closed or shutdown was requested; this is the last batch.
   pub closed: bool,
}

impl Batch {
   pub fn len(&self) -> usize {
      self.files.len()
   }

   pub fn is_empty(&self) -> bool {
      self.files.is_empty()
   }
}

/// Reads from `rx` until `max` files arrive, `window` elapses, or the queue
/// closes, whichever comes first.
///
/// An empty batch with `closed == false` means the window elapsed with no
/// input. Once `cancel` fires the window is cut short: whatever is already
/// buffered is drained (up to `max`) and returned without waiting.
pub async fn collect_batch(
   rx: &mut mpsc::Receiver<PendingFile>,
   max: usize,
   window: Duration,
   cancel: &CancellationToken,
) -> Batch {
   let max = max.max(1);
   let mut files = Vec::new();
   let deadline = time::sleep(window);
   tokio::pin!(deadline);

   loop {
      tokio::select! {
         biased;

         () = cancel.cancelled() => return drain_buffered(rx, files, max),
         () = &mut deadline => return Batch { files, closed: false },
         item = rx.recv() => match item {
            Some(file) => {
               files.push(file);
               if files.len() >= max {
                  tracing::debug!(count = files.len(), "file batch is full");
                  return Batch { files, closed: false };
               }
            },
            None => return Batch { files, closed: true },
         },
      }
   }
}

fn drain_buffered(
   rx: &mut mpsc::Receiver<PendingFile>,
   mut files: Vec<PendingFile>,
   max: usize,
) -> Batch {
   while files.len() < max {
      match rx.try_recv() {
         Ok(file) => files.push(file),
         Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
            return Batch { files, closed: true };
         },
      }
   }
   Batch { files, closed: false }
}
