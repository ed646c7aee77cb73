//! Bounded-parallelism writes of a batch into the working tree.

use std::{
   path::{Path, PathBuf},
   sync::Arc,
};

use tokio::{sync::Semaphore, task::JoinSet};

use super::{FileOutcome, PendingFile};

/// Appends `.{extension}` unless the name already ends with exactly that
/// extension. A different extension is kept and the suffix appended anyway
/// (`a.txt` -> `a.txt.map`).
pub fn normalize_file_name(name: &str, extension: &str) -> String {
   let extension = extension.trim_start_matches('.');
   match Path::new(name).extension().and_then(|e| e.to_str()) {
      Some(existing) if existing == extension => name.to_string(),
      _ => format!("{name}.{extension}"),
   }
}

/// Rejects names that would land outside the working tree or inside `.git`.
fn target_path(dir: &Path, name: &str, extension: &str) -> Result<PathBuf, String> {
   let plain = !name.is_empty()
      && name != "."
      && name != ".."
      && name != ".git"
      && !name.contains(['/', '\\']);
   if !plain {
      return Err(format!("invalid file name {name:?}"));
   }
   Ok(dir.join(normalize_file_name(name, extension)))
}

/// Writes every file of the batch to `dir`, at most `limit` at a time.
///
/// Every file is attempted; a failure never cancels its siblings. Returns one
/// outcome per input file, in input order.
pub async fn write_batch(
   files: Vec<PendingFile>,
   dir: &Path,
   extension: &str,
   limit: usize,
) -> Vec<FileOutcome> {
   tracing::info!(count = files.len(), dir = %dir.display(), "writing batch to working tree");

   let permits = Arc::new(Semaphore::new(limit.max(1)));
   let idents: Vec<_> = files.iter().map(|f| (f.name.clone(), f.hash)).collect();
   let mut tasks = JoinSet::new();

   for (idx, file) in files.into_iter().enumerate() {
      let permits = Arc::clone(&permits);
      let target = target_path(dir, &file.name, extension);
      tasks.spawn(async move {
         let PendingFile { name, hash, content } = file;
         let path = match target {
            Ok(path) => path,
            Err(reason) => return (idx, FileOutcome::failed(name, hash, reason)),
         };
         let Ok(_permit) = permits.acquire_owned().await else {
            return (idx, FileOutcome::failed(name, hash, "write pool closed"));
         };
         let outcome = match tokio::fs::write(&path, &content).await {
            Ok(()) => FileOutcome::success(name, hash),
            Err(e) => {
               let reason = format!("failed to write file {name:?}: {e}");
               tracing::warn!("{reason}");
               FileOutcome::failed(name, hash, reason)
            },
         };
         (idx, outcome)
      });
   }

   let mut slots: Vec<Option<FileOutcome>> = vec![None; idents.len()];
   while let Some(joined) = tasks.join_next().await {
      match joined {
         Ok((idx, outcome)) => slots[idx] = Some(outcome),
         Err(e) => tracing::error!("file writer task failed: {e}"),
      }
   }

   slots
      .into_iter()
      .zip(idents)
      .map(|(slot, (name, hash))| {
         slot.unwrap_or_else(|| FileOutcome::failed(name, hash, "file writer task failed"))
      })
      .collect()
}
