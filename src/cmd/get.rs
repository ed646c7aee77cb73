//! Copies stored bytes to a local file.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{Result, backend::Backend, hash::ContentHash};

pub async fn execute(hash: ContentHash, out: PathBuf, config: Option<&Path>) -> Result<()> {
   let record = super::with_backend(config, async |backend: &dyn Backend| {
      let mut file = tokio::fs::File::create(&out).await?;
      let record = backend.get(&hash, &mut file).await;
      if record.is_err() {
         drop(file);
         tokio::fs::remove_file(&out).await.ok();
         return record;
      }
      file.flush().await?;
      record
   })
   .await?;
   eprintln!("wrote {} ({} bytes) to {}", record.name, record.size, out.display());
   Ok(())
}
