use std::path::Path;

use crate::{Result, backend::Backend, hash::ContentHash};

/// Prints the version chain ending at `hash`, newest first.
pub async fn execute(hash: ContentHash, limit: usize, config: Option<&Path>) -> Result<()> {
   let chain = super::with_backend(config, async |backend: &dyn Backend| {
      backend.get_history(&hash, limit).await
   })
   .await?;
   super::print_json(&chain)
}
