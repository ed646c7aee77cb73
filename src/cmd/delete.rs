use std::path::Path;

use crate::{Result, backend::Backend, hash::ContentHash};

pub async fn execute(hash: ContentHash, config: Option<&Path>) -> Result<()> {
   super::with_backend(config, async |backend: &dyn Backend| backend.delete(&hash).await).await?;
   println!("deleted {hash}");
   Ok(())
}
