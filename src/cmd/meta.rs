use std::path::Path;

use crate::{Result, backend::Backend, hash::ContentHash};

pub async fn execute(hash: ContentHash, config: Option<&Path>) -> Result<()> {
   let record =
      super::with_backend(config, async |backend: &dyn Backend| backend.get_meta(&hash).await)
         .await?;
   super::print_json(&record)
}
