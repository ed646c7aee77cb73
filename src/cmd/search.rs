//! Name search over stored records.

use std::path::Path;

use crate::{Result, backend::Backend};

pub async fn execute(
   pattern: String,
   exact: bool,
   limit: usize,
   config: Option<&Path>,
) -> Result<()> {
   let records = super::with_backend(config, async |backend: &dyn Backend| {
      if exact {
         backend.search_exact(&pattern, limit).await
      } else {
         backend.search(&pattern, limit).await
      }
   })
   .await?;
   super::print_json(&records)
}
