use std::path::Path;

use crate::{Result, backend::Backend, record::ListQuery};

pub async fn execute(query: ListQuery, config: Option<&Path>) -> Result<()> {
   let records =
      super::with_backend(config, async |backend: &dyn Backend| backend.list(query).await).await?;
   super::print_json(&records)
}
