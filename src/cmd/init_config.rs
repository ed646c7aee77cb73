//! Writes a configuration file holding every default.

use std::path::PathBuf;

use crate::{
   Result,
   config::{config_file_path, write_default_config},
};

pub fn execute(path: Option<PathBuf>, force: bool) -> Result<()> {
   let path = path.unwrap_or_else(config_file_path);
   if path.exists() && !force {
      println!("{} already exists (use --force to overwrite)", path.display());
      return Ok(());
   }
   write_default_config(&path)?;
   println!("wrote {}", path.display());
   Ok(())
}
