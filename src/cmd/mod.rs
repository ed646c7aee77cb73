//! CLI command implementations for mapstore.
//!
//! Each module corresponds to one subcommand. Commands that touch stored
//! data open the configured backend, do their work and close it again, so a
//! repository backend gets to publish whatever was queued before exit.

pub mod delete;
pub mod get;
pub mod history;
pub mod init_config;
pub mod list;
pub mod meta;
pub mod put;
pub mod search;

use std::path::Path;

use serde::Serialize;

use crate::{
   Result,
   backend::{Backend, open_backend},
   config::Config,
};

/// Loads configuration and opens the selected backend.
pub async fn open(config_path: Option<&Path>) -> Result<Box<dyn Backend>> {
   let config = Config::load(config_path)?;
   open_backend(&config).await
}

/// Runs `f` against an open backend and always closes it afterwards.
pub async fn with_backend<T>(
   config_path: Option<&Path>,
   f: impl AsyncFnOnce(&dyn Backend) -> Result<T>,
) -> Result<T> {
   let backend = open(config_path).await?;
   let result = f(backend.as_ref()).await;
   let closed = backend.close().await;
   let value = result?;
   closed?;
   Ok(value)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
   println!("{}", serde_json::to_string_pretty(value)?);
   Ok(())
}
