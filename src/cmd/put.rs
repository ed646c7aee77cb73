//! Uploads one file and optionally waits for it to become durable.

use std::{
   path::{Path, PathBuf},
   time::Duration,
};

use serde::Serialize;
use tokio::time::{self, Instant};

use crate::{
   Result,
   backend::Backend,
   error::Error,
   hash::ContentHash,
   record::ContentRecord,
   upload::{UploadReceipt, UploadRequest, upload},
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct PutOptions {
   pub name:    Option<String>,
   pub sha256:  Option<String>,
   pub prev:    Option<ContentHash>,
   pub message: String,
   pub author:  String,
   /// Seconds to wait for a terminal status before returning.
   pub wait:    Option<u64>,
}

#[derive(Serialize)]
struct PutReport {
   #[serde(flatten)]
   receipt: UploadReceipt,
   #[serde(skip_serializing_if = "Option::is_none")]
   record:  Option<ContentRecord>,
}

pub async fn execute(file: PathBuf, opts: PutOptions, config: Option<&Path>) -> Result<()> {
   let data = tokio::fs::read(&file).await?;
   let name = match opts.name {
      Some(name) => name,
      None => default_name(&file)?,
   };

   let request = UploadRequest {
      name,
      data,
      declared_sha256: opts.sha256,
      prev_hash: opts.prev,
      message: opts.message,
      authors: opts.author,
   };
   let wait = opts.wait.map(Duration::from_secs);

   let report = super::with_backend(config, async move |backend: &dyn Backend| {
      let receipt = upload(backend, request).await?;
      let record = match wait {
         Some(limit) => Some(wait_for_terminal(backend, &receipt.sha256, limit).await?),
         None => None,
      };
      Ok(PutReport { receipt, record })
   })
   .await?;
   super::print_json(&report)
}

fn default_name(file: &Path) -> Result<String> {
   file
      .file_stem()
      .and_then(|s| s.to_str())
      .map(str::to_string)
      .ok_or_else(|| Error::InvalidRequest(format!("cannot derive a name from {}", file.display())))
}

async fn wait_for_terminal(
   backend: &dyn Backend,
   hash: &ContentHash,
   limit: Duration,
) -> Result<ContentRecord> {
   let deadline = Instant::now() + limit;
   loop {
      let record = backend.get_meta(hash).await?;
      if record.status.is_terminal() || Instant::now() >= deadline {
         return Ok(record);
      }
      time::sleep(POLL_INTERVAL).await;
   }
}
