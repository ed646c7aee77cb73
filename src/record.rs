//! Persisted metadata records and their status vocabulary.

use std::{fmt, str::FromStr};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{error::Error, hash::ContentHash};

pub const STATUS_MSG_SUCCESS: &str = "success";
pub const STATUS_MSG_UNKNOWN: &str = "unknown";

/// Durability state of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStatus {
   Success,
   InProgress,
   Failed,
}

impl StorageStatus {
   pub const fn is_terminal(self) -> bool {
      !matches!(self, Self::InProgress)
   }
}

impl fmt::Display for StorageStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Success => "success",
         Self::InProgress => "in_progress",
         Self::Failed => "failed",
      })
   }
}

/// Which backend wrote a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
   Local,
   Repo,
}

impl fmt::Display for BackendKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Local => "local",
         Self::Repo => "repo",
      })
   }
}

/// Applies the canned reasons used when a caller supplies none.
pub fn status_reason(status: StorageStatus, reason: impl Into<String>) -> String {
   let reason = reason.into();
   if !reason.is_empty() {
      return reason;
   }
   match status {
      StorageStatus::Success => STATUS_MSG_SUCCESS.to_string(),
      StorageStatus::Failed => STATUS_MSG_UNKNOWN.to_string(),
      StorageStatus::InProgress => String::new(),
   }
}

/// Metadata for one stored file, keyed by content hash.
///
/// `prev_hash` links to the previous version of the same logical file and
/// forms an append-only chain; `None` marks the first version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
   pub hash:          ContentHash,
   pub name:          String,
   pub size:          u64,
   /// Unix nanoseconds, used for list ordering.
   pub create_time:   i64,
   #[serde(default)]
   pub prev_hash:     Option<ContentHash>,
   #[serde(default)]
   pub message:       String,
   #[serde(default)]
   pub authors:       String,
   #[serde(default)]
   pub backend:       Option<BackendKind>,
   pub status:        StorageStatus,
   #[serde(default)]
   pub status_reason: String,
}

impl ContentRecord {
   pub fn new(hash: ContentHash, name: impl Into<String>) -> Self {
      Self {
         hash,
         name: name.into(),
         size: 0,
         create_time: now_nanos(),
         prev_hash: None,
         message: String::new(),
         authors: String::new(),
         backend: None,
         status: StorageStatus::InProgress,
         status_reason: String::new(),
      }
   }

   pub const fn with_size(mut self, size: u64) -> Self {
      self.size = size;
      self
   }

   pub const fn with_prev_hash(mut self, prev: Option<ContentHash>) -> Self {
      self.prev_hash = prev;
      self
   }

   pub fn with_message(mut self, message: impl Into<String>) -> Self {
      self.message = message.into();
      self
   }

   pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
      self.authors = authors.into();
      self
   }

   pub fn set_status(&mut self, status: StorageStatus, reason: impl Into<String>) {
      self.status = status;
      self.status_reason = status_reason(status, reason);
   }

   /// Applies a partial update; identity fields are left untouched.
   pub fn apply(&mut self, update: &StatusUpdate) {
      self.status = update.status;
      self.status_reason.clone_from(&update.reason);
   }
}

/// Partial record update keyed by hash: only status fields change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
   pub hash:   ContentHash,
   pub status: StorageStatus,
   pub reason: String,
}

impl StatusUpdate {
   pub fn new(hash: ContentHash, status: StorageStatus, reason: impl Into<String>) -> Self {
      Self { hash, status, reason: status_reason(status, reason) }
   }
}

/// Column used to order `list` results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
   Hash,
   Name,
   Size,
   #[default]
   CreateTime,
}

impl FromStr for OrderField {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      match s.trim().to_ascii_lowercase().as_str() {
         "hash" => Ok(Self::Hash),
         "name" => Ok(Self::Name),
         "size" => Ok(Self::Size),
         "" | "create_time" | "createtime" | "create-time" => Ok(Self::CreateTime),
         _ => Err(Error::InvalidOrderField(s.to_string())),
      }
   }
}

/// Paging parameters for `list`. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
   pub page:  usize,
   pub desc:  bool,
   pub order: OrderField,
   pub limit: usize,
}

impl Default for ListQuery {
   fn default() -> Self {
      Self { page: 1, desc: false, order: OrderField::CreateTime, limit: DEFAULT_LIMIT }
   }
}

pub const DEFAULT_LIMIT: usize = 10;

pub fn now_nanos() -> i64 {
   Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
