use std::{io, path::PathBuf};

use thiserror::Error;

use crate::hash::ContentHash;

/// Main error type for the mapstore crate.
///
/// Covers admission failures reported synchronously to callers, metadata
/// store lookups, git operations performed by the repository backend, and
/// configuration problems.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Git operation failed.
   #[error("git error: {0}")]
   Git(#[from] git2::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML serialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::ser::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// The repository backend could not establish a working tree.
   #[error("bootstrap error: {0}")]
   Bootstrap(#[from] BootstrapError),

   /// No metadata record exists for the hash.
   #[error("record not found: {0}")]
   NotFound(ContentHash),

   /// A record with this hash is already stored.
   #[error("{0} already uploaded")]
   AlreadyExists(ContentHash),

   /// The caller declared a digest that does not match the payload.
   #[error("declared sha256 {declared} does not match content hash {computed}")]
   HashMismatch { declared: String, computed: ContentHash },

   /// A string could not be parsed as a SHA-256 hex digest.
   #[error("invalid content hash: {0:?}")]
   InvalidHash(String),

   /// The upload request is malformed.
   #[error("invalid request: {0}")]
   InvalidRequest(String),

   /// Unknown column requested for list ordering.
   #[error("invalid order field: {0:?}")]
   InvalidOrderField(String),

   /// The operation is not supported by this backend.
   #[error("{0} is not implemented for this backend")]
   Unimplemented(&'static str),

   /// The remote refused a reference update during push.
   #[error("push rejected: {0}")]
   PushRejected(String),

   /// The ingestion queue was closed (backend shut down).
   #[error("ingestion queue is closed")]
   QueueClosed,

   /// A background task panicked or was aborted.
   #[error("background task failed: {0}")]
   Task(#[from] tokio::task::JoinError),

   /// Failed to get the working directory of a git repository.
   #[error("failed to get working directory: {path}", path = _0.display())]
   NoWorkingDirectory(PathBuf),
}

impl Error {
   pub const fn exit_code(&self) -> i32 {
      match self {
         Self::NotFound(_) => 3,
         Self::AlreadyExists(_) => 4,
         Self::HashMismatch { .. }
         | Self::InvalidHash(_)
         | Self::InvalidRequest(_)
         | Self::InvalidOrderField(_) => 2,
         Self::Config(_) => 5,
         Self::Bootstrap(_) => 6,
         _ => 1,
      }
   }

   pub const fn is_not_found(&self) -> bool {
      matches!(self, Self::NotFound(_))
   }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// The layered configuration could not be extracted.
   #[error("failed to parse config: {0}")]
   Parse(#[from] Box<figment::Error>),

   /// A setting is out of range or missing.
   #[error("invalid config: {0}")]
   Invalid(String),
}

/// Errors that abort repository backend startup.
///
/// Only the empty-remote case is recovered automatically; everything that
/// reaches this enum is fatal for the backend.
#[derive(Debug, Error)]
pub enum BootstrapError {
   /// Opening an existing working tree failed.
   #[error("failed to open working tree {path}: {source}", path = path.display())]
   Open {
      path:   PathBuf,
      #[source]
      source: git2::Error,
   },

   /// `workdir` holds files but no repository; nothing is cloned into it.
   #[error("{path} is not empty and not a git repository", path = path.display())]
   Occupied { path: PathBuf },

   /// Cloning the remote failed for a reason other than an empty remote.
   #[error("failed to clone {url}: {source}")]
   Clone {
      url:    String,
      #[source]
      source: git2::Error,
   },

   /// Seeding an empty remote from a fresh local repository failed.
   #[error("failed to initialize repository: {0}")]
   Init(#[source] Box<Error>),

   /// The configured branch could not be checked out.
   #[error("failed to check out branch: {0}")]
   Checkout(#[source] Box<Error>),

   /// The initial pull failed.
   #[error("failed to pull: {0}")]
   Pull(#[source] Box<Error>),

   /// Local and remote history have diverged.
   #[error("local branch {branch} cannot be fast-forwarded to the remote")]
   Diverged { branch: String },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
