//! Content-addressable file store with a local backend and a git-replicated
//! write-behind backend.

pub mod backend;
pub mod catalog;
pub mod cmd;
pub mod config;
pub mod error;
pub mod hash;
pub mod meta;
pub mod pipeline;
pub mod record;
pub mod repo;
pub mod upload;

pub use error::{Error, Result};
