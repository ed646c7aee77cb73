//! Configuration management for backend selection, metadata and repository
//! settings.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   error::{ConfigError, Result},
   record::BackendKind,
};

pub const ENV_PREFIX: &str = "MAPSTORE_";

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub storage: StorageConfig,
   pub db:      DbConfig,
   pub local:   LocalConfig,
   pub repo:    RepoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
   pub kind: BackendKind,
}

impl Default for StorageConfig {
   fn default() -> Self {
      Self { kind: BackendKind::Local }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
   /// JSON document holding the metadata records.
   pub path: PathBuf,
}

impl Default for DbConfig {
   fn default() -> Self {
      Self { path: PathBuf::from("file_meta.json") }
   }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
   pub path: PathBuf,
}

impl Default for LocalConfig {
   fn default() -> Self {
      Self { path: PathBuf::from("./uploads") }
   }
}

/// Settings for the git-replicated backend and its write-behind pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
   pub workdir:           PathBuf,
   pub remote_url:        String,
   pub remote_name:       String,
   pub branch:            String,
   pub write_workers:     usize,
   pub max_batch_files:   usize,
   pub batch_window_secs: u64,
   pub commit_author:     String,
   pub commit_email:      String,
   pub init_file_name:    String,
   pub init_file_content: String,
   pub file_extension:    String,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub ssh_key_path:      Option<PathBuf>,
}

impl Default for RepoConfig {
   fn default() -> Self {
      Self {
         workdir:           PathBuf::from("./git_storage_repo"),
         remote_url:        String::new(),
         remote_name:       "origin".to_string(),
         branch:            "master".to_string(),
         write_workers:     4,
         max_batch_files:   50,
         batch_window_secs: 5,
         commit_author:     "RepoBot".to_string(),
         commit_email:      "RepoBot@example.com".to_string(),
         init_file_name:    "Placeholder".to_string(),
         init_file_content: "Placeholder".to_string(),
         file_extension:    "map".to_string(),
         ssh_key_path:      None,
      }
   }
}

impl RepoConfig {
   pub const fn batch_window(&self) -> Duration {
      Duration::from_secs(self.batch_window_secs)
   }

   pub fn branch_ref(&self) -> String {
      format!("refs/heads/{}", self.branch)
   }

   pub fn validate(&self) -> Result<()> {
      if self.remote_url.trim().is_empty() {
         return Err(invalid("repo.remote_url must be set for the repo backend"));
      }
      if self.write_workers == 0 {
         return Err(invalid("repo.write_workers must be at least 1"));
      }
      if self.max_batch_files == 0 {
         return Err(invalid("repo.max_batch_files must be at least 1"));
      }
      if self.file_extension.trim_start_matches('.').is_empty() {
         return Err(invalid("repo.file_extension must not be empty"));
      }
      if self.branch.trim().is_empty() || self.remote_name.trim().is_empty() {
         return Err(invalid("repo.branch and repo.remote_name must not be empty"));
      }
      if self.init_file_name.trim().is_empty() {
         return Err(invalid("repo.init_file_name must not be empty"));
      }
      Ok(())
   }
}

fn invalid(msg: &str) -> crate::Error {
   ConfigError::Invalid(msg.to_string()).into()
}

impl Config {
   /// Loads defaults, then the given file (or the global config file), then
   /// `MAPSTORE_*` environment overrides. Nested keys use `__`, e.g.
   /// `MAPSTORE_REPO__REMOTE_URL`.
   pub fn load(path: Option<&Path>) -> Result<Self> {
      let config_path = match path {
         Some(p) => p.to_path_buf(),
         None => ensure_global_config()?,
      };
      Self::figment(&config_path)
         .extract()
         .map_err(|e| ConfigError::Parse(Box::new(e)).into())
   }

   fn figment(config_path: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed(ENV_PREFIX).split("__"))
   }

   pub fn validate(&self) -> Result<()> {
      match self.storage.kind {
         BackendKind::Repo => self.repo.validate(),
         BackendKind::Local => Ok(()),
      }
   }

   pub fn to_toml(&self) -> Result<String> {
      Ok(toml::to_string_pretty(self)?)
   }
}

/// Writes the default configuration to `path`.
pub fn write_default_config(path: &Path) -> Result<()> {
   tracing::info!("writing default config to {}", path.display());
   if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
   {
      fs::create_dir_all(parent)?;
   }
   fs::write(path, Config::default().to_toml()?)?;
   Ok(())
}

/// Returns the base directory for mapstore configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".mapstore"))
}

pub fn config_file_path() -> PathBuf {
   base_dir().join("config.toml")
}

fn ensure_global_config() -> Result<PathBuf> {
   let config_path = config_file_path();
   if !config_path.exists() {
      write_default_config(&config_path)?;
   }
   Ok(config_path)
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn defaults_match_documented_values() {
      let cfg = Config::default();
      assert_eq!(cfg.storage.kind, BackendKind::Local);
      assert_eq!(cfg.repo.write_workers, 4);
      assert_eq!(cfg.repo.max_batch_files, 50);
      assert_eq!(cfg.repo.batch_window(), Duration::from_secs(5));
      assert_eq!(cfg.repo.branch_ref(), "refs/heads/master");
   }

   #[test]
   fn toml_file_overrides_defaults() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("mapstore.toml");
      fs::write(
         &path,
         "[storage]\nkind = \"repo\"\n\n[repo]\nremote_url = \"/tmp/remote.git\"\n\
          max_batch_files = 3\n",
      )
      .unwrap();

      let cfg = Config::load(Some(&path)).unwrap();
      assert_eq!(cfg.storage.kind, BackendKind::Repo);
      assert_eq!(cfg.repo.remote_url, "/tmp/remote.git");
      assert_eq!(cfg.repo.max_batch_files, 3);
      assert_eq!(cfg.repo.write_workers, 4);
      cfg.validate().unwrap();
   }

   #[test]
   fn default_config_round_trips_through_file() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("nested").join("config.toml");
      write_default_config(&path).unwrap();
      let cfg = Config::load(Some(&path)).unwrap();
      assert_eq!(cfg.repo.commit_author, "RepoBot");
      assert_eq!(cfg.local.path, PathBuf::from("./uploads"));
   }

   #[test]
   fn repo_validation_rejects_bad_values() {
      let mut cfg = Config::default();
      cfg.storage.kind = BackendKind::Repo;
      assert!(cfg.validate().is_err());

      cfg.repo.remote_url = "git@example.com:maps.git".to_string();
      cfg.validate().unwrap();

      cfg.repo.write_workers = 0;
      assert!(cfg.validate().is_err());
      cfg.repo.write_workers = 2;
      cfg.repo.max_batch_files = 0;
      assert!(cfg.validate().is_err());
   }
}
