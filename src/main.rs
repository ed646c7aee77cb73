use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mapstore::{
   Result,
   cmd::{self, put::PutOptions},
   hash::ContentHash,
   record::{DEFAULT_LIMIT, ListQuery, OrderField},
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the mapstore application
#[derive(Parser)]
#[command(name = "mapstore")]
#[command(about = "Content-addressable file store with git replication")]
#[command(version)]
struct Cli {
   #[arg(
      long,
      global = true,
      env = "MAPSTORE_CONFIG",
      help = "Config file (default: ~/.mapstore/config.toml)"
   )]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for mapstore
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Write a config file with every default")]
   InitConfig {
      #[arg(help = "Destination (default: ~/.mapstore/config.toml)")]
      path: Option<PathBuf>,

      #[arg(long, help = "Overwrite an existing file")]
      force: bool,
   },

   #[command(about = "Upload a file")]
   Put {
      #[arg(help = "File to upload")]
      file: PathBuf,

      #[arg(long, help = "Stored name (default: file stem)")]
      name: Option<String>,

      #[arg(long, help = "Expected sha256 of the content")]
      sha256: Option<String>,

      #[arg(long, help = "Hash of the previous version")]
      prev: Option<ContentHash>,

      #[arg(short = 'm', long, default_value = "", help = "Version message")]
      message: String,

      #[arg(long, default_value = "", help = "Authors of this version")]
      author: String,

      #[arg(long, value_name = "SECS", help = "Wait up to SECS for a terminal status")]
      wait: Option<u64>,
   },

   #[command(about = "Show the metadata record for a hash")]
   Meta {
      hash: ContentHash,
   },

   #[command(about = "Show the version chain ending at a hash")]
   History {
      hash: ContentHash,

      #[arg(short = 'n', long, default_value = "0", help = "Maximum versions (0 = all)")]
      limit: usize,
   },

   #[command(about = "Search records by name")]
   Search {
      pattern: String,

      #[arg(long, help = "Match the whole name")]
      exact: bool,

      #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
      limit: usize,
   },

   #[command(about = "List records page by page")]
   List {
      #[arg(long, default_value = "1", help = "1-based page number")]
      page: usize,

      #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
      limit: usize,

      #[arg(long, help = "Descending order")]
      desc: bool,

      #[arg(long, default_value = "create_time", help = "hash, name, size or create_time")]
      order: OrderField,
   },

   #[command(about = "Delete a record (and the file, for the local backend)")]
   Delete {
      hash: ContentHash,
   },

   #[command(about = "Copy stored bytes to a file (local backend only)")]
   Get {
      hash: ContentHash,

      out: PathBuf,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_writer(std::io::stderr)
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let config = cli.config.as_deref();
   match cli.command {
      Cmd::InitConfig { path, force } => {
         cmd::init_config::execute(path.or_else(|| cli.config.clone()), force)
      },
      Cmd::Put { file, name, sha256, prev, message, author, wait } => {
         let opts = PutOptions { name, sha256, prev, message, author, wait };
         cmd::put::execute(file, opts, config).await
      },
      Cmd::Meta { hash } => cmd::meta::execute(hash, config).await,
      Cmd::History { hash, limit } => cmd::history::execute(hash, limit, config).await,
      Cmd::Search { pattern, exact, limit } => {
         cmd::search::execute(pattern, exact, limit, config).await
      },
      Cmd::List { page, limit, desc, order } => {
         cmd::list::execute(ListQuery { page, desc, order, limit }, config).await
      },
      Cmd::Delete { hash } => cmd::delete::execute(hash, config).await,
      Cmd::Get { hash, out } => cmd::get::execute(hash, out, config).await,
   }
}
