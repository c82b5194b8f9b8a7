use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "urlc", about = "URLc: content-addressed URL shortener", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Prefix of rendered short URLs
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Use the append-only file backend at this path
    #[arg(long, global = true)]
    pub file_storage_path: Option<PathBuf>,

    /// Use the SQL backend with this DSN, e.g. sqlite://urls.db
    #[arg(long, global = true)]
    pub database_dsn: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Shorten a URL
    Shorten(ShortenArgs),
    /// Shorten every entry of a JSON batch file
    ShortenBatch(ShortenBatchArgs),
    /// Print the original URL behind a short id
    Resolve(ResolveArgs),
    /// List the live URLs of an owner
    List(ListArgs),
    /// Tombstone short ids owned by an owner
    Delete(DeleteArgs),
    /// Show URL and user counts
    Stats,
    /// Check that the storage backend is reachable
    Ping,
}

#[derive(Args, Debug)]
pub struct ShortenArgs {
    pub url: String,
    #[arg(long, default_value = "")]
    pub owner: String,
}

#[derive(Args, Debug)]
pub struct ShortenBatchArgs {
    /// JSON array of {"correlation_id", "original_url"} objects
    pub file: PathBuf,
    #[arg(long, default_value = "")]
    pub owner: String,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub short_id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub owner: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(required = true)]
    pub ids: Vec<String>,
    #[arg(long)]
    pub owner: String,
}
