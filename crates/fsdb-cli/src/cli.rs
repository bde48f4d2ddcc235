use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fsdb",
    about = "fsdb -- path escaping, index files and connection config",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

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

#[derive(Subcommand)]
pub enum Command {
    /// Escape a raw string into a single path segment
    Escape(SegmentArgs),
    /// Recover the raw string from an escaped path segment
    Unescape(SegmentArgs),
    /// Inspect or edit an index definition file
    Indexes(IndexesArgs),
    /// Inspect a connection config file
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct SegmentArgs {
    pub value: String,
}

#[derive(Args)]
pub struct IndexesArgs {
    /// Index definition file
    #[arg(short, long, default_value = "firestore.indexes.json")]
    pub file: PathBuf,

    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand)]
pub enum IndexAction {
    /// List the indexes and field overrides in the file
    Show,
    /// Add a composite index; fields are `path:asc`, `path:desc` or `path:contains`
    Add(IndexSpecArgs),
    /// Remove every index equal to the one described
    Remove(IndexSpecArgs),
    /// Check every definition in the file
    Validate,
}

#[derive(Args)]
pub struct IndexSpecArgs {
    pub collection_group: String,
    #[arg(required = true, num_args = 1..)]
    pub fields: Vec<String>,
    /// Serve every collection with this id, not just one
    #[arg(long)]
    pub group: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config with defaults filled in
    Show { path: PathBuf },
    /// Load and validate the config
    Check { path: PathBuf },
}
