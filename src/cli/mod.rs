pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::crawler::task::{BackendKind, ProfileKind};
use crate::export::{Column, ExportFormat};
use config::AppConfig;

#[derive(Parser)]
#[command(author, version, about = "Resumable, retryable page harvester", long_about = None)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file to use instead of the default
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct CrawlArgs {
    /// First page URL; later pages derive from it
    pub url: String,

    /// Page retrieval backend
    #[arg(short, long, value_enum, default_value_t = BackendKind::Http)]
    pub backend: BackendKind,

    /// Extraction profile
    #[arg(short, long, value_enum, default_value_t = ProfileKind::Generic)]
    pub profile: ProfileKind,

    /// Number of pages to crawl
    #[arg(short = 'n', long, default_value_t = 5)]
    pub pages: u32,

    /// Delay between pages in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Skip link extraction
    #[arg(long)]
    pub no_links: bool,

    /// Skip image extraction
    #[arg(long)]
    pub no_images: bool,

    /// Also capture visible page text on each page item
    #[arg(long)]
    pub text: bool,

    /// Skip price extraction
    #[arg(long)]
    pub no_price: bool,

    /// Skip date extraction
    #[arg(long)]
    pub no_date: bool,

    /// Skip description extraction
    #[arg(long)]
    pub no_description: bool,

    /// Save a checkpoint every N pages
    #[arg(long, conflicts_with = "no_checkpoint")]
    pub checkpoint_every: Option<u32>,

    /// Disable automatic checkpointing
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Write collected items to this file when the job ends
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Export format for --output
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// CSV columns to emit, in order
    #[arg(long, value_enum, value_delimiter = ',')]
    pub columns: Vec<Column>,

    /// Alert when an item title contains this keyword (repeatable)
    #[arg(long = "alert-keyword")]
    pub alert_keywords: Vec<String>,

    /// Alert when an item price is at or below this value
    #[arg(long)]
    pub alert_price_below: Option<i64>,

    /// Alert when a price moves at least this many percent between sightings
    #[arg(long)]
    pub alert_price_change: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new crawl
    Crawl(CrawlArgs),

    /// Resume the crawl saved in the checkpoint
    Resume {
        /// Expected base URL; a checkpoint for a different site is refused
        url: Option<String>,

        /// Resume even when the URL does not match the checkpoint
        #[arg(long)]
        ignore_mismatch: bool,

        /// Write collected items to this file when the job ends
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format for --output
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// CSV columns to emit, in order
        #[arg(long, value_enum, value_delimiter = ',')]
        columns: Vec<Column>,
    },

    /// Crawl repeatedly on a fixed interval
    Watch {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Interval between runs, e.g. 90s, 30m or 2h
        #[arg(short, long)]
        every: String,
    },

    /// Export the items stored in the current checkpoint
    Export {
        /// Export format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Output file; defaults to harvest.<ext> in the working directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV columns to emit, in order
        #[arg(long, value_enum, value_delimiter = ',')]
        columns: Vec<Column>,
    },

    /// Inspect or clear the saved checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Show the active configuration
    Config {
        /// Write the default configuration file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print a summary of the saved checkpoint
    Show,
    /// Delete the saved checkpoint
    Clear,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_default()?,
    };

    match cli.command {
        Commands::Crawl(args) => commands::crawl(config, args).await,
        Commands::Resume {
            url,
            ignore_mismatch,
            output,
            format,
            columns,
        } => commands::resume(config, url, ignore_mismatch, output, format, columns).await,
        Commands::Watch { crawl, every } => commands::watch(config, crawl, &every).await,
        Commands::Export {
            format,
            output,
            columns,
        } => commands::export(config, format, output, columns),
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Show => commands::show_checkpoint(config),
            CheckpointAction::Clear => commands::clear_checkpoint(config),
        },
        Commands::Config { init } => commands::show_config(config, init),
    }
}
