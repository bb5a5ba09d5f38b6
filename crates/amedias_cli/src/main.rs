//! A Medias CLI
//!
//! Command-line front end for sharing links, remote shares and backups.
//!
//! # Commands
//!
//! - `share-url` - Build a share link (or a remote share) for a state file
//! - `read` - Decode a share link and print its state
//! - `estimate` - Pre-flight the link size for a state file
//! - `status` - Show sharing status for an address
//! - `export` / `import` - Back up and restore the local snapshot
//! - `clear` - Erase all local data

mod commands;

use amedias_sync_engine::{DEFAULT_TABLE, ENV_API_KEY, ENV_BACKEND_URL, ENV_TABLE};
use clap::{Parser, Subcommand};
use commands::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// A Medias sharing and backup tools.
#[derive(Parser)]
#[command(name = "amedias")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local store (in memory if omitted)
    #[arg(global = true, short, long, env = "AMEDIAS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Application address share links are built on
    #[arg(
        global = true,
        long,
        env = "AMEDIAS_BASE_URL",
        default_value = "https://amedias.app/"
    )]
    base_url: String,

    /// Remote backend address
    #[arg(global = true, long, env = ENV_BACKEND_URL)]
    backend_url: Option<String>,

    /// Remote backend API key
    #[arg(global = true, long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Remote table holding one row per share
    #[arg(global = true, long, env = ENV_TABLE, default_value = DEFAULT_TABLE)]
    table: String,

    /// Never compress link payloads
    #[arg(global = true, long)]
    no_compression: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a share link for a state file
    ShareUrl {
        /// JSON file holding the state
        file: PathBuf,

        /// Share through the remote backend instead of the link itself
        #[arg(short, long)]
        remote: bool,

        /// QR image size in pixels
        #[arg(long)]
        qr_size: Option<u32>,
    },

    /// Decode a share link and print its state
    Read {
        /// The share link
        url: String,

        /// Also adopt the state into the local store
        #[arg(short, long)]
        save: bool,
    },

    /// Estimate the link size for a state file
    Estimate {
        /// JSON file holding the state
        file: PathBuf,
    },

    /// Show sharing status
    Status {
        /// Address to start from (defaults to the base address)
        #[arg(short, long)]
        address: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a backup of the local snapshot
    Export {
        /// Output file (defaults to a dated name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the local snapshot with a backup
    Import {
        /// Backup file
        file: PathBuf,
    },

    /// Erase all local data
    Clear {
        /// Confirm the erase
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings {
        data_dir: cli.data_dir,
        base_url: cli.base_url,
        backend_url: cli.backend_url.unwrap_or_default(),
        api_key: cli.api_key.unwrap_or_default(),
        table: cli.table,
        compress: !cli.no_compression,
    };

    match cli.command {
        Commands::ShareUrl {
            file,
            remote,
            qr_size,
        } => commands::share::create(&settings, &file, remote, qr_size).await?,
        Commands::Read { url, save } => commands::share::read(&settings, &url, save).await?,
        Commands::Estimate { file } => commands::share::estimate(&settings, &file).await?,
        Commands::Status { address, format } => {
            commands::status::run(&settings, address.as_deref(), &format).await?
        }
        Commands::Export { output } => commands::backup::export(&settings, output).await?,
        Commands::Import { file } => commands::backup::import(&settings, &file).await?,
        Commands::Clear { yes } => {
            if !yes {
                return Err("refusing to erase all data without --yes".into());
            }
            commands::backup::clear(&settings).await?
        }
        Commands::Version => {
            println!("A Medias CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Snapshot format v{}", amedias_core::DATA_VERSION);
        }
    }

    Ok(())
}
