mod commands;
mod config;

use crate::config::{CliConfig, load_config, resolve_prompts_file, resolve_usage_db};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exitcode::ExitCode;
use std::io;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use unversion_core::error::{StoreError, UsageError};
use unversion_core::usage::{DEFAULT_RECENT_LIMIT, DEFAULT_TOP_LIMIT};
use unversion_core::{PromptStore, RecentFilter, UsageStore};

#[derive(Parser, Debug)]
#[command(
    version,
    display_name = "unversion",
    bin_name = "unversion",
    about = "Simple prompt versioning for AI applications",
    long_about = "Browse, validate and export a prompts file, and report on prompt usage"
)]
struct Args {
    /// Path to the prompts file
    #[arg(short = 'f', long, global = true)]
    file: Option<PathBuf>,

    /// Path to the usage database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// List all prompts
    List {
        /// Only keys starting with this prefix
        #[arg(long)]
        filter: Option<String>,
        /// Count prompts per key prefix instead of listing them
        #[arg(short = 's', long)]
        stats: bool,
    },
    /// View a prompt
    View { key: String },
    /// Search prompt keys, text and notes
    Search { query: String },
    /// Validate a prompts file
    Validate { path: PathBuf },
    /// Show usage statistics
    Stats {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
        /// Detailed statistics for one prompt
        #[arg(short = 'k', long)]
        key: Option<String>,
    },
    /// Show the most recent usage events
    Recent {
        #[arg(short = 'n', long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        #[arg(short = 'k', long)]
        key: Option<String>,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Export prompts to a new file
    Export {
        output: PathBuf,
        /// Only keys starting with this prefix
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Problem loading config: {}", e);
            std::process::exit(exitcode::CONFIG);
        }
    };

    let code = match run(args, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(args: Args, config: &CliConfig) -> Result<ExitCode> {
    let Args { file, db, cmd } = args;
    let mut out = io::stdout().lock();

    match cmd {
        Commands::List { filter, stats } => with_store(file, config, |store| {
            commands::list(store, filter.as_deref(), stats, &mut out)
        }),
        Commands::View { key } => {
            with_store(file, config, |store| commands::view(store, &key, &mut out))
        }
        Commands::Search { query } => {
            with_store(file, config, |store| commands::search(store, &query, &mut out))
        }
        Commands::Validate { path } => commands::validate(&path, &mut out),
        Commands::Stats { limit, key } => {
            let usage = open_usage(db, config)?;
            commands::stats(&usage, key.as_deref(), limit, &mut out)
        }
        Commands::Recent {
            limit,
            key,
            stage,
            session,
        } => {
            let usage = open_usage(db, config)?;
            let filter = RecentFilter {
                limit,
                prompt_key: key,
                stage,
                session_id: session,
            };
            commands::recent(&usage, &filter, &mut out)
        }
        Commands::Export { output, filter } => with_store(file, config, |store| {
            commands::export(store, &output, filter.as_deref(), &mut out)
        }),
    }
}

/// Resolves and loads the prompts file, then hands the store to `command`.
fn with_store<F>(file: Option<PathBuf>, config: &CliConfig, command: F) -> Result<ExitCode>
where
    F: FnOnce(&PromptStore) -> Result<ExitCode>,
{
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let Some(path) = resolve_prompts_file(file, config, &cwd) else {
        eprintln!("Error: No prompts file found. Use --file to specify path.");
        return Ok(exitcode::NOINPUT);
    };
    debug!(path = %path.display(), "loading prompts");
    let store = commands::load_store(&path)?;
    command(&store)
}

fn open_usage(flag: Option<PathBuf>, config: &CliConfig) -> Result<UsageStore> {
    let path = resolve_usage_db(flag, config)?;
    debug!(path = %path.display(), "opening usage database");
    UsageStore::open(&path)
        .with_context(|| format!("failed to open usage database {}", path.display()))
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if let Some(e) = error.downcast_ref::<io::Error>() {
        return match e.kind() {
            io::ErrorKind::NotFound => exitcode::NOINPUT,
            _ => exitcode::IOERR,
        };
    }
    match error.downcast_ref::<StoreError>() {
        Some(StoreError::Parse(_)) => return exitcode::DATAERR,
        Some(StoreError::Io(_)) => return exitcode::IOERR,
        None => {}
    }
    if error.downcast_ref::<UsageError>().is_some() {
        return exitcode::UNAVAILABLE;
    }
    exitcode::SOFTWARE
}
