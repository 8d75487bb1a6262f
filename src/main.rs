//! ocr-worker - command line front end
//!
//! Manages the worker configuration file and the trained-model cache. The
//! recognition engine itself is embedded through the library API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ocr_worker::config::{load_config, save_config, WorkerConfig};
use ocr_worker::vision::{DownloadProgressCallback, ModelStore};

/// ocr-worker - OCR engine worker tools
#[derive(Parser, Debug)]
#[command(name = "ocr-worker")]
#[command(about = "Configuration and model cache tools for the OCR worker")]
struct Args {
    /// Path to the configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage cached trained models
    #[command(subcommand)]
    Models(ModelsCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file location
    Path,
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// List cached models
    List,
    /// Download a model into the cache
    Fetch {
        name: String,
        url: String,
        /// Expected SHA-256 of the download
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Copy a local model file into the cache
    Import { name: String, file: PathBuf },
    /// Delete a cached model
    Remove { name: String },
    /// Print the model cache directory
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => ocr_worker::storage::default_config_path()?,
    };

    match args.command {
        Command::Config(command) => run_config(command, &config_path),
        Command::Models(command) => {
            let config = effective_config(&config_path)?;
            run_models(command, &config).await
        }
    }
}

/// Load the configuration file, falling back to defaults when it is missing
fn effective_config(path: &Path) -> Result<WorkerConfig> {
    if path.is_file() {
        load_config(path)
    } else {
        info!("No config at {:?}, using defaults", path);
        Ok(WorkerConfig::default())
    }
}

fn run_config(command: ConfigCommand, path: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = effective_config(path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("Config already exists at {:?} (use --force to overwrite)", path);
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            save_config(&WorkerConfig::default(), path)?;
            info!("Wrote default config to {:?}", path);
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}

async fn run_models(command: ModelsCommand, config: &WorkerConfig) -> Result<()> {
    let store = ModelStore::new(&config.models)?;

    match command {
        ModelsCommand::List => {
            let models = store.list()?;
            if models.is_empty() {
                println!("No cached models in {}", store.models_dir().display());
            }
            for model in models {
                println!(
                    "{:<16} {:>10} bytes  {}  {}",
                    model.name,
                    model.size_bytes,
                    &model.sha256[..model.sha256.len().min(12)],
                    model.source_url.as_deref().unwrap_or("(imported)")
                );
            }
        }
        ModelsCommand::Fetch { name, url, sha256 } => {
            let progress: DownloadProgressCallback = Box::new(|downloaded, total| match total {
                Some(total) if total > 0 => {
                    eprint!("\r{:>3}% ({} / {} bytes)", downloaded * 100 / total, downloaded, total)
                }
                _ => eprint!("\r{} bytes", downloaded),
            });
            let path = store
                .ensure_model(&name, &url, sha256.as_deref(), Some(progress))
                .await?;
            eprintln!();
            println!("{}", path.display());
        }
        ModelsCommand::Import { name, file } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let model = store.import(&name, &bytes)?;
            info!("Imported model '{}' ({} bytes)", model.name, model.size_bytes);
        }
        ModelsCommand::Remove { name } => {
            if !store.remove(&name)? {
                warn!("Model '{}' was not cached", name);
            }
        }
        ModelsCommand::Path => println!("{}", store.models_dir().display()),
    }
    Ok(())
}
