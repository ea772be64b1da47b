//! Semantic Lens CLI - checks whether a text description matches an image.
//!
//! The image is captioned with BLIP and scored against both the description
//! and that caption with CLIP; the scores become a verdict.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode
//! semlens
//!
//! # Check one pair
//! semlens check cat.jpg "a cat sleeping on a sofa"
//!
//! # Check a manifest of pairs
//! semlens batch pairs.jsonl --output results.jsonl
//!
//! # Manage models
//! semlens models download
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};

mod cli;
mod logging;

/// Semantic Lens - image-text consistency checks with BLIP captions and CLIP scores.
#[derive(Parser, Debug)]
#[command(name = "semlens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "SEMLENS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a description matches an image
    Check(cli::check::CheckArgs),

    /// Check every image-text pair in a JSON Lines manifest
    Batch(cli::batch::BatchArgs),

    /// Manage models (download, list, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

/// Load the config at `path`, falling back to defaults with a warning.
///
/// Logging isn't initialized yet, so warnings go straight to stderr.
fn load_config(path: &std::path::Path) -> semlens_core::Config {
    if !path.exists() {
        return semlens_core::Config::default();
    }
    match semlens_core::Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `semlens config path`."
            );
            semlens_core::Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(semlens_core::Config::default_path);
    let config = load_config(&config_path);
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Semantic Lens v{}", semlens_core::VERSION);

    match cli.command {
        Some(Commands::Check(args)) => cli::check::execute(args, config).await,
        Some(Commands::Batch(args)) => cli::batch::execute(args, config).await,
        Some(Commands::Models(args)) => cli::models::execute(args, config).await,
        Some(Commands::Config(args)) => cli::config::execute(args, &config, config_path).await,
        None if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() => {
            cli::interactive::run(config, &config_path).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
