//! actorcore - CLI

use actorcore::util::config::{load_config, RuntimeConfig};
use actorcore::util::logger::{self, LogLevel};
use actorcore::{run_demo, NAME, VERSION};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Actor-based concurrency core
#[derive(Parser, Debug)]
#[command(name = "actorcore")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Runtime config file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a counter workload over a pool and print its statistics
    Demo {
        /// Number of actors
        #[arg(short, long, default_value_t = 4)]
        actors: usize,

        /// Messages sent to each actor
        #[arg(short, long, default_value_t = 1000)]
        messages: usize,

        /// Override pool.max_threads
        #[arg(short = 't', long)]
        max_threads: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Print version information
    Version,
}

fn load(args: &Args) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid environment override")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load(&args)?;

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log.level
    };
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Demo {
            actors,
            messages,
            max_threads,
        } => {
            if let Some(max_threads) = max_threads {
                config.pool.max_threads = max_threads;
            }
            let stats = run_demo(config.pool, actors, messages).context("Demo failed")?;
            println!("{}", stats);
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
