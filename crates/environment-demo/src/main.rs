//! env-demo - start and stop a declared service environment

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use environment_config::{EnvironmentConfig, parser};
use environment_demo::{demo_config, demo_registry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "env-demo")]
#[command(about = "Start and stop a dependency-ordered service environment")]
#[command(version)]
struct Cli {
    /// Log filter, overrides RUST_LOG (e.g. "debug" or "service_environment=debug")
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an environment, print its catalog and stop it again
    Run {
        /// Environment file; the built-in demo environment when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds to keep the environment up before stopping it
        #[arg(long, default_value = "0")]
        hold_secs: u64,
    },

    /// Check an environment file without starting anything
    Validate {
        /// Environment file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    smol::block_on(async move {
        match cli.command {
            Commands::Run { config, hold_secs } => run(config.as_deref(), hold_secs).await,
            Commands::Validate { config } => validate(&config),
        }
    })
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn load(config: Option<&Path>) -> Result<EnvironmentConfig> {
    match config {
        Some(path) => {
            info!("Loading environment from: {}", path.display());
            parser::parse_file(path).context("Failed to parse configuration")
        }
        None => {
            info!("Using the built-in demo environment");
            Ok(demo_config())
        }
    }
}

async fn run(config: Option<&Path>, hold_secs: u64) -> Result<()> {
    let config = load(config)?;
    let mut env = demo_registry()
        .build_environment(&config)
        .context("Failed to build environment")?;

    let ctx = env.start().await.context("Failed to start environment")?;
    println!("Environment '{}' is up:", env.name());
    for metadata in ctx.catalog().values() {
        println!("  {}", metadata);
    }

    if hold_secs > 0 {
        info!("Holding environment for {}s", hold_secs);
        smol::Timer::after(Duration::from_secs(hold_secs)).await;
    }

    env.stop().await.context("Failed to stop environment")?;
    println!("Environment '{}' stopped", env.name());
    Ok(())
}

fn validate(config: &Path) -> Result<()> {
    let config = parser::parse_file(config).context("Failed to parse configuration")?;
    let env = demo_registry()
        .build_environment(&config)
        .context("Invalid environment")?;

    println!("Environment '{}' is valid:", env.name());
    for id in env.service_ids() {
        let Some(decl) = config.services.get(&id) else {
            continue;
        };
        if decl.depends_on.is_empty() {
            println!("  {} ({})", id, decl.kind);
        } else {
            println!("  {} ({}) <- {}", id, decl.kind, decl.depends_on.join(", "));
        }
    }
    Ok(())
}
