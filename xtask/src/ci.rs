use crate::cargo;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct CiArgs {
    #[command(subcommand)]
    command: CiCommand,
}

#[derive(Subcommand)]
enum CiCommand {
    /// Run all CI checks
    All,
    /// Check code formatting
    FmtCheck,
    /// Run clippy lints
    Clippy,
    /// Run cargo deny checks
    Deny,
    /// Build service-environment on the tokio spawner
    Runtimes,
    /// Run unit tests
    UnitTests,
    /// Run integration tests
    IntegrationTests,
}

pub async fn run(args: CiArgs) -> Result<()> {
    match args.command {
        CiCommand::All => run_all_checks().await,
        CiCommand::FmtCheck => fmt_check().await,
        CiCommand::Clippy => clippy().await,
        CiCommand::Deny => deny().await,
        CiCommand::Runtimes => runtimes().await,
        CiCommand::UnitTests => unit_tests().await,
        CiCommand::IntegrationTests => integration_tests().await,
    }
}

async fn run_all_checks() -> Result<()> {
    println!("Running all CI checks...\n");

    fmt_check().await?;
    clippy().await?;
    deny().await?;
    runtimes().await?;
    unit_tests().await?;
    integration_tests().await?;

    println!("\nAll CI checks passed!");
    Ok(())
}

async fn fmt_check() -> Result<()> {
    println!("Checking code formatting...");
    require(&["fmt", "--all", "--", "--check"], "Code formatting issues found").await?;
    println!("Code formatting is correct");
    Ok(())
}

async fn clippy() -> Result<()> {
    println!("Running clippy...");
    require(
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        "Clippy found issues",
    )
    .await?;
    println!("No clippy warnings");
    Ok(())
}

async fn deny() -> Result<()> {
    if !cargo::has_subcommand("deny").await {
        println!("cargo-deny not installed, skipping");
        return Ok(());
    }
    println!("Running cargo deny...");
    require(&["deny", "check"], "cargo deny found issues").await?;
    println!("Dependency checks passed");
    Ok(())
}

async fn runtimes() -> Result<()> {
    println!("Checking the tokio spawner build...");
    require(
        &[
            "check",
            "-p",
            "service-environment",
            "--no-default-features",
            "--features",
            "tokio",
        ],
        "service-environment does not build with --features tokio",
    )
    .await?;
    println!("Runtime feature builds are fine");
    Ok(())
}

async fn unit_tests() -> Result<()> {
    println!("Running unit tests...");
    require(&["test", "--workspace", "--lib", "--bins"], "Unit tests failed").await?;
    println!("Unit tests passed");
    Ok(())
}

async fn integration_tests() -> Result<()> {
    println!("Running integration tests...");
    require(&["test", "--workspace", "--test", "*"], "Integration tests failed").await?;
    println!("Integration tests passed");
    Ok(())
}

async fn require(args: &[&str], failure: &str) -> Result<()> {
    let run = cargo::run(args).await?;
    if !run.success {
        anyhow::bail!("{}", failure);
    }
    Ok(())
}
