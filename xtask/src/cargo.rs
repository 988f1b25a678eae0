//! Running cargo as a child process

use anyhow::{Context, Result};
use futures::io::{AsyncBufReadExt, BufReader};
use futures::StreamExt;
use smol::process::{Command, Stdio};

/// Outcome of one cargo invocation
pub struct CargoRun {
    pub success: bool,
    /// Stdout lines, collected when capturing
    pub stdout: Vec<String>,
}

/// Run `cargo <args>` with inherited output
pub async fn run(args: &[&str]) -> Result<CargoRun> {
    println!("$ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .await
        .with_context(|| format!("Failed to launch cargo {}", args.join(" ")))?;

    Ok(CargoRun {
        success: status.success(),
        stdout: Vec::new(),
    })
}

/// Run `cargo <args>`, echoing stdout while keeping a copy for parsing
pub async fn run_captured(args: &[&str]) -> Result<CargoRun> {
    println!("$ cargo {}", args.join(" "));
    let mut child = Command::new("cargo")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to launch cargo {}", args.join(" ")))?;

    let mut stdout = Vec::new();
    if let Some(out) = child.stdout.take() {
        let mut lines = BufReader::new(out).lines();
        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read cargo output")?;
            println!("{}", line);
            stdout.push(line);
        }
    }

    let status = child.status().await?;
    Ok(CargoRun {
        success: status.success(),
        stdout,
    })
}

/// Whether a cargo subcommand is installed
pub async fn has_subcommand(name: &str) -> bool {
    Command::new("cargo")
        .args([name, "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
