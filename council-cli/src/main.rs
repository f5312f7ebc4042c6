//! Council CLI - Command line interface for Council
//!
//! Multi-reviewer code review and fix loops with Claude Code.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use council_core::config::CliOverrides;
use council_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ApplyArgs, FixArgs, PlanArgs, ReviewArgs};

/// Council: a panel of reviewers that converge on clean code
#[derive(Parser, Debug)]
#[command(name = "council")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/council/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to claude executable (overrides config and env)
    #[arg(long, global = true)]
    claude_path: Option<String>,

    /// Model to use (overrides config and env)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Budget cap in units (overrides config and env)
    #[arg(long, global = true)]
    budget: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the council over files
    #[command(visible_alias = "r")]
    Review(ReviewArgs),

    /// Review and fix until the council converges
    #[command(visible_alias = "f")]
    Fix(FixArgs),

    /// Review once and queue one correction per issue
    Plan(PlanArgs),

    /// Apply queued corrections, validating each one
    Apply(ApplyArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let overrides = CliOverrides {
        claude_path: cli.claude_path.clone(),
        model: cli.model.clone(),
        budget: cli.budget,
    };
    let config = Config::load_with_overrides(cli.config.as_deref(), overrides)?;

    tracing::debug!(
        claude_path = %config.agent.claude_path,
        model = ?config.agent.model,
        budget = config.budget.cap_units,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Version) => {
            println!("council {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Review(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Fix(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Plan(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Apply(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Config) => {
            print_config(&config, cli.config.as_deref());
        }
        None => {
            println!("Council - Multi-reviewer code review and fix loops");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, explicit: Option<&std::path::Path>) {
    println!("Council Configuration");
    println!("=====================");
    println!();
    println!("Agent Settings:");
    println!("  claude_path: {}", config.agent.claude_path);
    println!("  model: {}", config.agent.model.as_deref().unwrap_or("(default)"));
    println!("  timeout: {}", format_timeout(config.agent.timeout));
    println!();
    println!("Review Settings:");
    println!("  parallel: {}", config.review.parallel);
    println!("  max_iterations: {}", config.review.max_iterations);
    for persona in council_core::Persona::ALL {
        println!(
            "  {}: {}",
            persona.name(),
            if config.review.is_enabled(persona.name()) { "enabled" } else { "disabled" }
        );
    }
    println!();
    println!("Fix Settings:");
    println!("  max_iterations: {}", config.fix.max_iterations);
    println!("  dry_run: {}", config.fix.dry_run);
    println!("  queue_dir: {}", config.fix.queue_dir.display());
    println!();
    println!("Validation Settings:");
    for (name, stage) in [
        ("lint", &config.validation.lint),
        ("build", &config.validation.build),
        ("test", &config.validation.test),
    ] {
        let command = match (&stage.command, stage.enabled) {
            (_, false) => "(disabled)".to_string(),
            (Some(cmd), true) => cmd.join(" "),
            (None, true) => "(detected)".to_string(),
        };
        println!("  {}: {}", name, command);
    }
    println!("  timeout: {}", format_timeout(config.validation.timeout));
    println!();
    println!("Budget: {} units", config.budget.cap_units);
    println!();

    let path = explicit.map(|p| p.to_path_buf()).or_else(Config::default_config_path);
    if let Some(path) = path {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}

fn format_timeout(timeout: Option<std::time::Duration>) -> String {
    match timeout {
        Some(t) => council_core::progress::format_duration(t),
        None => "(none)".to_string(),
    }
}
