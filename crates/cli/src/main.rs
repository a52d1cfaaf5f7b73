use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// edgeship - provision and publish a static site to the edge
#[derive(Parser)]
#[command(name = "edgeship")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the deployment configuration file
  #[arg(short, long, global = true, default_value = "edgeship.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show what a deployment would change, without touching anything
  Plan,

  /// Reconcile infrastructure resources only (no content, no invalidation)
  Apply,

  /// Run the full pipeline: reconcile, sync content, invalidate
  Deploy {
    /// Emit the run report as JSON on stdout
    #[arg(long)]
    json: bool,
  },

  /// Show the current remote state of the site's resources
  Status,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Plan => cmd::cmd_plan(&cli.config),
    Commands::Apply => cmd::cmd_apply(&cli.config),
    Commands::Deploy { json } => cmd::cmd_deploy(&cli.config, json),
    Commands::Status => cmd::cmd_status(&cli.config),
  }
}
