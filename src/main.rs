use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "solcover")]
#[command(version, about = "Coverage orchestrator for Solidity projects")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Config file to use instead of .solcover/solcover.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .solcover/ with a default solcover.toml
    Init,
    /// Instrument sources, run the generate and test stages, and merge hit counts
    Run {
        /// Per-stage timeout in seconds (0 waits forever)
        #[arg(long, env = "SOLCOVER_STAGE_TIMEOUT")]
        timeout: Option<u64>,

        /// Where to write merged coverage data
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Instrumenter command implementing the JSON protocol
        #[arg(long, env = "SOLCOVER_INSTRUMENTER")]
        instrumenter: Option<String>,
    },
    /// Show which files would be instrumented and which passed through
    Select,
    /// Delete shadow files left under the configured roots
    Clean {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    solcover::logging::init_tracing(cli.verbose);

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            solcover::ui::print_failure(&e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run {
            timeout,
            output,
            instrumenter,
        } => {
            cmd::cmd_run(
                cli,
                &project_dir,
                *timeout,
                output.clone(),
                instrumenter.clone(),
            )
            .await?
        }
        Commands::Select => cmd::cmd_select(cli, &project_dir)?,
        Commands::Clean { force } => cmd::cmd_clean(cli, &project_dir, *force)?,
    }

    Ok(())
}
