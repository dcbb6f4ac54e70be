mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use k3sflow_cloud::DEFAULT_OUT_DIR;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "k3sflow")]
#[command(about = "Declare a k3s cluster on AWS and synthesize its CloudFormation templates", long_about = None)]
struct Cli {
    /// Cluster file (skips discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize stacks into a cloud assembly directory
    Synth {
        /// Stacks to synthesize (all when omitted)
        stacks: Vec<String>,
        /// Do not pull in dependencies of the selected stacks
        #[arg(short, long)]
        exclusively: bool,
        /// Assembly directory
        #[arg(short, long, default_value = DEFAULT_OUT_DIR)]
        output: PathBuf,
        /// Print templates instead of writing the assembly
        #[arg(long)]
        stdout: bool,
    },
    /// Show what changed since the last synthesis
    Diff {
        /// Assembly directory holding the previous synthesis
        #[arg(short, long, default_value = DEFAULT_OUT_DIR)]
        output: PathBuf,
    },
    /// List stacks in deployment order
    List,
    /// Check the cluster file and synthesize in memory
    Validate,
    /// Show version
    Version,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Version => {
            println!("k3sflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Synth {
            stacks,
            exclusively,
            output,
            stdout,
        } => {
            let ctx = commands::Context::load(config_path)?;
            commands::synth::handle(&ctx, &stacks, exclusively, &output, stdout).await
        }
        Commands::Diff { output } => {
            let ctx = commands::Context::load(config_path)?;
            commands::diff::handle(&ctx, &output).await
        }
        Commands::List => {
            let ctx = commands::Context::load(config_path)?;
            commands::list::handle(ctx)
        }
        Commands::Validate => {
            let ctx = commands::Context::load(config_path)?;
            commands::validate::handle(&ctx)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
        for cause in e.chain().skip(1) {
            eprintln!("  {}", cause);
        }
        std::process::exit(1);
    }
}
