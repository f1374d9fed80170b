use clap::{Parser, Subcommand};

mod commands;

use commands::{AurocArgs, OperatingPointsArgs, ShowConfigArgs};

#[derive(Parser)]
#[command(name = "sepsis3")]
#[command(
    about = "Evaluate sepsis criteria (SIRS, qSOFA, SOFA, Sepsis-3) against a reference outcome",
    long_about = None
)]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sensitivity, specificity, PPV, NPV with intervals for each predictor
    OperatingPoints(OperatingPointsArgs),
    /// AUROC per score and pairwise comparison p-values
    Auroc(AurocArgs),
    /// Print the merged configuration
    ShowConfig(ShowConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reports go to stdout, logs to stderr or the log file
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    match cli.command {
        Commands::OperatingPoints(args) => commands::run_operating_points(args)?,
        Commands::Auroc(args) => commands::run_auroc(args)?,
        Commands::ShowConfig(args) => commands::run_show_config(args)?,
    }

    Ok(())
}
