use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use propmedia_core::Config;
use propmedia_infra::{init_telemetry, shutdown_telemetry, LogFormat};
use propmedia_processing::PipelineStep;
use propmedia_worker::{run_step, step::runner_from_env, Runtime};

#[derive(Parser)]
#[command(name = "propmedia-worker", about = "Listing media processing runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume workflow callbacks and run the reconciler and retention loops
    Serve,
    /// Run one pipeline step: event JSON on stdin, result JSON on stdout
    Step {
        /// validate, thumbnails, video-thumbnails, consolidate or zip
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry("propmedia-worker", LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    match cli.command {
        Commands::Serve => serve().await,
        Commands::Step { name } => {
            let step: PipelineStep = name.parse()?;
            let runner = runner_from_env().await?;
            run_step(&runner, step, tokio::io::stdin(), tokio::io::stdout()).await
        }
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let runtime = Runtime::connect(&config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal.cancel();
    });

    let result = runtime.run(shutdown).await;
    shutdown_telemetry().await;
    result
}
