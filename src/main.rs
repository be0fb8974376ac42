use app_use::agent::agent_model::LoopState;
use app_use::cli::commands::{cmd_run, cmd_snapshot};
use app_use::cli::config::{Cli, Commands, load_config};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run { task, max_steps } => {
            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    on_ctrl_c.cancel();
                }
            });

            let report = cmd_run(
                &task,
                max_steps,
                &config,
                cli.ollama_endpoint.as_deref(),
                cli.ollama_model.as_deref(),
                cancel,
            )
            .await?;

            match report.state {
                LoopState::Succeeded { .. } => {}
                LoopState::Cancelled => std::process::exit(130),
                _ => std::process::exit(1),
            }
        }
        Commands::Snapshot { format } => {
            cmd_snapshot(&config, format).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
