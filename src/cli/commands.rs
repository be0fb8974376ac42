use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::agent_model::{LoopState, RunReport};
use crate::agent::controller::AgentLoop;
use crate::agent::decision::OllamaDecisionMaker;
use crate::agent::memory::InMemoryStore;
use crate::cli::config::{AppConfig, SnapshotFormat};
use crate::driver::bridge::BridgeDriver;
use crate::snapshot::builder::SnapshotBuilder;
use crate::snapshot::render::describe_screen;
use crate::trace::logger::{ChannelSink, TraceLogger};
use crate::trace::trace::{LoopEvent, TraceEvent};

// ============================================================================
// run subcommand
// ============================================================================

/// Run the agent loop for one task and return the final report.
pub async fn cmd_run(
    task: &str,
    max_steps: Option<u32>,
    config: &AppConfig,
    ollama_endpoint: Option<&str>,
    ollama_model: Option<&str>,
    cancel: CancellationToken,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let driver = BridgeDriver::launch(&config.bridge_config()).await?;
    let (endpoint, model) = config.ollama_settings(ollama_endpoint, ollama_model);
    info!(%endpoint, %model, "using ollama decision maker");

    let (progress, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut agent = AgentLoop::new(
        task,
        Box::new(driver),
        Box::new(OllamaDecisionMaker::new(&endpoint, &model)),
    )
    .with_config(config.loop_config(max_steps))
    .with_memory(Box::new(InMemoryStore::new()))
    .with_initial_actions(config.agent.initial_actions.clone())
    .with_cancellation(cancel)
    .with_sink(Box::new(progress));

    if let Some(path) = &config.agent.trace_path {
        agent = agent.with_sink(Box::new(TraceLogger::new(path)));
    }

    println!("=== Starting task: {} ===\n", task);
    let report = agent.run().await;
    agent.close().await;

    // Dropping the loop closes the channel and lets the printer finish.
    drop(agent);
    let _ = printer.await;

    match &report.state {
        LoopState::Succeeded { summary } => println!("\nTask succeeded: {}", summary),
        LoopState::Failed(reason) => println!("\nTask failed: {}", reason),
        LoopState::Cancelled => println!("\nTask cancelled"),
        other => println!("\nStopped in state {}", other.name()),
    }
    println!("Steps: {}", report.steps);

    Ok(report)
}

fn print_event(event: &TraceEvent) {
    match &event.event {
        LoopEvent::SnapshotBuilt { sequence, elements } => {
            println!("--- Snapshot #{} ({} elements) ---", sequence, elements)
        }
        LoopEvent::DecisionReceived { decision } => {
            println!("Step {}: {}", event.step, decision)
        }
        LoopEvent::ActionRejected { action, reason, .. } => {
            println!("  rejected {}: {}", action, reason)
        }
        LoopEvent::ExecutionFinished {
            action,
            success: true,
            attempts,
            ..
        } => println!("  executed {} ({} attempts)", action, attempts),
        LoopEvent::ExecutionFinished { action, error, .. } => println!(
            "  failed {}: {}",
            action,
            error.as_deref().unwrap_or("unknown error")
        ),
        _ => {}
    }
}

// ============================================================================
// snapshot subcommand
// ============================================================================

/// Capture a single snapshot and print it.
pub async fn cmd_snapshot(
    config: &AppConfig,
    format: SnapshotFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = BridgeDriver::launch(&config.bridge_config()).await?;
    let mut builder = SnapshotBuilder::new(config.loop_config(None).snapshot_timeout);

    let result = builder.build(&mut driver).await;
    driver.quit().await;
    let snapshot = result?;

    match format {
        SnapshotFormat::Text => println!("{}", describe_screen(&snapshot)),
        SnapshotFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot.view())?),
    }

    Ok(())
}
