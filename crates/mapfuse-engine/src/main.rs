//! Scenario runner for mapfuse.
//!
//! Replays a recorded team run: every agent gets a private belief graph
//! and its own task, the coordinator fuses graphs as the agents discover
//! each other, and each agent navigates toward its goal turn by turn.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `mapfuse-config.yaml`
//! 2. Initialize structured logging (tracing), level and format from config
//! 3. Load the scenario
//! 4. Register one belief graph per scripted agent
//! 5. Start the coordinator task
//! 6. Spawn one task per agent and replay its messages
//! 7. Stop the coordinator once every script has ended
//! 8. Write graph snapshots, if configured
//! 9. Log the run summary

mod driver;
mod error;
mod scenario;

use std::path::Path;

use chrono::Utc;
use mapfuse_core::config::LogFormat;
use mapfuse_core::{AgentSession, Coordinator, FusionConfig, GraphRegistry, Strategist};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::driver::AgentReport;
use crate::error::EngineError;
use crate::scenario::Scenario;

/// Application entry point for the scenario runner.
///
/// # Errors
///
/// Returns an error if configuration, the scenario, or the coordinator
/// cannot be set up.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    info!("mapfuse-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        vision_radius = config.vision.radius,
        barrier_timeout_ms = config.coordination.barrier_timeout_ms,
        loop_window = config.planner.loop_window,
        frontier_margin = config.planner.frontier_margin,
        scenario = config.scenario.path,
        "Configuration loaded"
    );

    // 3. Load the scenario.
    let scenario = Scenario::from_file(Path::new(&config.scenario.path))?;
    info!(
        agents = scenario.agents.len(),
        steps = scenario.steps(),
        "Scenario loaded"
    );

    // 4. Register belief graphs.
    let registry = GraphRegistry::new();
    for agent in &scenario.agents {
        registry.register(agent.id, config.vision.radius)?;
    }

    // 5. Start the coordinator.
    let strategist = Strategist::new(registry.clone());
    let (coordinator, handle) = Coordinator::new(strategist, &config.coordination)?;
    let coordinator_task = tokio::spawn(coordinator.run());
    info!("Coordinator started");

    // 6. Replay every agent's script concurrently.
    let started = Utc::now();
    let mut tasks = Vec::with_capacity(scenario.agents.len());
    for script in scenario.agents {
        let session = AgentSession::new(
            script.id,
            registry.clone(),
            handle.clone(),
            config.planner.clone(),
        )?;
        tasks.push(tokio::spawn(driver::play(session, script)));
    }
    let mut reports: Vec<AgentReport> = Vec::with_capacity(tasks.len());
    for joined in futures::future::join_all(tasks).await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!(error = %e, "agent task failed"),
        }
    }

    // 7. Stop the coordinator.
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "coordinator already stopped");
    }
    drop(handle);
    let summary = coordinator_task.await.unwrap_or_else(|e| {
        warn!(error = %e, "coordinator task failed");
        mapfuse_core::CoordinatorSummary::default()
    });

    // 8. Write graph snapshots.
    if let Some(path) = &config.scenario.snapshot_path {
        write_snapshots(&registry, Path::new(path))?;
        info!(path = path.as_str(), "Graph snapshots written");
    }

    // 9. Log the run summary.
    for report in &reports {
        info!(
            agent = %report.agent,
            turns = report.turns,
            moves = report.moves,
            clears = report.clears,
            no_path = report.no_path,
            planning_failures = report.planning_failures,
            rebases = report.rebases,
            arrived = report.arrived,
            location = ?report.location,
            aborted = ?report.aborted,
            "Agent finished"
        );
    }
    let turns = reports
        .iter()
        .fold(0_u64, |acc, r| acc.saturating_add(r.turns));
    let graphs = registry.distinct_graphs()?.len();
    info!(
        turns,
        rounds = summary.rounds,
        barrier_timeouts = summary.timeouts,
        merges = summary.merges,
        deferred = summary.deferred,
        graphs,
        width = ?summary.dimensions.width,
        height = ?summary.dimensions.height,
        elapsed_ms = Utc::now().signed_duration_since(started).num_milliseconds(),
        "mapfuse-engine run complete"
    );

    Ok(())
}

/// Load the configuration from `mapfuse-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
/// The second value is `false` when the file is missing and defaults are
/// used.
fn load_config() -> Result<(FusionConfig, bool), EngineError> {
    let config_path = Path::new("mapfuse-config.yaml");
    if config_path.exists() {
        let config = FusionConfig::from_file(config_path)?;
        Ok((config, true))
    } else {
        let mut config = FusionConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}

/// Serialize every distinct graph to `path` as a JSON array.
fn write_snapshots(registry: &GraphRegistry, path: &Path) -> Result<(), EngineError> {
    let mut snapshots = Vec::new();
    for (_, graph) in registry.distinct_graphs()? {
        snapshots.push(mapfuse_core::registry::read_graph(&graph)?.snapshot());
    }
    let json = serde_json::to_string_pretty(&snapshots).map_err(|e| EngineError::Snapshot {
        message: format!("failed to serialize graphs: {e}"),
    })?;
    std::fs::write(path, json).map_err(|e| EngineError::Snapshot {
        message: format!("failed to write {}: {e}", path.display()),
    })
}
