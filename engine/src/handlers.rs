//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Evaluate a mission catalog against the simulator
//! - validate: Compile a mission catalog without running it
//! - healthcheck: Probe the reasoning service

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::arena::ArenaClient;
use crate::config::Config;
use crate::evaluator::{
    self, load_missions, EvaluationMetrics, EvaluationSettings, MissionEvaluator, OutcomeStore,
};
use crate::reasoning::{wait_until_healthy, HttpReasoningClient, ReasoningService};
use crate::session::SessionController;
use crate::shutdown::Shutdown;
use crate::transport::{Transport, TransportConfig};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Evaluate every mission in `missions_path`
///
/// Waits for the reasoning service, starts the simulator, then runs the
/// missions sequentially. Missions with an existing outcome artifact are
/// skipped.
pub async fn handle_run(
    missions_path: &Path,
    prefix: Option<String>,
    config: &Config,
    format: OutputFormat,
    shutdown: Shutdown,
) -> Result<()> {
    let missions = load_missions(missions_path)
        .with_context(|| format!("Failed to load missions from {}", missions_path.display()))?;
    tracing::info!("Loaded {} missions", missions.len());

    let reasoning: Arc<dyn ReasoningService> = Arc::new(
        HttpReasoningClient::new(&config.reasoning)
            .context("Failed to create reasoning service client")?,
    );
    wait_until_healthy(
        reasoning.as_ref(),
        config.reasoning.healthcheck_attempts,
        std::time::Duration::from_secs(config.reasoning.healthcheck_interval_secs),
        &shutdown,
    )
    .await
    .context("Reasoning service is not healthy")?;

    let mut settings = EvaluationSettings::from(&config.evaluation);
    if let Some(prefix) = prefix {
        settings.session_id_prefix = prefix;
    }

    let transport = Transport::new(TransportConfig::from(&config.simulator), shutdown.clone());
    let session = SessionController::new(
        Arc::clone(&reasoning),
        config.session.max_iterations,
        shutdown.clone(),
    );
    let mut evaluator = MissionEvaluator::new(
        ArenaClient::new(transport),
        evaluator::simulator::from_config(&config.simulator, shutdown.clone()),
        session,
        OutcomeStore::new(&config.evaluation.output_dir),
        settings,
        shutdown,
    );

    evaluator
        .start()
        .await
        .context("Failed to start the simulator")?;
    let result = evaluator.run_all(&missions).await;
    if let Err(e) = evaluator.shutdown().await {
        tracing::warn!("Failed to stop the simulator cleanly: {}", e);
    }

    let metrics = result.context("Evaluation aborted")?;
    print_metrics(&metrics, format);
    Ok(())
}

fn print_metrics(metrics: &EvaluationMetrics, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let groups: serde_json::Map<String, serde_json::Value> = metrics
                .per_group_success_rate()
                .map(|(group, rate)| (group.to_string(), json!(rate)))
                .collect();
            let output = json!({
                "games_played": metrics.games_played,
                "skipped": metrics.cached,
                "restored": metrics.restored,
                "success_rate": metrics.overall_success_rate(),
                "subgoal_completion_rate": metrics.overall_subgoal_completion_rate(),
                "per_group_success_rate": groups,
            });
            println!("{}", output);
        }
        OutputFormat::Text => {
            println!("Games played:            {}", metrics.games_played);
            println!("Skipped (cached):        {}", metrics.cached);
            println!("Restored scores:         {}", metrics.restored);
            println!(
                "Success rate:            {:.3}",
                metrics.overall_success_rate()
            );
            println!(
                "Subgoal completion rate: {:.3}",
                metrics.overall_subgoal_completion_rate()
            );
            for (group, rate) in metrics.per_group_success_rate() {
                println!("  {:<22} {:.3}", group, rate);
            }
        }
    }
}

/// Parse and compile a mission catalog
///
/// Reports each mission's goal count; fails on the first invalid mission.
pub async fn handle_validate(missions_path: &Path, format: OutputFormat) -> Result<()> {
    let missions = load_missions(missions_path)
        .with_context(|| format!("Invalid mission catalog {}", missions_path.display()))?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = missions
                .iter()
                .map(|mission| {
                    json!({
                        "mission_id": mission.mission_id,
                        "goals": mission.spec.goal_count(),
                        "state_conditions": mission.spec.state_conditions().len(),
                        "utterances": mission.utterances.len(),
                    })
                })
                .collect();
            println!("{}", json!({ "valid": true, "missions": entries }));
        }
        OutputFormat::Text => {
            for mission in &missions {
                println!(
                    "✓ {} ({} goals, {} utterances)",
                    mission.mission_id,
                    mission.spec.goal_count(),
                    mission.utterances.len()
                );
            }
            println!("{} missions valid", missions.len());
        }
    }
    Ok(())
}

/// Probe the reasoning service with the configured retry policy
pub async fn handle_healthcheck(config: &Config, format: OutputFormat, shutdown: Shutdown) -> Result<()> {
    let client = HttpReasoningClient::new(&config.reasoning)
        .context("Failed to create reasoning service client")?;

    let result = wait_until_healthy(
        &client,
        config.reasoning.healthcheck_attempts,
        std::time::Duration::from_secs(config.reasoning.healthcheck_interval_secs),
        &shutdown,
    )
    .await;

    let healthy = result.is_ok();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "endpoint": config.reasoning.base_endpoint, "healthy": healthy })
        ),
        OutputFormat::Text => println!(
            "Reasoning service at {}: {}",
            config.reasoning.base_endpoint,
            if healthy { "healthy" } else { "unreachable" }
        ),
    }

    result.context("Healthcheck failed")
}
