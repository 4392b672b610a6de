//! Mission Evaluator
//!
//! Runs whole missions against one simulator, strictly one at a time:
//!
//! 1. Skip the mission if an outcome artifact for it already exists
//! 2. `prepare`: load the scene, probe until the simulator answers, then run
//!    the preparation utterances unscored
//! 3. `run`: send each scored utterance through the session controller,
//!    stopping early once every goal is finished
//! 4. Score the goal bitmap and persist the outcome artifact with its score
//!
//! A `ResponseTimeout` anywhere in 2-4 restarts the simulator and retries the
//! same mission once. Any other failure, or a second timeout, records the
//! mission as failed with the subgoal rate reached so far. This is the only
//! layer that decides between giving up and retrying.

pub mod catalog;
pub mod outcome;
pub mod simulator;

pub use catalog::{load_missions, parse_missions, Mission};
pub use outcome::{
    EvaluationMetrics, MissionOutcome, MissionRecord, MissionScore, OutcomeArtifact, OutcomeStore,
};
pub use simulator::{CommandSimulator, NoopSimulator, SimulatorProcess};

use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::arena::ArenaClient;
use crate::config::EvaluationConfig;
use crate::session::{probe_action, translate, SessionController, SessionPhase};
use crate::shutdown::Shutdown;
use sdk::errors::{ArenaErrorExt, EngineError};

/// Evaluation policy knobs
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub probe_attempts: u32,
    pub probe_interval: Duration,
    pub restart_after_num_sessions: usize,
    pub session_id_prefix: String,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self::from(&EvaluationConfig::default())
    }
}

impl From<&EvaluationConfig> for EvaluationSettings {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            probe_attempts: config.probe_attempts,
            probe_interval: Duration::from_secs(config.probe_interval_secs),
            restart_after_num_sessions: config.restart_after_num_sessions,
            session_id_prefix: config.session_id_prefix.clone(),
        }
    }
}

/// Build `<prefix>.<YYYYMMDD>/<mission_id>`
pub fn session_id(prefix: &str, date: NaiveDate, mission_id: &str) -> String {
    format!("{}.{}/{}", prefix, date.format("%Y%m%d"), mission_id)
}

/// Utterances a mission run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    pub predicted_actions: Vec<Value>,
    pub remaining_utterances: Vec<String>,
}

/// Drives missions end to end against one simulator instance
pub struct MissionEvaluator {
    arena: ArenaClient,
    simulator: Box<dyn SimulatorProcess>,
    session: SessionController,
    store: OutcomeStore,
    settings: EvaluationSettings,
    shutdown: Shutdown,
    metrics: EvaluationMetrics,
    needs_restart: bool,
}

impl MissionEvaluator {
    pub fn new(
        arena: ArenaClient,
        simulator: Box<dyn SimulatorProcess>,
        session: SessionController,
        store: OutcomeStore,
        settings: EvaluationSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            arena,
            simulator,
            session,
            store,
            settings,
            shutdown,
            metrics: EvaluationMetrics::new(),
            needs_restart: false,
        }
    }

    pub fn arena(&self) -> &ArenaClient {
        &self.arena
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &OutcomeStore {
        &self.store
    }

    /// Start the simulator and connect to it
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.simulator.restart().await?;
        self.arena.connect().await
    }

    /// Restart the simulator process and reconnect with a fresh budget
    pub async fn restart_simulator(&mut self) -> Result<(), EngineError> {
        info!("Restarting simulator");
        self.simulator.restart().await?;
        self.arena.reconnect().await?;
        self.needs_restart = false;
        Ok(())
    }

    /// Stop the simulator and close the connection
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        self.arena.close().await;
        self.simulator.stop().await
    }

    /// Evaluate every mission in order and return the aggregate metrics.
    ///
    /// Metrics start fresh and cover `missions`, including skipped missions
    /// restored from their stored scores. The simulator is restarted every
    /// `restart_after_num_sessions` executed missions and after a mission
    /// lost the connection for good.
    pub async fn run_all(&mut self, missions: &[Mission]) -> Result<EvaluationMetrics, EngineError> {
        self.metrics = EvaluationMetrics::new();
        let mut executed_since_restart = 0usize;

        for (index, mission) in missions.iter().enumerate() {
            if self.shutdown.is_triggered() {
                warn!(
                    "Shutdown requested, stopping after {} of {} missions",
                    index,
                    missions.len()
                );
                break;
            }

            let every = self.settings.restart_after_num_sessions;
            if self.needs_restart || (every > 0 && executed_since_restart >= every) {
                self.restart_simulator().await?;
                executed_since_restart = 0;
            }

            info!(
                "Mission {}/{}: {}",
                index + 1,
                missions.len(),
                mission.mission_id
            );
            let outcome = self.evaluate(mission).await?;
            if !outcome.is_cached() {
                executed_since_restart += 1;
            }
        }

        self.metrics.log_summary();
        Ok(self.metrics.clone())
    }

    /// Evaluate one mission, retrying once after a response timeout.
    ///
    /// Only cancellation is returned as an error; every other failure is
    /// recorded as a [`MissionOutcome::Failed`].
    #[instrument(skip(self, mission), fields(mission = %mission.mission_id))]
    pub async fn evaluate(&mut self, mission: &Mission) -> Result<MissionOutcome, EngineError> {
        if self.store.exists(&mission.mission_id) {
            info!("Mission has already been evaluated, skipping");
            let score = match self.store.load_score(&mission.mission_id).await {
                Ok(Some(score)) => Some(score),
                Ok(None) => {
                    warn!("No stored score, mission is left out of the rates");
                    None
                }
                Err(e) => {
                    warn!("Failed to read stored score ({}), mission is left out of the rates", e);
                    None
                }
            };
            let outcome = MissionOutcome::Cached {
                mission_id: mission.mission_id.clone(),
                score,
            };
            self.metrics.record(&outcome);
            return Ok(outcome);
        }

        let session_id = session_id(
            &self.settings.session_id_prefix,
            chrono::Utc::now().date_naive(),
            &mission.mission_id,
        );

        let result = match self.attempt(mission, &session_id).await {
            Err(e) if e.is_retryable_mission() => {
                warn!("Mission timed out ({}), restarting simulator and retrying once", e);
                match self.restart_simulator().await {
                    Ok(()) => self.attempt(mission, &session_id).await,
                    Err(restart_error) => Err(restart_error),
                }
            }
            other => other,
        };

        let outcome = match result {
            Ok(record) => MissionOutcome::Completed(record),
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => self.failed(mission, e),
        };

        self.metrics.record(&outcome);
        Ok(outcome)
    }

    async fn attempt(&mut self, mission: &Mission, session_id: &str) -> Result<MissionRecord, EngineError> {
        self.prepare(mission, session_id).await?;
        let run = self.run(mission, session_id).await?;

        let completion = self.arena.goal_completion(mission.spec.goal_count());
        let artifact = OutcomeArtifact {
            predicted_actions: run.predicted_actions,
            last_game_state: self.arena.final_game_state(),
            remaining_utterances: run.remaining_utterances,
        };

        info!(
            "Mission finished: success={} subgoals={}/{} ({:.2})",
            completion.success(),
            completion.completed(),
            completion.total(),
            completion.subgoal_rate()
        );

        let record = MissionRecord {
            mission_id: mission.mission_id.clone(),
            mission_group: mission.mission_group.clone(),
            success: completion.success(),
            subgoal_flags: completion.as_flags(),
            subgoal_rate: completion.subgoal_rate(),
            artifact,
        };

        // Written before the artifact, which alone marks the mission as evaluated
        self.store.save_score(&mission.mission_id, &record.score()).await?;
        self.store.save(&mission.mission_id, &record.artifact).await?;
        Ok(record)
    }

    fn failed(&mut self, mission: &Mission, e: EngineError) -> MissionOutcome {
        error!("Mission failed: {} ({})", e, e.user_hint());
        if matches!(e, EngineError::ConnectionUnavailable { .. }) {
            self.needs_restart = true;
        }

        let completion = self.arena.goal_completion(mission.spec.goal_count());
        MissionOutcome::Failed {
            mission_id: mission.mission_id.clone(),
            mission_group: mission.mission_group.clone(),
            error: e.to_string(),
            subgoal_flags: completion.as_flags(),
            subgoal_rate: completion.subgoal_rate(),
        }
    }

    /// Load the scene, wait until it responds and run preparation utterances
    pub async fn prepare(&mut self, mission: &Mission, session_id: &str) -> Result<(), EngineError> {
        self.arena.load_scene(&mission.spec).await?;
        self.probe_until_ready().await?;

        for utterance in &mission.preparation_utterances {
            let outcome = self.session.run(&mut self.arena, session_id, utterance).await?;
            if outcome.phase == SessionPhase::Aborted {
                warn!("Preparation utterance '{}' did not complete", utterance);
            }
        }
        Ok(())
    }

    /// Run the scored utterances in order
    pub async fn run(&mut self, mission: &Mission, session_id: &str) -> Result<RunResult, EngineError> {
        let mut result = RunResult::default();

        for (index, utterance) in mission.utterances.iter().enumerate() {
            if self.arena.all_goals_finished() {
                info!(
                    "All goals finished with {} utterances left",
                    mission.utterances.len() - index
                );
                result.remaining_utterances = mission.utterances[index..].to_vec();
                break;
            }

            let outcome = self.session.run(&mut self.arena, session_id, utterance).await?;
            result.predicted_actions.extend(outcome.actions_taken);
        }

        Ok(result)
    }

    /// Send the probe action until the scene answers with success
    async fn probe_until_ready(&mut self) -> Result<(), EngineError> {
        let probe = [probe_action()];
        let commands = translate(&probe)?;
        let attempts = self.settings.probe_attempts;

        for attempt in 1..=attempts {
            match self.arena.execute(&commands, &probe).await {
                Ok(status) if status.success => {
                    info!("Scene ready after {} probe(s)", attempt);
                    return Ok(());
                }
                Ok(status) => {
                    warn!(
                        "Probe {}/{} failed with {}",
                        attempt, attempts, status.error_type
                    );
                }
                Err(e) if e.is_recoverable() && !e.is_retryable_mission() => {
                    warn!("Probe {}/{} failed: {}", attempt, attempts, e);
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.probe_interval) => {}
                    _ = self.shutdown.cancelled() => return Err(EngineError::Cancelled),
                }
            }
        }

        Err(EngineError::MissionLaunchFailure(format!(
            "scene did not respond after {} probes",
            attempts
        )))
    }
}
