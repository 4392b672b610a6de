//! Mission outcomes, their persisted artifacts and aggregate metrics

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sdk::errors::EngineError;

/// Persisted record of a finished mission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeArtifact {
    pub predicted_actions: Vec<Value>,

    /// Final simulator response without images, scene metadata and objects
    pub last_game_state: Value,

    /// Scored utterances never sent because the goals were already met
    pub remaining_utterances: Vec<String>,
}

/// Score of a completed mission, stored beside its artifact so a resumed
/// run can fold skipped missions back into the totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionScore {
    pub mission_group: Option<String>,
    pub success: bool,
    pub subgoal_flags: Vec<u8>,
}

impl MissionScore {
    pub fn subgoal_rate(&self) -> f64 {
        if self.subgoal_flags.is_empty() {
            return 0.0;
        }
        let completed: u32 = self.subgoal_flags.iter().map(|flag| u32::from(*flag)).sum();
        f64::from(completed) / self.subgoal_flags.len() as f64
    }
}

/// Scored result of a mission that ran to the end of its utterances
#[derive(Debug, Clone, PartialEq)]
pub struct MissionRecord {
    pub mission_id: String,
    pub mission_group: Option<String>,
    pub success: bool,
    pub subgoal_flags: Vec<u8>,
    pub subgoal_rate: f64,
    pub artifact: OutcomeArtifact,
}

impl MissionRecord {
    pub fn score(&self) -> MissionScore {
        MissionScore {
            mission_group: self.mission_group.clone(),
            success: self.success,
            subgoal_flags: self.subgoal_flags.clone(),
        }
    }
}

/// What evaluating one mission produced
#[derive(Debug, Clone, PartialEq)]
pub enum MissionOutcome {
    /// Ran to completion and was scored
    Completed(MissionRecord),

    /// Gave up on the mission; the rate reflects goals met before the failure
    Failed {
        mission_id: String,
        mission_group: Option<String>,
        error: String,
        subgoal_flags: Vec<u8>,
        subgoal_rate: f64,
    },

    /// A previous run already produced an artifact; nothing was executed.
    /// `score` is that run's result when it was stored.
    Cached {
        mission_id: String,
        score: Option<MissionScore>,
    },
}

impl MissionOutcome {
    pub fn mission_id(&self) -> &str {
        match self {
            MissionOutcome::Completed(record) => &record.mission_id,
            MissionOutcome::Failed { mission_id, .. }
            | MissionOutcome::Cached { mission_id, .. } => mission_id,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, MissionOutcome::Cached { .. })
    }

    pub fn success(&self) -> bool {
        match self {
            MissionOutcome::Completed(record) => record.success,
            MissionOutcome::Cached { score: Some(score), .. } => score.success,
            _ => false,
        }
    }

    pub fn subgoal_rate(&self) -> Option<f64> {
        match self {
            MissionOutcome::Completed(record) => Some(record.subgoal_rate),
            MissionOutcome::Failed { subgoal_rate, .. } => Some(*subgoal_rate),
            MissionOutcome::Cached { score, .. } => score.as_ref().map(MissionScore::subgoal_rate),
        }
    }
}

/// Directory of outcome artifacts, one `<mission_id>.json` per mission.
///
/// Scores of completed missions live under `scores/<mission_id>.json`.
/// Only the artifact decides whether a mission counts as evaluated.
#[derive(Debug, Clone)]
pub struct OutcomeStore {
    dir: PathBuf,
}

impl OutcomeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, mission_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", mission_id))
    }

    pub fn exists(&self, mission_id: &str) -> bool {
        self.path_for(mission_id).exists()
    }

    pub async fn save(&self, mission_id: &str, artifact: &OutcomeArtifact) -> Result<PathBuf, EngineError> {
        let path = self.path_for(mission_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(artifact)?).await?;
        tracing::debug!("Wrote outcome artifact to {}", path.display());
        Ok(path)
    }

    pub async fn load(&self, mission_id: &str) -> Result<OutcomeArtifact, EngineError> {
        let bytes = tokio::fs::read(self.path_for(mission_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn score_path_for(&self, mission_id: &str) -> PathBuf {
        self.dir.join("scores").join(format!("{}.json", mission_id))
    }

    pub async fn save_score(&self, mission_id: &str, score: &MissionScore) -> Result<(), EngineError> {
        let path = self.score_path_for(mission_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(score)?).await?;
        Ok(())
    }

    /// Stored score of `mission_id`, `None` when none was written
    pub async fn load_score(&self, mission_id: &str) -> Result<Option<MissionScore>, EngineError> {
        match tokio::fs::read(self.score_path_for(mission_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Running mean
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Aggregate metrics over an evaluation run.
///
/// Rates cover missions played in this run plus skipped missions whose
/// stored score could be restored.
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    /// Missions executed in this run
    pub games_played: u64,
    /// Missions skipped because an artifact already existed
    pub cached: u64,
    /// Skipped missions folded back in from their stored score
    pub restored: u64,
    success_rate: Mean,
    subgoal_completion_rate: Mean,
    per_group_success_rate: BTreeMap<String, Mean>,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the totals
    pub fn record(&mut self, outcome: &MissionOutcome) {
        match outcome {
            MissionOutcome::Cached { score, .. } => {
                self.cached += 1;
                if let Some(score) = score {
                    self.restored += 1;
                    self.fold(score.mission_group.as_deref(), score.success, &score.subgoal_flags);
                }
            }
            MissionOutcome::Completed(record) => {
                self.games_played += 1;
                self.fold(record.mission_group.as_deref(), record.success, &record.subgoal_flags);
            }
            MissionOutcome::Failed {
                mission_group,
                subgoal_flags,
                ..
            } => {
                self.games_played += 1;
                self.fold(mission_group.as_deref(), false, subgoal_flags);
            }
        }
    }

    fn fold(&mut self, group: Option<&str>, success: bool, flags: &[u8]) {
        let success = if success { 1.0 } else { 0.0 };
        self.success_rate.update(success);
        for flag in flags {
            self.subgoal_completion_rate.update(f64::from(*flag));
        }
        if let Some(group) = group {
            self.per_group_success_rate
                .entry(group.to_string())
                .or_default()
                .update(success);
        }
    }

    pub fn overall_success_rate(&self) -> f64 {
        self.success_rate.value()
    }

    /// Mean over every individual subgoal of every scored mission
    pub fn overall_subgoal_completion_rate(&self) -> f64 {
        self.subgoal_completion_rate.value()
    }

    pub fn per_group_success_rate(&self) -> impl Iterator<Item = (&str, f64)> {
        self.per_group_success_rate
            .iter()
            .map(|(group, mean)| (group.as_str(), mean.value()))
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Games played: {} (skipped {} already evaluated, {} restored)",
            self.games_played,
            self.cached,
            self.restored
        );
        tracing::info!("Overall success rate: {:.3}", self.overall_success_rate());
        tracing::info!(
            "Overall subgoal completion rate: {:.3}",
            self.overall_subgoal_completion_rate()
        );
        for (group, rate) in self.per_group_success_rate() {
            tracing::info!("Success rate for {}: {:.3}", group, rate);
        }
    }
}
