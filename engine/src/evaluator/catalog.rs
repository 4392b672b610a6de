//! Mission catalog files
//!
//! A catalog is a JSON list of missions:
//!
//! ```json
//! [{
//!   "mission_id": "pickup-mug-1",
//!   "mission_group": "pickup&deliver",
//!   "scene": { "roomLocation": ["BreakRoom"] },
//!   "task_goals": [ ... ],
//!   "preparation_utterances": ["go to the breakroom"],
//!   "utterances": ["pick up the mug"]
//! }]
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use sdk::errors::EngineError;
use sdk::goals::{GoalError, MissionSpec, TaskGoal};

/// One mission to evaluate
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMission")]
pub struct Mission {
    pub mission_id: String,
    pub mission_group: Option<String>,
    pub spec: MissionSpec,

    /// Sent before scoring starts; their actions are not part of the outcome
    pub preparation_utterances: Vec<String>,
    pub utterances: Vec<String>,
}

#[derive(Deserialize)]
struct RawMission {
    mission_id: String,
    #[serde(default)]
    mission_group: Option<String>,
    scene: Value,
    task_goals: Vec<TaskGoal>,
    #[serde(default)]
    preparation_utterances: Vec<String>,
    utterances: Vec<String>,
}

impl TryFrom<RawMission> for Mission {
    type Error = String;

    fn try_from(raw: RawMission) -> Result<Self, Self::Error> {
        let mission_id = raw.mission_id.trim().to_string();
        if mission_id.is_empty() || mission_id.contains(['/', '\\']) || mission_id.starts_with('.') {
            return Err(format!("invalid mission id '{}'", raw.mission_id));
        }

        let spec = MissionSpec::new(raw.scene, raw.task_goals)
            .map_err(|e: GoalError| format!("mission '{}': {}", mission_id, e))?;

        Ok(Self {
            mission_id,
            mission_group: raw.mission_group,
            spec,
            preparation_utterances: raw.preparation_utterances,
            utterances: raw.utterances,
        })
    }
}

impl Mission {
    pub fn new(mission_id: impl Into<String>, spec: MissionSpec, utterances: Vec<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            mission_group: None,
            spec,
            preparation_utterances: Vec::new(),
            utterances,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.mission_group = Some(group.into());
        self
    }

    pub fn with_preparation(mut self, utterances: Vec<String>) -> Self {
        self.preparation_utterances = utterances;
        self
    }
}

/// Parse a catalog from JSON text
pub fn parse_missions(text: &str) -> Result<Vec<Mission>, EngineError> {
    serde_json::from_str(text).map_err(|e| EngineError::InvalidGoal(e.to_string()))
}

/// Read and parse a catalog file
pub fn load_missions(path: &Path) -> Result<Vec<Mission>, EngineError> {
    let text = std::fs::read_to_string(path)?;
    parse_missions(&text)
}
