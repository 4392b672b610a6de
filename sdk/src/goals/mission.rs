//! Compiled mission specification
//!
//! A [`MissionSpec`] couples the scene descriptor with the compiled goal list.
//! It is built once per mission and never mutated; the simulator receives it
//! whole as the scene-load command rendered by [`MissionSpec::scene_document`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::condition::{compile, CompiledGoals, StateCondition, TaskGoal};
use super::GoalError;

/// Scene descriptor plus compiled goals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMissionSpec")]
pub struct MissionSpec {
    scene: Value,

    #[serde(rename = "task_goals")]
    goals: CompiledGoals,
}

#[derive(Deserialize)]
struct RawMissionSpec {
    scene: Value,
    task_goals: Vec<TaskGoal>,
}

impl TryFrom<RawMissionSpec> for MissionSpec {
    type Error = GoalError;

    fn try_from(raw: RawMissionSpec) -> Result<Self, Self::Error> {
        MissionSpec::new(raw.scene, raw.task_goals)
    }
}

impl MissionSpec {
    /// Compile `goals` against `scene`.
    ///
    /// State conditions are shared by name across goals; the same name must
    /// always describe the same condition.
    pub fn new(scene: Value, goals: Vec<TaskGoal>) -> Result<Self, GoalError> {
        if !scene.is_object() {
            return Err(GoalError::InvalidScene);
        }
        if goals.is_empty() {
            return Err(GoalError::NoGoals);
        }

        let mut seen: HashMap<&str, &StateCondition> = HashMap::new();
        for condition in goals.iter().flat_map(|goal| goal.conditions.iter()) {
            if let Some(previous) = seen.insert(condition.name.as_str(), condition) {
                if previous != condition {
                    return Err(GoalError::ConflictingStateCondition(condition.name.clone()));
                }
            }
        }

        Ok(Self {
            scene,
            goals: compile(goals),
        })
    }

    pub fn scene(&self) -> &Value {
        &self.scene
    }

    pub fn goals(&self) -> &CompiledGoals {
        &self.goals
    }

    pub fn goal_count(&self) -> usize {
        self.goals.len()
    }

    /// Distinct state conditions in first-use order
    pub fn state_conditions(&self) -> Vec<&StateCondition> {
        let mut conditions: Vec<&StateCondition> = Vec::new();
        for condition in self.goals.iter().flat_map(|goal| goal.conditions.iter()) {
            if !conditions.iter().any(|known| known.name == condition.name) {
                conditions.push(condition);
            }
        }
        conditions
    }

    /// Render the document the simulator loads a scene from
    pub fn scene_document(&self) -> Value {
        let task_goals: Vec<Value> = self
            .goals
            .iter()
            .map(|goal| {
                let object_states: Vec<Value> = goal
                    .conditions
                    .iter()
                    .map(|condition| {
                        let mut state = serde_json::Map::with_capacity(1);
                        state.insert(
                            condition.context.to_string(),
                            Value::String(format!("{}=true", condition.name)),
                        );
                        Value::Object(state)
                    })
                    .collect();

                json!({
                    "goal_id": goal.goal_id,
                    "object_states": object_states,
                    "object_states_relation": goal.relation.as_str(),
                    "description": "",
                    "preconditions": [],
                    "visibility": {
                        "isHidden": false,
                        "activationInteractable": "ALWAYS UNLOCKED",
                        "stickyNoteIndex": 0,
                    },
                    "canReset": false,
                })
            })
            .collect();

        let state_conditions: Vec<Value> = self
            .state_conditions()
            .into_iter()
            .map(|condition| {
                json!({
                    "stateName": condition.name,
                    "context": condition.context.as_str(),
                    "expression": condition.expression.to_value(),
                })
            })
            .collect();

        json!({
            "scene": self.scene,
            "task_goals": task_goals,
            "stateconditions": state_conditions,
            "goal_text": "",
            "task_description": "",
            "game_id": "3",
            "experimental": "true",
            "game_interactions": {
                "camera_movements": {
                    "task_beginning": [],
                    "task_procedure": [],
                    "task_ending": [],
                    "object_conditions": [],
                },
                "game_messages": {
                    "task_beginning": [],
                    "task_procedure": [],
                    "task_ending": [],
                    "object_conditions": [],
                },
            },
            "pastPortals": [{ "PortalName": "past", "PortalStatus": false }],
            "futurePortals": [{ "PortalName": "future", "PortalStatus": false }],
        })
    }
}
