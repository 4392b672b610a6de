//! Decoded simulator responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sdk::errors::EngineError;

/// Status the simulator reports for a command that ran to completion
pub const ACTION_SUCCESSFUL: &str = "ActionSuccessful";

/// Status reported when a newer batch pre-empted the running command
pub const INTERRUPTED_BY_NEW_BATCH: &str = "InterruptedByNewCommandBatch";

/// An inbound payload tagged with its arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position of this frame in the connection's receive order
    pub response_seq: u64,

    /// Batch id echoed by the simulator, when it sends one
    pub batch_id: Option<u64>,

    pub payload: Value,
}

/// The command the simulator last worked on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LastAction {
    #[serde(rename = "commandNum")]
    pub command_num: usize,

    #[serde(rename = "commandType", default)]
    pub command_type: String,
}

/// Completion state of one compiled goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub goal_id: u32,

    #[serde(rename = "isFinished")]
    pub is_finished: bool,
}

impl Frame {
    pub fn new(response_seq: u64, payload: Value) -> Self {
        let batch_id = payload.get("batchId").and_then(Value::as_u64);
        Self {
            response_seq,
            batch_id,
            payload,
        }
    }

    /// Key the frame is published under in the pending-response store.
    ///
    /// Simulators that echo `batchId` are routed by it; otherwise responses
    /// correlate by arrival order, which matches batch order on one epoch.
    pub fn correlation_id(&self) -> u64 {
        self.batch_id.unwrap_or(self.response_seq)
    }

    pub fn last_action_success(&self) -> Option<&str> {
        self.payload.get("lastActionSuccess").and_then(Value::as_str)
    }

    pub fn succeeded(&self) -> bool {
        self.last_action_success() == Some(ACTION_SUCCESSFUL)
    }

    pub fn was_interrupted(&self) -> bool {
        self.last_action_success() == Some(INTERRUPTED_BY_NEW_BATCH)
    }

    /// `lastAction` arrives either as an object or as a JSON-encoded string
    pub fn last_action(&self) -> Option<LastAction> {
        match self.payload.get("lastAction")? {
            Value::String(text) => serde_json::from_str(text).ok(),
            value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// Goal completion list reported under `challengeProgress.ChallengeGoals`
    pub fn goal_progress(&self) -> Result<Vec<GoalProgress>, EngineError> {
        let goals = self
            .payload
            .get("challengeProgress")
            .and_then(|progress| progress.get("ChallengeGoals"))
            .ok_or_else(|| {
                EngineError::GoalQueryFailure(
                    "response carries no challengeProgress.ChallengeGoals".to_string(),
                )
            })?;

        serde_json::from_value(goals.clone())
            .map_err(|e| EngineError::GoalQueryFailure(format!("malformed goal list: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_prefers_echoed_batch_id() {
        assert_eq!(Frame::new(4, json!({"batchId": 9})).correlation_id(), 9);
        assert_eq!(Frame::new(4, json!({})).correlation_id(), 4);
    }

    #[test]
    fn test_last_action_from_string_and_object() {
        let encoded = Frame::new(
            0,
            json!({"lastAction": "{\"commandNum\": 1, \"commandType\": \"Goto\"}"}),
        );
        let object = Frame::new(0, json!({"lastAction": {"commandNum": 1, "commandType": "Goto"}}));

        let expected = LastAction {
            command_num: 1,
            command_type: "Goto".to_string(),
        };
        assert_eq!(encoded.last_action(), Some(expected.clone()));
        assert_eq!(object.last_action(), Some(expected));
        assert_eq!(Frame::new(0, json!({})).last_action(), None);
    }

    #[test]
    fn test_goal_progress() {
        let frame = Frame::new(
            0,
            json!({"challengeProgress": {"ChallengeGoals": [
                {"goal_id": 0, "isFinished": true},
                {"goal_id": 1, "isFinished": false},
            ]}}),
        );
        let goals = frame.goal_progress().unwrap();
        assert_eq!(goals.len(), 2);
        assert!(goals[0].is_finished);
        assert!(!goals[1].is_finished);
    }

    #[test]
    fn test_missing_goal_progress_is_query_failure() {
        let err = Frame::new(0, json!({"lastActionSuccess": "ActionSuccessful"}))
            .goal_progress()
            .unwrap_err();
        assert!(matches!(err, EngineError::GoalQueryFailure(_)));
    }

    #[test]
    fn test_success_status() {
        assert!(Frame::new(0, json!({"lastActionSuccess": "ActionSuccessful"})).succeeded());
        let interrupted = Frame::new(0, json!({"lastActionSuccess": "InterruptedByNewCommandBatch"}));
        assert!(!interrupted.succeeded());
        assert!(interrupted.was_interrupted());
    }
}
