//! Action space and translation to simulator commands
//!
//! The reasoning service speaks in agent actions:
//! `{"id": "1", "type": "Rotate", "rotation": {"direction": "Right", "magnitude": 0}}`.
//! The simulator expects a command list where each entry carries its
//! position as `commandNum`, its `commandType` and the same payload object.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::transport::Frame;
use sdk::errors::EngineError;

/// Error type recorded when an agent action could not be translated
pub const INCORRECT_ACTION_FORMAT: &str = "IncorrectActionFormat";

/// Error type recorded when the simulator omits its action status
pub const ACTION_EXECUTION_ERROR: &str = "ActionExecutionError";

/// Every action the simulator accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Goto,
    Move,
    Rotate,
    Look,
    Pickup,
    Open,
    Close,
    Break,
    Scan,
    Examine,
    Place,
    Pour,
    Toggle,
    Fill,
    Clean,
}

impl ActionKind {
    pub const ALL: [ActionKind; 15] = [
        ActionKind::Goto,
        ActionKind::Move,
        ActionKind::Rotate,
        ActionKind::Look,
        ActionKind::Pickup,
        ActionKind::Open,
        ActionKind::Close,
        ActionKind::Break,
        ActionKind::Scan,
        ActionKind::Examine,
        ActionKind::Place,
        ActionKind::Pour,
        ActionKind::Toggle,
        ActionKind::Fill,
        ActionKind::Clean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Goto => "Goto",
            ActionKind::Move => "Move",
            ActionKind::Rotate => "Rotate",
            ActionKind::Look => "Look",
            ActionKind::Pickup => "Pickup",
            ActionKind::Open => "Open",
            ActionKind::Close => "Close",
            ActionKind::Break => "Break",
            ActionKind::Scan => "Scan",
            ActionKind::Examine => "Examine",
            ActionKind::Place => "Place",
            ActionKind::Pour => "Pour",
            ActionKind::Toggle => "Toggle",
            ActionKind::Fill => "Fill",
            ActionKind::Clean => "Clean",
        }
    }

    /// Movement of the agent itself rather than of an object
    pub fn is_navigational(self) -> bool {
        matches!(
            self,
            ActionKind::Goto | ActionKind::Move | ActionKind::Rotate | ActionKind::Look
        )
    }

    /// Key the action's parameters live under
    pub fn payload_key(self) -> &'static str {
        match self {
            ActionKind::Goto => "goto",
            ActionKind::Move => "move",
            ActionKind::Rotate => "rotation",
            ActionKind::Look => "look",
            ActionKind::Pickup => "pickup",
            ActionKind::Open => "open",
            ActionKind::Close => "close",
            ActionKind::Break => "break",
            ActionKind::Scan => "scan",
            ActionKind::Examine => "examine",
            ActionKind::Place => "place",
            ActionKind::Pour => "pour",
            ActionKind::Toggle => "toggle",
            ActionKind::Fill => "fill",
            ActionKind::Clean => "clean",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = EngineError;

    /// Case-insensitive, so `goto` and `pickup` from older agents resolve
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidActionFormat(format!("unknown action type '{}'", s)))
    }
}

/// Outcome of the last executed batch, fed back to the reasoning service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
    pub id: usize,

    #[serde(rename = "type")]
    pub action_type: String,

    pub success: bool,

    #[serde(rename = "errorType")]
    pub error_type: String,
}

impl ActionStatus {
    /// Derive the status from the simulator's response to `actions`
    pub fn from_frame(frame: &Frame, actions: &[Value]) -> Self {
        let last_action = frame.last_action();
        let id = last_action.as_ref().map_or(0, |last| last.command_num);

        let action_type = actions
            .get(id)
            .and_then(|action| action.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| last_action.map(|last| last.command_type))
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Self {
            id,
            action_type: normalize_action_type(action_type),
            success: frame.succeeded(),
            error_type: frame
                .last_action_success()
                .unwrap_or(ACTION_EXECUTION_ERROR)
                .to_string(),
        }
    }

    /// Status for actions that never reached the simulator
    pub fn incorrect_format(actions: &[Value]) -> Self {
        let action_type = actions
            .first()
            .and_then(|action| action.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        Self {
            id: 0,
            action_type: normalize_action_type(action_type),
            success: false,
            error_type: INCORRECT_ACTION_FORMAT.to_string(),
        }
    }
}

fn normalize_action_type(action_type: String) -> String {
    match ActionKind::from_str(&action_type) {
        Ok(kind @ (ActionKind::Goto | ActionKind::Pickup)) => kind.as_str().to_string(),
        _ => action_type,
    }
}

/// Translate agent actions into the simulator's command list.
///
/// Fails with `InvalidActionFormat` if any action has an unknown type or a
/// malformed payload; nothing is sent in that case.
pub fn translate(actions: &[Value]) -> Result<Vec<Value>, EngineError> {
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| translate_one(index, action))
        .collect()
}

fn translate_one(index: usize, action: &Value) -> Result<Value, EngineError> {
    let kind: ActionKind = action
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidActionFormat(format!("action {} has no type", index)))?
        .parse()?;

    let payload = action
        .get(kind.payload_key())
        .and_then(Value::as_object)
        .ok_or_else(|| {
            EngineError::InvalidActionFormat(format!(
                "{} action {} is missing its '{}' object",
                kind,
                index,
                kind.payload_key()
            ))
        })?;

    validate_payload(kind, payload).map_err(|reason| {
        EngineError::InvalidActionFormat(format!("{} action {}: {}", kind, index, reason))
    })?;

    let mut command = Map::with_capacity(3);
    command.insert("commandNum".to_string(), json!(index));
    command.insert("commandType".to_string(), json!(kind.as_str()));
    command.insert(
        kind.payload_key().to_string(),
        Value::Object(payload.clone()),
    );
    Ok(Value::Object(command))
}

fn validate_payload(kind: ActionKind, payload: &Map<String, Value>) -> Result<(), String> {
    match kind {
        ActionKind::Move | ActionKind::Rotate | ActionKind::Look => {
            if !payload.get("direction").is_some_and(Value::is_string) {
                return Err("direction must be a string".to_string());
            }
            if payload.get("magnitude").is_some_and(|m| !m.is_number()) {
                return Err("magnitude must be a number".to_string());
            }
            Ok(())
        }
        _ => {
            if payload.get("object").is_some_and(Value::is_object) {
                Ok(())
            } else {
                Err("object must be an object".to_string())
            }
        }
    }
}

/// Harmless action used to confirm a freshly loaded scene responds
pub fn probe_action() -> Value {
    json!({
        "id": "1",
        "type": "Rotate",
        "rotation": {
            "direction": "Right",
            "magnitude": 0,
        },
    })
}
