//! Simulator facade
//!
//! [`ArenaClient`] sits on top of the [`Transport`] and speaks in mission
//! terms: load a scene, execute a command list, report goal progress. It keeps
//! the most recent response so the session loop can build world-state
//! snapshots without another round trip.

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::session::ActionStatus;
use crate::transport::{Frame, Result, Transport};
use sdk::errors::EngineError;
use sdk::goals::MissionSpec;

/// Response keys that are too large or too internal to keep in an outcome
pub const SNAPSHOT_EXCLUDED_KEYS: [&str; 6] = [
    "sceneMetadata",
    "colorImage",
    "depthImage",
    "normalsImage",
    "instanceSegmentationImage",
    "objects",
];

/// Object id marker of the agent's own body in the object list
const ROBOT_OBJECT_MARKER: &str = "TAM_";

/// Goal completion keyed by compiled goal id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalCompletion {
    finished: Vec<bool>,
}

impl GoalCompletion {
    /// No goals finished
    pub fn none(total: usize) -> Self {
        Self {
            finished: vec![false; total],
        }
    }

    /// Completion from per-goal flags in goal id order
    pub fn from_flags(finished: Vec<bool>) -> Self {
        Self { finished }
    }

    pub fn total(&self) -> usize {
        self.finished.len()
    }

    pub fn completed(&self) -> usize {
        self.finished.iter().filter(|done| **done).count()
    }

    pub fn is_finished(&self, goal_id: usize) -> bool {
        self.finished.get(goal_id).copied().unwrap_or(false)
    }

    /// Every goal is finished
    pub fn success(&self) -> bool {
        !self.finished.is_empty() && self.finished.iter().all(|done| *done)
    }

    pub fn subgoal_rate(&self) -> f64 {
        if self.finished.is_empty() {
            0.0
        } else {
            self.completed() as f64 / self.total() as f64
        }
    }

    /// Per-goal 0/1 flags in goal id order
    pub fn as_flags(&self) -> Vec<u8> {
        self.finished.iter().map(|done| u8::from(*done)).collect()
    }
}

/// Mission-level client for one simulator instance
pub struct ArenaClient {
    transport: Transport,
    latest: Option<Frame>,
    /// Compiled goals of the loaded scene
    goal_count: usize,
}

impl ArenaClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            latest: None,
            goal_count: 0,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    /// Reconnect after the simulator process was restarted
    pub async fn reconnect(&mut self) -> Result<()> {
        self.latest = None;
        self.transport.restart().await
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    /// Send the scene-load document for `spec`
    pub async fn load_scene(&mut self, spec: &MissionSpec) -> Result<()> {
        info!("Loading scene with {} goals", spec.goal_count());
        self.latest = None;
        self.goal_count = spec.goal_count();
        self.transport.send_document(&spec.scene_document()).await
    }

    /// Submit translated `commands` and wait for their response.
    ///
    /// `actions` are the agent actions the commands were translated from;
    /// they name the action type in the returned status.
    pub async fn execute(&mut self, commands: &[Value], actions: &[Value]) -> Result<ActionStatus> {
        let batch_id = self.transport.send(commands).await?;
        let frame = self.transport.await_response(batch_id).await?;

        if frame.was_interrupted() {
            warn!("Batch {} was interrupted by a newer batch", batch_id);
        }

        let status = ActionStatus::from_frame(&frame, actions);
        debug!(
            "Batch {} finished: {} success={} ({})",
            batch_id, status.action_type, status.success, status.error_type
        );
        self.latest = Some(frame);
        Ok(status)
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    pub fn goal_count(&self) -> usize {
        self.goal_count
    }

    /// Whether every compiled goal of the loaded scene is finished.
    ///
    /// Goals missing from the simulator's progress list count as unfinished.
    pub fn all_goals_finished(&self) -> bool {
        self.completion_of(self.goal_count)
            .is_ok_and(|completion| completion.success())
    }

    /// Completion of `total` compiled goals from the latest response.
    ///
    /// A response without progress fields counts as nothing finished.
    pub fn goal_completion(&self, total: usize) -> GoalCompletion {
        self.completion_of(total).unwrap_or_else(|e| {
            warn!("{}", e);
            GoalCompletion::none(total)
        })
    }

    fn completion_of(&self, total: usize) -> Result<GoalCompletion> {
        let frame = self.latest.as_ref().ok_or_else(|| {
            EngineError::GoalQueryFailure("no response received yet".to_string())
        })?;

        let mut completion = GoalCompletion::none(total);
        for goal in frame.goal_progress()? {
            match completion.finished.get_mut(goal.goal_id as usize) {
                Some(slot) => *slot = goal.is_finished,
                None => warn!("Simulator reported unknown goal id {}", goal.goal_id),
            }
        }
        Ok(completion)
    }

    /// Snapshot handed to the reasoning service
    pub fn world_snapshot(&self) -> Value {
        let payload = self.latest.as_ref().map(|frame| &frame.payload);
        reconstruct_metadata(payload.unwrap_or(&Value::Null))
    }

    /// Latest response without scene metadata, images and the object list
    pub fn final_game_state(&self) -> Value {
        let mut state = Map::new();
        if let Some(Value::Object(payload)) = self.latest.as_ref().map(|frame| &frame.payload) {
            for (key, value) in payload {
                if !SNAPSHOT_EXCLUDED_KEYS.contains(&key.as_str()) {
                    state.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(state)
    }
}

/// Build the world-state snapshot from a raw simulator response
pub fn reconstruct_metadata(payload: &Value) -> Value {
    let robot_info: Vec<Value> = payload
        .get("objects")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|object| {
            object
                .get("objectID")
                .and_then(Value::as_str)
                .is_some_and(|id| id.contains(ROBOT_OBJECT_MARKER))
        })
        .map(|robot| {
            json!({
                "currentRoom": robot.get("currentRoom").cloned().unwrap_or(Value::Null),
                "position": robot.get("position").cloned().unwrap_or(Value::Null),
                "rotation": robot.get("rotation").cloned().unwrap_or(Value::Null),
            })
        })
        .into_iter()
        .collect();

    if robot_info.is_empty() && !payload.is_null() {
        warn!("Agent location not found in the object list");
    }

    json!({
        "colorImages": indexed_images(payload, "colorImage"),
        "depthImages": indexed_images(payload, "depthImage"),
        "robotInfo": robot_info,
        "viewPoints": payload
            .get("sceneMetadata")
            .and_then(|metadata| metadata.get("GoToPoints"))
            .cloned()
            .unwrap_or_else(|| json!({})),
    })
}

fn indexed_images(payload: &Value, key: &str) -> Value {
    let images: Map<String, Value> = payload
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, image)| (index.to_string(), image.clone()))
        .collect();
    Value::Object(images)
}
