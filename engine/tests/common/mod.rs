//! Shared fixtures for integration tests: a scripted in-process simulator
//! speaking the length-prefixed wire format, and scripted reasoning services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_engine::reasoning::{
    ReasoningError, ReasoningRequest, ReasoningResponse, ReasoningService,
};
use arena_engine::shutdown::Shutdown;
use arena_engine::transport::{codec, Transport, TransportConfig};
use async_trait::async_trait;
use sdk::goals::{BoolProperty, Expression, MissionSpec, ObjectInstanceId, StateCondition, TaskGoal};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Produces the frames written back for one inbound batch.
///
/// Arguments are the connection index, the batch index on that connection
/// and the decoded batch.
pub type Responder = Arc<dyn Fn(usize, u64, &Value) -> Vec<Value> + Send + Sync>;

/// In-process simulator listening on an ephemeral port
pub struct FakeSimulator {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    scenes: Arc<Mutex<Vec<Value>>>,
    batches: Arc<Mutex<Vec<Value>>>,
}

impl FakeSimulator {
    /// Start a simulator that answers every batch with `responder`.
    ///
    /// Non-array documents (scene loads) are recorded and never answered.
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, responder)
    }

    /// Serve on an already bound listener
    pub fn serve(listener: TcpListener, responder: Responder) -> Self {
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let scenes = Arc::new(Mutex::new(Vec::new()));
        let batches = Arc::new(Mutex::new(Vec::new()));

        let sim = Self {
            port,
            accepted: Arc::clone(&accepted),
            scenes: Arc::clone(&scenes),
            batches: Arc::clone(&batches),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = accepted.fetch_add(1, Ordering::SeqCst);
                let responder = Arc::clone(&responder);
                let scenes = Arc::clone(&scenes);
                let batches = Arc::clone(&batches);

                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.into_split();
                    let mut batch_index = 0u64;
                    while let Ok(Some(body)) = codec::read_frame(&mut reader).await {
                        let document: Value = serde_json::from_slice(&body).unwrap();
                        if !document.is_array() {
                            scenes.lock().unwrap().push(document);
                            continue;
                        }
                        batches.lock().unwrap().push(document.clone());

                        for response in responder(connection, batch_index, &document) {
                            let bytes = codec::encode(&response).unwrap();
                            if codec::write_frame(&mut writer, &bytes).await.is_err() {
                                return;
                            }
                        }
                        batch_index += 1;
                    }
                });
            }
        });

        sim
    }

    /// Simulator that acknowledges every batch with the given goal flags
    pub async fn with_goals(goals: Vec<bool>) -> Self {
        Self::start(Arc::new(move |_, _, _| vec![success_response(&goals)])).await
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn scenes(&self) -> Vec<Value> {
        self.scenes.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Value> {
        self.batches.lock().unwrap().clone()
    }

    /// Transport settings pointing at this simulator with short budgets
    pub fn transport_config(&self) -> TransportConfig {
        fast_transport_config(self.port)
    }

    pub fn transport(&self, shutdown: Shutdown) -> Transport {
        Transport::new(self.transport_config(), shutdown)
    }
}

pub fn fast_transport_config(port: u16) -> TransportConfig {
    TransportConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_attempts: 5,
        connect_interval: Duration::from_millis(20),
        send_retry_interval: Duration::from_millis(10),
        response_timeout_ticks: 20,
        tick_interval: Duration::from_millis(10),
        liveness_interval: Duration::from_millis(50),
    }
}

/// Successful response reporting `goals` as the goal completion list
pub fn success_response(goals: &[bool]) -> Value {
    let goals: Vec<Value> = goals
        .iter()
        .enumerate()
        .map(|(goal_id, finished)| json!({"goal_id": goal_id, "isFinished": finished}))
        .collect();

    json!({
        "lastActionSuccess": "ActionSuccessful",
        "lastAction": {"commandNum": 0, "commandType": "Rotate"},
        "challengeProgress": {"ChallengeGoals": goals},
        "objects": [{"objectID": "TAM_1", "position": {"x": 1.0, "y": 0.0, "z": 2.0}}],
    })
}

/// Scene with `count` single-condition goals, one open container each
pub fn scene_with_goals(count: usize) -> MissionSpec {
    let goals = (0..count)
        .map(|index| {
            let letter = char::from(b'A' + index as u8);
            let target = ObjectInstanceId::new(format!("Fridge_{}", index + 1)).unwrap();
            let condition = StateCondition::new(
                format!("Open{}", letter),
                target.clone(),
                Expression::bool(BoolProperty::IsOpen, target, true),
            )
            .unwrap();
            TaskGoal::single(condition)
        })
        .collect();

    MissionSpec::new(json!({"roomLocation": ["BreakRoom"]}), goals).unwrap()
}

/// Agent action moving forward
pub fn move_forward() -> Value {
    json!({"id": "1", "type": "Move", "move": {"direction": "Forward", "magnitude": 1}})
}

/// Reasoning service replaying a fixed list of responses.
///
/// Once the script runs out, `fallback` is returned for every call.
pub struct ScriptedReasoning {
    script: Mutex<VecDeque<ReasoningResponse>>,
    fallback: ReasoningResponse,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoning {
    pub fn new(script: Vec<ReasoningResponse>, fallback: ReasoningResponse) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `actions`
    pub fn repeating(actions: Vec<Value>) -> Self {
        Self::new(Vec::new(), ReasoningResponse::from_actions(actions))
    }

    /// Perform `actions` once, then report nothing left to do
    pub fn once_then_idle(actions: Vec<Value>) -> Self {
        Self::new(
            vec![ReasoningResponse::from_actions(actions)],
            ReasoningResponse::default(),
        )
    }

    /// Shared handle usable where a trait object is expected
    pub fn service(self: &Arc<Self>) -> Arc<dyn ReasoningService> {
        let service: Arc<Self> = Arc::clone(self);
        service
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn next_actions(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn check_health(&self) -> Result<(), ReasoningError> {
        Ok(())
    }
}

/// Reasoning service that always fails
pub struct FailingReasoning;

#[async_trait]
impl ReasoningService for FailingReasoning {
    fn name(&self) -> &str {
        "failing"
    }

    async fn next_actions(
        &self,
        _request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        Err(ReasoningError::Unavailable("scripted outage".to_string()))
    }

    async fn check_health(&self) -> Result<(), ReasoningError> {
        Err(ReasoningError::Unavailable("scripted outage".to_string()))
    }
}
