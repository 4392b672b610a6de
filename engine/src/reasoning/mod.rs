//! Reasoning service abstraction
//!
//! The session loop asks a reasoning service for the next actions to take.
//! The [`ReasoningService`] trait defines that contract so the loop can run
//! against the HTTP service in production and against scripted stubs in
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::session::ActionStatus;
use crate::shutdown::Shutdown;
use sdk::errors::EngineError;

pub mod http;

pub use http::HttpReasoningClient;

/// Result type for reasoning service operations
pub type Result<T> = std::result::Result<T, ReasoningError>;

/// Action types that carry dialogue rather than simulator interaction
pub const DIALOG_ACTION_TYPES: [&str; 2] = ["Dialog", "LightweightDialog"];

/// Errors that can occur while talking to the reasoning service
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Failed to store world state: {0}")]
    WorldState(#[from] std::io::Error),
}

impl From<ReasoningError> for EngineError {
    fn from(err: ReasoningError) -> Self {
        EngineError::ReasoningService(err.to_string())
    }
}

/// One prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub session_id: String,

    /// Present only on the first iteration of an utterance
    pub utterance: Option<String>,

    /// World-state snapshot the service predicts from
    pub world_state: Value,

    pub prior_action_statuses: Vec<ActionStatus>,
}

/// Actions returned for one prediction, split by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResponse {
    pub interaction_actions: Vec<Value>,
    pub dialog_actions: Vec<Value>,

    /// The agent hands control back to the user after these actions
    pub should_return_control: bool,
}

impl ReasoningResponse {
    /// Split a raw action list. Control returns to the user whenever a
    /// `Dialog` action is present.
    pub fn from_actions(actions: Vec<Value>) -> Self {
        let should_return_control = actions.iter().any(|action| action_type(action) == Some("Dialog"));

        let (dialog_actions, interaction_actions): (Vec<Value>, Vec<Value>) =
            actions.into_iter().partition(|action| {
                action_type(action).is_some_and(|kind| DIALOG_ACTION_TYPES.contains(&kind))
            });

        Self {
            interaction_actions,
            dialog_actions,
            should_return_control,
        }
    }
}

fn action_type(action: &Value) -> Option<&str> {
    action.get("type").and_then(Value::as_str)
}

/// Reasoning service trait implemented by every prediction backend
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Predict the next actions for a session
    async fn next_actions(&self, request: &ReasoningRequest) -> Result<ReasoningResponse>;

    /// Single readiness probe
    async fn check_health(&self) -> Result<()>;
}

/// Probe the service until it reports healthy.
///
/// Sleeps `interval` between failed probes and gives up after `attempts`.
/// The wait is cut short when `shutdown` fires.
pub async fn wait_until_healthy(
    service: &dyn ReasoningService,
    attempts: u32,
    interval: Duration,
    shutdown: &Shutdown,
) -> std::result::Result<(), EngineError> {
    let mut last_error = None;

    for attempt in 1..=attempts {
        match service.check_health().await {
            Ok(()) => {
                tracing::info!("{} healthcheck succeeded", service.name());
                return Ok(());
            }
            Err(e) => {
                tracing::error!(
                    "{} healthcheck attempt {}/{} failed: {}",
                    service.name(),
                    attempt,
                    attempts,
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => return Err(EngineError::Cancelled),
            }
        }
    }

    Err(last_error
        .map(EngineError::from)
        .unwrap_or_else(|| EngineError::ReasoningService("no healthcheck attempts".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyService {
        failures: u32,
        probes: AtomicU32,
    }

    #[async_trait]
    impl ReasoningService for FlakyService {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn next_actions(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse> {
            Ok(ReasoningResponse::default())
        }

        async fn check_health(&self) -> Result<()> {
            let probe = self.probes.fetch_add(1, Ordering::SeqCst);
            if probe < self.failures {
                Err(ReasoningError::Unavailable("warming up".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_response_splits_dialog_actions() {
        let response = ReasoningResponse::from_actions(vec![
            json!({"id": "1", "type": "Goto", "goto": {"object": {"goToPoint": "BreakRoom_1"}}}),
            json!({"id": "2", "type": "LightweightDialog", "dialog": {"value": "On my way"}}),
            json!({"id": "3", "type": "Pickup", "pickup": {"object": {"name": "Mug"}}}),
        ]);

        assert_eq!(response.interaction_actions.len(), 2);
        assert_eq!(response.dialog_actions.len(), 1);
        assert!(!response.should_return_control);
    }

    #[test]
    fn test_dialog_returns_control() {
        let response =
            ReasoningResponse::from_actions(vec![json!({"type": "Dialog", "dialog": {}})]);
        assert!(response.interaction_actions.is_empty());
        assert!(response.should_return_control);
    }

    #[tokio::test]
    async fn test_wait_until_healthy_retries() {
        let service = FlakyService {
            failures: 2,
            probes: AtomicU32::new(0),
        };
        wait_until_healthy(&service, 5, Duration::from_millis(1), &Shutdown::new())
            .await
            .unwrap();
        assert_eq!(service.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_healthy_gives_up() {
        let service = FlakyService {
            failures: 10,
            probes: AtomicU32::new(0),
        };
        let err = wait_until_healthy(&service, 3, Duration::from_millis(1), &Shutdown::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReasoningService(_)));
        assert_eq!(service.probes.load(Ordering::SeqCst), 3);
    }
}
