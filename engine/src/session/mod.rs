//! Session Controller
//!
//! A session drives one utterance to a natural stopping point. Each
//! iteration runs a snapshot-predict-execute cycle:
//!
//! 1. Build a world-state snapshot from the latest simulator response
//! 2. Ask the reasoning service for the next actions (the utterance is only
//!    passed on the first iteration)
//! 3. No interaction actions: the session is `Completed`
//! 4. Otherwise translate and execute them, deriving an [`ActionStatus`]
//! 5. Stop when the service returns control and the batch succeeded,
//!    otherwise loop with the latest status
//!
//! An untranslatable action list is recorded as `IncorrectActionFormat` and
//! the loop continues. Transport and reasoning-service failures end the
//! session with an error for the evaluator to classify.
//!
//! # Limits
//!
//! - `max_iterations` iterations per utterance (15 by default); running out
//!   leaves the session `Aborted`

pub mod actions;

pub use actions::{probe_action, translate, ActionKind, ActionStatus};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::arena::ArenaClient;
use crate::reasoning::{ReasoningRequest, ReasoningService};
use crate::shutdown::Shutdown;
use sdk::errors::EngineError;

/// Default iteration budget per utterance
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Where a session is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingInstruction,
    RequestingAction,
    ExecutingAction,
    Completed,
    Aborted,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::AwaitingInstruction => "awaiting_instruction",
            SessionPhase::RequestingAction => "requesting_action",
            SessionPhase::ExecutingAction => "executing_action",
            SessionPhase::Completed => "completed",
            SessionPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Mutable record of one session, discarded when it ends
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub iteration_count: usize,
    pub prior_action_statuses: Vec<ActionStatus>,
    pub actions_taken: Vec<Value>,
    phase: SessionPhase,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            iteration_count: 0,
            prior_action_statuses: Vec::new(),
            actions_taken: Vec::new(),
            phase: SessionPhase::AwaitingInstruction,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn transition(&mut self, next: SessionPhase) {
        debug!("Session {}: {} -> {}", self.session_id, self.phase, next);
        self.phase = next;
    }
}

/// Result of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// `Completed` or `Aborted`
    pub phase: SessionPhase,
    pub iterations: usize,

    /// Agent actions submitted to the simulator, in order
    pub actions_taken: Vec<Value>,
    pub last_status: Option<ActionStatus>,
}

/// Runs utterances against one simulator through a reasoning service
pub struct SessionController {
    reasoning: Arc<dyn ReasoningService>,
    max_iterations: usize,
    shutdown: Shutdown,
}

impl SessionController {
    pub fn new(reasoning: Arc<dyn ReasoningService>, max_iterations: usize, shutdown: Shutdown) -> Self {
        Self {
            reasoning,
            max_iterations,
            shutdown,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn reasoning(&self) -> &dyn ReasoningService {
        self.reasoning.as_ref()
    }

    /// Drive `utterance` until the agent completes it or the budget runs out
    #[instrument(skip(self, arena, utterance), fields(session = %session_id))]
    pub async fn run(
        &self,
        arena: &mut ArenaClient,
        session_id: &str,
        utterance: &str,
    ) -> Result<SessionOutcome, EngineError> {
        let mut state = SessionState::new(session_id);
        info!("Handling utterance: {}", utterance);

        while state.iteration_count < self.max_iterations {
            if arena.all_goals_finished() {
                info!("All goals are finished, ending session early");
                state.transition(SessionPhase::Completed);
                break;
            }

            let iteration = state.iteration_count;
            state.iteration_count += 1;
            state.transition(SessionPhase::RequestingAction);

            let request = ReasoningRequest {
                session_id: state.session_id.clone(),
                utterance: (iteration == 0).then(|| utterance.to_string()),
                world_state: arena.world_snapshot(),
                prior_action_statuses: state.prior_action_statuses.clone(),
            };

            let response = tokio::select! {
                response = self.reasoning.next_actions(&request) => response?,
                _ = self.shutdown.cancelled() => return Err(EngineError::Cancelled),
            };

            if response.interaction_actions.is_empty() {
                info!(
                    "Iteration {}: no actions to perform, returning control",
                    iteration
                );
                state.transition(SessionPhase::Completed);
                break;
            }

            state.transition(SessionPhase::ExecutingAction);
            let status = match translate(&response.interaction_actions) {
                Ok(commands) => {
                    let status = arena
                        .execute(&commands, &response.interaction_actions)
                        .await?;
                    state
                        .actions_taken
                        .extend(response.interaction_actions.iter().cloned());
                    status
                }
                Err(e) => {
                    warn!("Iteration {}: {}", iteration, e);
                    ActionStatus::incorrect_format(&response.interaction_actions)
                }
            };

            if !status.success {
                warn!(
                    "Iteration {}: {} failed with {}",
                    iteration, status.action_type, status.error_type
                );
            }

            let succeeded = status.success;
            state.prior_action_statuses = vec![status];

            if response.should_return_control && succeeded {
                debug!("Agent returned control after {} iterations", state.iteration_count);
                state.transition(SessionPhase::Completed);
                break;
            }
        }

        if state.phase() != SessionPhase::Completed {
            warn!(
                "Iteration budget of {} exhausted, aborting session",
                self.max_iterations
            );
            state.transition(SessionPhase::Aborted);
        }

        Ok(SessionOutcome {
            phase: state.phase(),
            iterations: state.iteration_count,
            actions_taken: state.actions_taken,
            last_status: state.prior_action_statuses.pop(),
        })
    }
}
