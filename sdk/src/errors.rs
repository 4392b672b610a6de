//! Error types and handling
//!
//! This module provides the error types used throughout the arena engine.
//! All errors implement the `ArenaErrorExt` trait which provides operator
//! hints and tells the caller whether the error is recoverable.
//!
//! # Propagation
//!
//! - The transport only raises the connection kinds (`ConnectionUnavailable`,
//!   `ConnectionLost`, `ResponseTimeout`) and `Cancelled`.
//! - The session controller raises `InvalidActionFormat`-class issues and
//!   otherwise absorbs per-iteration failures into its own state.
//! - The mission evaluator is the only layer that decides between fatal and
//!   retry, using [`ArenaErrorExt::is_retryable_mission`].
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{ArenaErrorExt, EngineError};
//!
//! let error = EngineError::ResponseTimeout { batch_id: 3 };
//! assert!(error.is_retryable_mission());
//!
//! let fatal_error = EngineError::ConnectionUnavailable { attempts: 250 };
//! assert!(!fatal_error.is_recoverable());
//! ```

use thiserror::Error;

/// Trait for arena error extensions
pub trait ArenaErrorExt {
    /// Returns a short hint for the operator running the evaluation
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors require a restart of the simulator or manual intervention.
    fn is_recoverable(&self) -> bool;

    /// Returns whether a mission that failed with this error may be retried
    /// once after restarting the simulator process.
    fn is_retryable_mission(&self) -> bool;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Transport errors
    #[error("Simulator unreachable after {attempts} connection attempts")]
    ConnectionUnavailable { attempts: u32 },

    #[error("Connection to the simulator was lost while waiting for batch {batch_id}")]
    ConnectionLost { batch_id: u64 },

    #[error("No response for batch {batch_id} within the tick budget")]
    ResponseTimeout { batch_id: u64 },

    // Session errors
    #[error("Invalid action format: {0}")]
    InvalidActionFormat(String),

    // Mission errors
    #[error("Mission launch failed: {0}")]
    MissionLaunchFailure(String),

    #[error("Goal status unavailable: {0}")]
    GoalQueryFailure(String),

    #[error("Invalid goal definition: {0}")]
    InvalidGoal(String),

    // Reasoning service errors
    #[error("Reasoning service error: {0}")]
    ReasoningService(String),

    // Shutdown requested while waiting
    #[error("Operation cancelled by shutdown signal")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArenaErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::ConnectionUnavailable { .. } => {
                "Simulator is not accepting connections. Check that it is running"
            }
            Self::ConnectionLost { .. } => "Simulator dropped the connection. It will reconnect",
            Self::ResponseTimeout { .. } => "Simulator stopped responding. Restart it",
            Self::InvalidActionFormat(_) => "Reasoning service returned a malformed action",
            Self::MissionLaunchFailure(_) => "Scene did not become ready. Check simulator logs",
            Self::GoalQueryFailure(_) => "Simulator did not report goal progress",
            Self::InvalidGoal(_) => "Fix the mission definition and validate it again",
            Self::ReasoningService(_) => "Reasoning service unavailable. Check its endpoint",
            Self::Cancelled => "Shutdown requested",
            Self::Json(_) => "Malformed JSON document",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionUnavailable { .. }
            | Self::MissionLaunchFailure(_)
            | Self::InvalidGoal(_)
            | Self::Config(_)
            | Self::Cancelled => false,

            _ => true,
        }
    }

    fn is_retryable_mission(&self) -> bool {
        matches!(self, Self::ResponseTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_retry_missions() {
        assert!(EngineError::ResponseTimeout { batch_id: 0 }.is_retryable_mission());
        assert!(!EngineError::ConnectionLost { batch_id: 0 }.is_retryable_mission());
        assert!(!EngineError::MissionLaunchFailure("probe".into()).is_retryable_mission());
        assert!(!EngineError::Cancelled.is_retryable_mission());
    }

    #[test]
    fn test_connection_lost_is_recoverable() {
        assert!(EngineError::ConnectionLost { batch_id: 1 }.is_recoverable());
        assert!(!EngineError::ConnectionUnavailable { attempts: 3 }.is_recoverable());
    }

    #[test]
    fn test_hints_are_not_empty() {
        let errors = [
            EngineError::Config("bad".into()),
            EngineError::GoalQueryFailure("missing".into()),
            EngineError::InvalidActionFormat("no type".into()),
        ];
        for error in errors {
            assert!(!error.user_hint().is_empty());
        }
    }
}
