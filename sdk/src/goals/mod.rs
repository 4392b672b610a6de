//! Goal Model
//!
//! Typed success criteria for arena missions. An [`Expression`] tree is
//! wrapped in a named [`StateCondition`], conditions are grouped into
//! [`TaskGoal`]s, and the goal list is compiled into [`CompiledGoals`] which
//! assigns the stable `goal_id`s the simulator reports progress against.
//!
//! Everything here is immutable data: construction validates, nothing is
//! resolved against a live scene.

pub mod condition;
pub mod expression;
pub mod mission;

pub use condition::{compile, CompiledGoals, GoalRelation, StateCondition, TaskGoal};
pub use expression::{BoolProperty, Color, Expression, Fluid, ObjectInstanceId};
pub use mission::MissionSpec;

/// Errors raised while building or decoding goal definitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GoalError {
    #[error("Unknown expression tag: {0}")]
    UnknownExpression(String),

    #[error("Malformed expression: {0}")]
    MalformedExpression(String),

    #[error("Unknown fluid kind: {0}")]
    UnknownFluid(String),

    #[error("Unknown color: {0}")]
    UnknownColor(String),

    #[error("Invalid range distance: {0}")]
    InvalidDistance(f64),

    #[error("Aggregate expression {0} needs at least one child")]
    EmptyAggregate(&'static str),

    #[error("Object instance id must not be empty")]
    EmptyObjectId,

    #[error("Invalid state condition name '{0}': only ASCII letters are allowed")]
    InvalidStateName(String),

    #[error("Task goal needs at least one state condition")]
    EmptyTaskGoal,

    #[error("Mission needs at least one task goal")]
    NoGoals,

    #[error("Scene descriptor must be a JSON object")]
    InvalidScene,

    #[error("State condition '{0}' is defined twice with different contents")]
    ConflictingStateCondition(String),
}

impl From<GoalError> for crate::errors::EngineError {
    fn from(error: GoalError) -> Self {
        crate::errors::EngineError::InvalidGoal(error.to_string())
    }
}
