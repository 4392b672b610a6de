//! Arena SDK
//!
//! Shared library providing the error taxonomy and the goal model used by the
//! engine and by mission tooling. Nothing in this crate performs I/O.

/// Error types and handling
pub mod errors;

/// Success-criteria expressions, state conditions and task goals
pub mod goals;

// Re-export commonly used types
pub use errors::{ArenaErrorExt, EngineError};
pub use goals::{
    compile, BoolProperty, Color, CompiledGoals, Expression, Fluid, GoalError, GoalRelation,
    MissionSpec, ObjectInstanceId, StateCondition, TaskGoal,
};
