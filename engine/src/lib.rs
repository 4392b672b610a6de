//! Arena Engine Library
//!
//! This library provides the evaluation harness that drives an embodied agent
//! inside the arena simulator. It is used by both the main binary and
//! integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Cooperative shutdown signal
pub mod shutdown;

/// Length-prefixed JSON transport to the simulator
pub mod transport;

/// Reasoning service abstraction and HTTP client
pub mod reasoning;

/// Per-utterance interaction loop
pub mod session;

/// Simulator-facing client: scenes, action batches, goal progress
pub mod arena;

/// Mission evaluation, scoring and outcome persistence
pub mod evaluator;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
