//! Integration tests for the per-utterance session loop

mod common;

use std::sync::Arc;

use arena_engine::arena::ArenaClient;
use arena_engine::reasoning::ReasoningResponse;
use arena_engine::session::{SessionController, SessionPhase, DEFAULT_MAX_ITERATIONS};
use arena_engine::shutdown::Shutdown;
use common::{move_forward, scene_with_goals, FailingReasoning, FakeSimulator, ScriptedReasoning};
use sdk::errors::EngineError;
use serde_json::json;

/// Connected client with a scene of `goals` compiled goals loaded
async fn arena_with_goals(sim: &FakeSimulator, goals: usize) -> ArenaClient {
    let mut arena = ArenaClient::new(sim.transport(Shutdown::new()));
    arena.connect().await.unwrap();
    arena.load_scene(&scene_with_goals(goals)).await.unwrap();
    arena
}

async fn connected_arena(sim: &FakeSimulator) -> ArenaClient {
    arena_with_goals(sim, 1).await
}

#[tokio::test]
async fn test_no_actions_completes_after_one_iteration() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::repeating(vec![]));
    let controller = SessionController::new(
        reasoning.service(),
        DEFAULT_MAX_ITERATIONS,
        Shutdown::new(),
    );

    let outcome = controller
        .run(&mut arena, "T.20261018/idle", "say hello")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Completed);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.actions_taken.is_empty());
    assert!(sim.batches().is_empty());

    let requests = reasoning.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].utterance.as_deref(), Some("say hello"));
    assert!(requests[0].prior_action_statuses.is_empty());
}

#[tokio::test]
async fn test_agent_that_never_returns_control_is_aborted() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::repeating(vec![move_forward()]));
    let controller = SessionController::new(
        reasoning.service(),
        DEFAULT_MAX_ITERATIONS,
        Shutdown::new(),
    );

    let outcome = controller
        .run(&mut arena, "T.20261018/wander", "walk around")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Aborted);
    assert_eq!(outcome.iterations, DEFAULT_MAX_ITERATIONS);
    assert_eq!(outcome.actions_taken.len(), DEFAULT_MAX_ITERATIONS);
    assert_eq!(sim.batches().len(), DEFAULT_MAX_ITERATIONS);

    // Only the first request carries the utterance
    let requests = reasoning.requests();
    assert!(requests[0].utterance.is_some());
    assert!(requests[1..].iter().all(|request| request.utterance.is_none()));
    assert!(requests[1].prior_action_statuses[0].success);
}

#[tokio::test]
async fn test_dialog_with_successful_batch_returns_control() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::repeating(vec![
        move_forward(),
        json!({"id": "2", "type": "Dialog", "dialog": {"value": "Done"}}),
    ]));
    let controller = SessionController::new(reasoning.service(), 5, Shutdown::new());

    let outcome = controller
        .run(&mut arena, "T.20261018/move", "move forward")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.actions_taken, vec![move_forward()]);

    // Dialog actions never reach the simulator
    let batch = &sim.batches()[0];
    assert_eq!(batch.as_array().unwrap().len(), 1);
    assert_eq!(batch[0]["commandType"], "Move");
    assert_eq!(batch[0]["commandNum"], 0);
}

#[tokio::test]
async fn test_invalid_action_format_is_reported_and_loop_continues() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::once_then_idle(vec![
        json!({"id": "1", "type": "Teleport", "teleport": {}}),
    ]));
    let controller = SessionController::new(
        reasoning.service(),
        DEFAULT_MAX_ITERATIONS,
        Shutdown::new(),
    );

    let outcome = controller
        .run(&mut arena, "T.20261018/bad", "teleport")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Completed);
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.actions_taken.is_empty());
    assert!(sim.batches().is_empty());

    let requests = reasoning.requests();
    let status = &requests[1].prior_action_statuses[0];
    assert!(!status.success);
    assert_eq!(status.error_type, "IncorrectActionFormat");
    assert_eq!(status.action_type, "Teleport");
}

#[tokio::test]
async fn test_finished_goals_end_session_early() {
    let sim = FakeSimulator::with_goals(vec![true]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::repeating(vec![move_forward()]));
    let controller = SessionController::new(
        reasoning.service(),
        DEFAULT_MAX_ITERATIONS,
        Shutdown::new(),
    );

    let outcome = controller
        .run(&mut arena, "T.20261018/done", "open the fridge")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(sim.batches().len(), 1);
}

#[tokio::test]
async fn test_partial_progress_list_does_not_end_session() {
    // The simulator only ever reports goal 0, the scene has two goals
    let sim = FakeSimulator::with_goals(vec![true]).await;
    let mut arena = arena_with_goals(&sim, 2).await;
    let reasoning = Arc::new(ScriptedReasoning::repeating(vec![move_forward()]));
    let controller = SessionController::new(reasoning.service(), 3, Shutdown::new());

    let outcome = controller
        .run(&mut arena, "T.20261018/partial", "open both fridges")
        .await
        .unwrap();

    assert_eq!(outcome.phase, SessionPhase::Aborted);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(sim.batches().len(), 3);
    assert!(!arena.all_goals_finished());
    assert_eq!(arena.goal_completion(2).as_flags(), vec![1, 0]);
}

#[tokio::test]
async fn test_reasoning_failure_ends_session_with_error() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let controller = SessionController::new(
        Arc::new(FailingReasoning),
        DEFAULT_MAX_ITERATIONS,
        Shutdown::new(),
    );

    let err = controller
        .run(&mut arena, "T.20261018/down", "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReasoningService(_)));
}

#[tokio::test]
async fn test_world_snapshot_is_rebuilt_from_latest_response() {
    let sim = FakeSimulator::with_goals(vec![false]).await;
    let mut arena = connected_arena(&sim).await;
    let reasoning = Arc::new(ScriptedReasoning::new(
        vec![ReasoningResponse::from_actions(vec![move_forward()])],
        ReasoningResponse::default(),
    ));
    let controller = SessionController::new(reasoning.service(), 5, Shutdown::new());

    controller
        .run(&mut arena, "T.20261018/look", "move")
        .await
        .unwrap();

    let requests = reasoning.requests();
    let robot_info = &requests[1].world_state["robotInfo"];
    assert_eq!(robot_info.as_array().unwrap().len(), 1);
    assert_eq!(robot_info[0]["position"]["x"], 1.0);
    assert!(requests[0].world_state["robotInfo"].as_array().unwrap().is_empty());
}
