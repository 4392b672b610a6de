use proptest::prelude::*;
use arena_engine::arena::GoalCompletion;
use arena_engine::config::Config;
use arena_engine::session::{translate, ActionKind};
use arena_engine::transport::codec;
use serde_json::{json, Value};

// Configuration round-trip: every serialized config parses back unchanged
proptest! {
    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        port in 1..=u16::MAX,
        connect_attempts in 1..=500u32,
        max_iterations in 1..=50usize,
        prefix in "[A-Za-z]{1,8}",
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level;
        config.simulator.port = port;
        config.simulator.connect_attempts = connect_attempts;
        config.session.max_iterations = max_iterations;
        config.evaluation.session_id_prefix = prefix;

        let toml_string = toml::to_string(&config).expect("Failed to serialize Config to string");
        let parsed: Config = toml::from_str(&toml_string).expect("Failed to deserialize TOML to Config");

        prop_assert_eq!(config.core.log_level, parsed.core.log_level);
        prop_assert_eq!(config.simulator.port, parsed.simulator.port);
        prop_assert_eq!(config.simulator.connect_attempts, parsed.simulator.connect_attempts);
        prop_assert_eq!(config.session.max_iterations, parsed.session.max_iterations);
        prop_assert_eq!(config.evaluation.session_id_prefix, parsed.evaluation.session_id_prefix);
    }
}

// Framing: the length prefix always describes exactly the JSON body
proptest! {
    #[test]
    fn test_frame_prefix_matches_body(text in ".{0,200}", number in any::<i64>()) {
        let payload = json!({"text": text, "number": number});
        let frame = codec::encode(&payload).unwrap();

        let (prefix, body) = frame.split_at(codec::LENGTH_PREFIX_BYTES);
        let declared = u32::from_le_bytes(prefix.try_into().unwrap()) as usize;
        prop_assert_eq!(declared, body.len());

        let decoded: Value = serde_json::from_slice(body).unwrap();
        prop_assert_eq!(decoded, payload);
    }
}

// Translation numbers commands by position and keeps their payloads
proptest! {
    #[test]
    fn test_translate_numbers_commands_in_order(
        directions in prop::collection::vec("Forward|Backward|Left|Right", 1..10),
    ) {
        let actions: Vec<Value> = directions
            .iter()
            .map(|direction| json!({"type": "Move", "move": {"direction": direction, "magnitude": 1}}))
            .collect();

        let commands = translate(&actions).unwrap();
        prop_assert_eq!(commands.len(), actions.len());
        for (index, (command, direction)) in commands.iter().zip(&directions).enumerate() {
            prop_assert_eq!(command["commandNum"].as_u64(), Some(index as u64));
            prop_assert_eq!(command["commandType"].as_str(), Some(ActionKind::Move.as_str()));
            prop_assert_eq!(command["move"]["direction"].as_str(), Some(direction.as_str()));
        }
    }
}

// Scoring: the subgoal rate is the finished share and success means all finished
proptest! {
    #[test]
    fn test_subgoal_rate_is_finished_share(finished in prop::collection::vec(any::<bool>(), 1..12)) {
        let completion = GoalCompletion::from_flags(finished.clone());
        let done = finished.iter().filter(|f| **f).count();

        prop_assert_eq!(completion.completed(), done);
        prop_assert!((completion.subgoal_rate() - done as f64 / finished.len() as f64).abs() < 1e-9);
        prop_assert_eq!(completion.success(), done == finished.len());
        prop_assert_eq!(completion.as_flags().len(), finished.len());
    }
}
