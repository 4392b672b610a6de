//! Example building a two-goal mission and printing its scene-load document

use sdk::goals::{
    BoolProperty, Expression, GoalRelation, MissionSpec, ObjectInstanceId, StateCondition,
    TaskGoal,
};
use sdk::GoalError;
use serde_json::json;

fn main() -> Result<(), GoalError> {
    let fridge = ObjectInstanceId::new("Fridge_1")?;
    let mug = ObjectInstanceId::new("Mug_1")?;

    // Goal 0: the fridge is open
    let fridge_open = StateCondition::new(
        "FridgeOpen",
        fridge.clone(),
        Expression::bool(BoolProperty::IsOpen, fridge.clone(), true),
    )?;

    // Goal 1: the mug is inside the fridge and filled with milk
    let mug_stored = StateCondition::new(
        "MugStored",
        mug.clone(),
        Expression::and(vec![
            Expression::contains(fridge, mug.clone()),
            Expression::filled_with(mug, "Milk")?,
        ])?,
    )?;

    let spec = MissionSpec::new(
        json!({"roomLocation": ["BreakRoom"], "layoutOverride": "OfficeLayout1"}),
        vec![
            TaskGoal::single(fridge_open),
            TaskGoal::from_conditions(vec![mug_stored], GoalRelation::And)?,
        ],
    )?;

    println!("Compiled {} goals", spec.goal_count());
    for goal in spec.goals() {
        let names: Vec<&str> = goal
            .conditions
            .iter()
            .map(|condition| condition.name.as_str())
            .collect();
        println!("  goal {}: {} ({})", goal.goal_id, names.join(", "), goal.relation.as_str());
    }

    match serde_json::to_string_pretty(&spec.scene_document()) {
        Ok(document) => println!("{}", document),
        Err(e) => println!("Failed to render document: {}", e),
    }

    Ok(())
}
