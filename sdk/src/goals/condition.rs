//! State conditions, task goals and goal compilation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::expression::{Expression, ObjectInstanceId};
use super::GoalError;

fn state_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]+$").expect("Invalid state name pattern"))
}

/// A named expression evaluated in the context of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStateCondition")]
pub struct StateCondition {
    #[serde(rename = "stateName")]
    pub name: String,

    /// Object instance the condition is attached to
    pub context: ObjectInstanceId,

    pub expression: Expression,
}

#[derive(Deserialize)]
struct RawStateCondition {
    #[serde(rename = "stateName")]
    name: String,
    context: ObjectInstanceId,
    expression: Expression,
}

impl TryFrom<RawStateCondition> for StateCondition {
    type Error = GoalError;

    fn try_from(raw: RawStateCondition) -> Result<Self, Self::Error> {
        StateCondition::new(raw.name, raw.context, raw.expression)
    }
}

impl StateCondition {
    pub fn new(
        name: impl Into<String>,
        context: ObjectInstanceId,
        expression: Expression,
    ) -> Result<Self, GoalError> {
        let name = name.into();
        if !state_name_pattern().is_match(&name) {
            return Err(GoalError::InvalidStateName(name));
        }
        Ok(Self {
            name,
            context,
            expression,
        })
    }
}

/// How the conditions of a task goal combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalRelation {
    And,
    #[default]
    Or,
}

impl GoalRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalRelation::And => "and",
            GoalRelation::Or => "or",
        }
    }
}

/// One scored goal of a mission
///
/// `goal_id` stays 0 until the goal list goes through [`compile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskGoal")]
pub struct TaskGoal {
    pub conditions: Vec<StateCondition>,

    #[serde(default)]
    pub relation: GoalRelation,

    #[serde(default)]
    pub goal_id: u32,
}

#[derive(Deserialize)]
struct RawTaskGoal {
    conditions: Vec<StateCondition>,
    #[serde(default)]
    relation: GoalRelation,
    #[serde(default)]
    goal_id: u32,
}

impl TryFrom<RawTaskGoal> for TaskGoal {
    type Error = GoalError;

    fn try_from(raw: RawTaskGoal) -> Result<Self, Self::Error> {
        let mut goal = TaskGoal::from_conditions(raw.conditions, raw.relation)?;
        goal.goal_id = raw.goal_id;
        Ok(goal)
    }
}

impl TaskGoal {
    /// Wrap state conditions into a goal. Order of `conditions` is kept.
    pub fn from_conditions(
        conditions: Vec<StateCondition>,
        relation: GoalRelation,
    ) -> Result<Self, GoalError> {
        if conditions.is_empty() {
            return Err(GoalError::EmptyTaskGoal);
        }
        Ok(Self {
            conditions,
            relation,
            goal_id: 0,
        })
    }

    pub fn single(condition: StateCondition) -> Self {
        Self {
            conditions: vec![condition],
            relation: GoalRelation::default(),
            goal_id: 0,
        }
    }
}

/// Goal list with ids `0..n` assigned in list order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TaskGoal>", into = "Vec<TaskGoal>")]
pub struct CompiledGoals(Vec<TaskGoal>);

impl CompiledGoals {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskGoal> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[TaskGoal] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<TaskGoal> {
        self.0
    }
}

impl From<Vec<TaskGoal>> for CompiledGoals {
    fn from(goals: Vec<TaskGoal>) -> Self {
        compile(goals)
    }
}

impl From<CompiledGoals> for Vec<TaskGoal> {
    fn from(goals: CompiledGoals) -> Self {
        goals.0
    }
}

impl<'a> IntoIterator for &'a CompiledGoals {
    type Item = &'a TaskGoal;
    type IntoIter = std::slice::Iter<'a, TaskGoal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Assign `goal_id = index` in list order.
///
/// Any ids already present are overwritten, so compiling an already compiled
/// list yields the same ids.
pub fn compile(goals: impl IntoIterator<Item = TaskGoal>) -> CompiledGoals {
    CompiledGoals(
        goals
            .into_iter()
            .enumerate()
            .map(|(index, mut goal)| {
                goal.goal_id = index as u32;
                goal
            })
            .collect(),
    )
}
