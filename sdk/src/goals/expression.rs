//! Success-criteria expressions
//!
//! On the wire every expression is a single-key JSON object whose key names
//! the expression kind, e.g. `{"isOpen": {"target": "Fridge_1", "value": true}}`.
//! In memory it is the [`Expression`] sum type, so a malformed or unknown tag
//! fails at decode time instead of surviving as an opaque map.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::GoalError;

/// Identifier of an object instance in the scene, kept verbatim.
///
/// Wildcard suffix markers and instance numbers are not interpreted here;
/// cross-checking against the scene happens where missions are generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectInstanceId(String);

impl ObjectInstanceId {
    pub fn new(id: impl Into<String>) -> Result<Self, GoalError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GoalError::EmptyObjectId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectInstanceId {
    type Error = GoalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectInstanceId> for String {
    fn from(id: ObjectInstanceId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boolean object properties the simulator can check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolProperty {
    IsToggledOn,
    IsPickedUp,
    IsPowered,
    IsBroken,
    IsOpen,
    IsScanned,
    IsUsed,
    IsOverloaded,
    IsEmbiggenated,
    IsDirty,
    IsHot,
    IsCold,
    IsReceptacle,
    IsFullOfItems,
}

impl BoolProperty {
    pub const ALL: [BoolProperty; 14] = [
        BoolProperty::IsToggledOn,
        BoolProperty::IsPickedUp,
        BoolProperty::IsPowered,
        BoolProperty::IsBroken,
        BoolProperty::IsOpen,
        BoolProperty::IsScanned,
        BoolProperty::IsUsed,
        BoolProperty::IsOverloaded,
        BoolProperty::IsEmbiggenated,
        BoolProperty::IsDirty,
        BoolProperty::IsHot,
        BoolProperty::IsCold,
        BoolProperty::IsReceptacle,
        BoolProperty::IsFullOfItems,
    ];

    /// Key used for this property on the wire
    pub fn key(&self) -> &'static str {
        match self {
            BoolProperty::IsToggledOn => "isToggledOn",
            BoolProperty::IsPickedUp => "isPickedUp",
            BoolProperty::IsPowered => "isPowered",
            BoolProperty::IsBroken => "isBroken",
            BoolProperty::IsOpen => "isOpen",
            BoolProperty::IsScanned => "isScanned",
            BoolProperty::IsUsed => "isUsed",
            BoolProperty::IsOverloaded => "isOverloaded",
            BoolProperty::IsEmbiggenated => "isEmbiggenated",
            BoolProperty::IsDirty => "isDirty",
            BoolProperty::IsHot => "isHot",
            BoolProperty::IsCold => "isCold",
            BoolProperty::IsReceptacle => "IsReceptacle",
            BoolProperty::IsFullOfItems => "isFullOfItems",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|property| property.key() == key)
    }
}

/// Fluids an object can be filled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fluid {
    Water,
    Milk,
    Coffee,
}

impl Fluid {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fluid::Water => "Water",
            Fluid::Milk => "Milk",
            Fluid::Coffee => "Coffee",
        }
    }
}

impl FromStr for Fluid {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Water" => Ok(Fluid::Water),
            "Milk" => Ok(Fluid::Milk),
            "Coffee" => Ok(Fluid::Coffee),
            other => Err(GoalError::UnknownFluid(other.to_string())),
        }
    }
}

/// Colors produced by the color changer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        }
    }
}

impl FromStr for Color {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Red" => Ok(Color::Red),
            "Green" => Ok(Color::Green),
            "Blue" => Ok(Color::Blue),
            other => Err(GoalError::UnknownColor(other.to_string())),
        }
    }
}

const TAG_CONTAINS: &str = "Contains";
const TAG_FILLED_WITH: &str = "isFilledWith";
const TAG_IN_RANGE: &str = "IsInRange";
const TAG_COLOR_CHANGED: &str = "ColorMetaDataChange";
const TAG_AND: &str = "AND";
const TAG_OR: &str = "OR";
const TAG_NOT: &str = "NOT";

/// A success-criteria expression tree.
///
/// Child order of `And`/`Or` is preserved through every transformation.
/// Single-child aggregates are kept as written.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Bool {
        property: BoolProperty,
        target: ObjectInstanceId,
        value: bool,
    },
    Contains {
        container: ObjectInstanceId,
        contained: ObjectInstanceId,
    },
    FilledWith {
        target: ObjectInstanceId,
        fluid: Fluid,
    },
    InRange {
        target: ObjectInstanceId,
        distance: f64,
    },
    ColorChanged {
        target: ObjectInstanceId,
        color: Color,
    },
    And {
        children: Vec<Expression>,
    },
    Or {
        children: Vec<Expression>,
    },
    Not {
        child: Box<Expression>,
    },
}

impl Expression {
    pub fn bool(property: BoolProperty, target: ObjectInstanceId, value: bool) -> Self {
        Expression::Bool {
            property,
            target,
            value,
        }
    }

    pub fn contains(container: ObjectInstanceId, contained: ObjectInstanceId) -> Self {
        Expression::Contains {
            container,
            contained,
        }
    }

    /// Build a fill check; `fluid` must name a known [`Fluid`].
    pub fn filled_with(target: ObjectInstanceId, fluid: &str) -> Result<Self, GoalError> {
        Ok(Expression::FilledWith {
            target,
            fluid: fluid.parse()?,
        })
    }

    pub fn in_range(target: ObjectInstanceId, distance: f64) -> Result<Self, GoalError> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(GoalError::InvalidDistance(distance));
        }
        Ok(Expression::InRange { target, distance })
    }

    pub fn color_changed(target: ObjectInstanceId, color: &str) -> Result<Self, GoalError> {
        Ok(Expression::ColorChanged {
            target,
            color: color.parse()?,
        })
    }

    pub fn and(children: Vec<Expression>) -> Result<Self, GoalError> {
        if children.is_empty() {
            return Err(GoalError::EmptyAggregate(TAG_AND));
        }
        Ok(Expression::And { children })
    }

    pub fn or(children: Vec<Expression>) -> Result<Self, GoalError> {
        if children.is_empty() {
            return Err(GoalError::EmptyAggregate(TAG_OR));
        }
        Ok(Expression::Or { children })
    }

    pub fn not(child: Expression) -> Self {
        Expression::Not {
            child: Box::new(child),
        }
    }

    /// Wire tag of this expression
    pub fn tag(&self) -> &'static str {
        match self {
            Expression::Bool { property, .. } => property.key(),
            Expression::Contains { .. } => TAG_CONTAINS,
            Expression::FilledWith { .. } => TAG_FILLED_WITH,
            Expression::InRange { .. } => TAG_IN_RANGE,
            Expression::ColorChanged { .. } => TAG_COLOR_CHANGED,
            Expression::And { .. } => TAG_AND,
            Expression::Or { .. } => TAG_OR,
            Expression::Not { .. } => TAG_NOT,
        }
    }

    /// Render the single-key wire object
    pub fn to_value(&self) -> Value {
        let body = match self {
            Expression::Bool { target, value, .. } => {
                json!({ "target": target.as_str(), "value": value, "message": "" })
            }
            Expression::Contains {
                container,
                contained,
            } => json!({
                "target": container.as_str(),
                "contains": contained.as_str(),
                "message": "",
                "anchorPoint": "",
            }),
            Expression::FilledWith { target, fluid } => {
                json!({ "target": target.as_str(), "fluid": fluid.as_str(), "message": "" })
            }
            Expression::InRange { target, distance } => {
                json!({ "target": target.as_str(), "value": distance, "message": "" })
            }
            Expression::ColorChanged { target, color } => {
                json!({ "target": target.as_str(), "colorvalue": color.as_str(), "message": "" })
            }
            Expression::And { children } | Expression::Or { children } => {
                json!({ "expressions": children.iter().map(Expression::to_value).collect::<Vec<_>>() })
            }
            Expression::Not { child } => {
                json!({ "expression": child.to_value(), "message": "" })
            }
        };

        let mut root = Map::with_capacity(1);
        root.insert(self.tag().to_string(), body);
        Value::Object(root)
    }

    /// Decode a single-key wire object. Unknown tags are rejected.
    pub fn from_value(value: &Value) -> Result<Self, GoalError> {
        let root = value
            .as_object()
            .ok_or_else(|| GoalError::MalformedExpression("expected a JSON object".into()))?;

        let mut entries = root.iter();
        let (tag, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(GoalError::MalformedExpression(format!(
                    "expected exactly one key, found {}",
                    root.len()
                )))
            }
        };

        let body = body.as_object().ok_or_else(|| {
            GoalError::MalformedExpression(format!("body of '{}' is not an object", tag))
        })?;

        if let Some(property) = BoolProperty::from_key(tag) {
            return Ok(Expression::Bool {
                property,
                target: object_field(tag, body, "target")?,
                value: body.get("value").and_then(Value::as_bool).ok_or_else(|| {
                    GoalError::MalformedExpression(format!("'{}' needs a boolean value", tag))
                })?,
            });
        }

        match tag.as_str() {
            TAG_CONTAINS => Ok(Expression::Contains {
                container: object_field(tag, body, "target")?,
                contained: object_field(tag, body, "contains")?,
            }),
            TAG_FILLED_WITH => Ok(Expression::FilledWith {
                target: object_field(tag, body, "target")?,
                fluid: str_field(tag, body, "fluid")?.parse()?,
            }),
            TAG_IN_RANGE => {
                let distance = body.get("value").and_then(Value::as_f64).ok_or_else(|| {
                    GoalError::MalformedExpression(format!("'{}' needs a numeric value", tag))
                })?;
                Expression::in_range(object_field(tag, body, "target")?, distance)
            }
            TAG_COLOR_CHANGED => Ok(Expression::ColorChanged {
                target: object_field(tag, body, "target")?,
                color: str_field(tag, body, "colorvalue")?.parse()?,
            }),
            TAG_AND => Expression::and(children_field(tag, body)?),
            TAG_OR => Expression::or(children_field(tag, body)?),
            TAG_NOT => {
                let child = body.get("expression").ok_or_else(|| {
                    GoalError::MalformedExpression("'NOT' needs an expression".into())
                })?;
                Ok(Expression::not(Expression::from_value(child)?))
            }
            other => Err(GoalError::UnknownExpression(other.to_string())),
        }
    }
}

fn str_field<'a>(tag: &str, body: &'a Map<String, Value>, key: &str) -> Result<&'a str, GoalError> {
    body.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| GoalError::MalformedExpression(format!("'{}' needs a '{}' string", tag, key)))
}

fn object_field(
    tag: &str,
    body: &Map<String, Value>,
    key: &str,
) -> Result<ObjectInstanceId, GoalError> {
    ObjectInstanceId::new(str_field(tag, body, key)?)
}

fn children_field(tag: &str, body: &Map<String, Value>) -> Result<Vec<Expression>, GoalError> {
    body.get("expressions")
        .and_then(Value::as_array)
        .ok_or_else(|| GoalError::MalformedExpression(format!("'{}' needs an expressions list", tag)))?
        .iter()
        .map(Expression::from_value)
        .collect()
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Expression::from_value(&raw).map_err(D::Error::custom)
    }
}
