//! Dynamically typed values exchanged with behavior scripts and event subscribers.
//!
//! Hook arguments, hook return values and event payloads are positional lists of [`Value`]s.
//! The arity and types of a given hook or event are a contract between the two sides, not
//! something the framework enforces; a mismatch surfaces as the receiving side treating the
//! value as absent and falling back to its documented default.

use glam::{DQuat, DVec3};

use crate::entity::EntityId;

/// A tagged dynamic value.
///
/// `Data` carries an opaque structured blob, the same representation the persistence
/// format uses for entity-specific state.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec3(DVec3),
    Quat(DQuat),
    Id(EntityId),
    Data(serde_json::Value),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric access; integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec3(&self) -> Option<DVec3> {
        match self {
            Value::Vec3(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_quat(&self) -> Option<DQuat> {
        match self {
            Value::Quat(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            Value::Id(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<DVec3> for Value {
    fn from(value: DVec3) -> Self {
        Value::Vec3(value)
    }
}

impl From<DQuat> for Value {
    fn from(value: DQuat) -> Self {
        Value::Quat(value)
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::Id(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Data(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_extraction_is_exact() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::Str("core:ship".into()).as_str(), Some("core:ship"));
        assert_eq!(Value::Id(EntityId(3)).as_id(), Some(EntityId(3)));

        // Wrong-type extraction yields None, not a panic or a coercion.
        assert_eq!(Value::Str("1".into()).as_i64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Null.as_vec3(), None);
    }

    #[test]
    fn numbers_widen_to_float() {
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Float(0.5).as_f64(), Some(0.5));
        // But floats do not narrow to int.
        assert_eq!(Value::Float(2.0).as_i64(), None);
    }

    #[test]
    fn from_impls_round_trip() {
        let v: Value = DVec3::new(1.0, 2.0, 3.0).into();
        assert_eq!(v.as_vec3(), Some(DVec3::new(1.0, 2.0, 3.0)));

        let q: Value = DQuat::IDENTITY.into();
        assert_eq!(q.as_quat(), Some(DQuat::IDENTITY));

        let d: Value = serde_json::json!({ "fuel": 0.5 }).into();
        assert_eq!(d.as_data(), Some(&serde_json::json!({ "fuel": 0.5 })));
    }
}
