//! Field values and references to stored data.
//!
//! Every entry of a UI-description file resolves to a [`FieldValue`]. Values
//! that point at objects or data channels inside the external store are
//! carried as [`DataRef`]s, which accept both the bare and the braced
//! (`{...}`) UUID spelling written by the store.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Data References
// ============================================================================

/// Identifier of an object, data channel or group inside the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataRef(pub Uuid);

impl DataRef {
    /// Placeholder used after a missing reference has been reported.
    pub const NIL: DataRef = DataRef(Uuid::nil());

    /// Parse a UUID, with or without surrounding braces.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(trimmed);
        Uuid::parse_str(inner).ok().map(DataRef)
    }

    /// Fresh random reference.
    pub fn new_v4() -> Self {
        DataRef(Uuid::new_v4())
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0)
    }
}

impl Serialize for DataRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        DataRef::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid uuid '{}'", text)))
    }
}

// ============================================================================
// Field Values
// ============================================================================

/// Effective value of a single field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Ref(DataRef),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Convert a JSON value. Empty strings mean "no value".
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) if s.trim().is_empty() => FieldValue::Null,
            Value::String(s) => match DataRef::parse(s) {
                Some(r) => FieldValue::Ref(r),
                None => FieldValue::Text(s.clone()),
            },
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(_) => FieldValue::Text(value.to_string()),
        }
    }

    /// Convert back to JSON. References are written braced.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Ref(r) => Value::String(r.to_string()),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of `Int` and `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view; floats are accepted when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data_ref(&self) -> Option<DataRef> {
        match self {
            FieldValue::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Int(_) | FieldValue::Float(_))
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Ref(_) => "reference",
            FieldValue::List(_) => "list",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) | FieldValue::Float(_) => 2,
            FieldValue::Text(_) => 3,
            FieldValue::Ref(_) => 4,
            FieldValue::List(_) => 5,
        }
    }

    /// Total order: numbers numerically, text lexically, mixed kinds by kind.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Ref(a), FieldValue::Ref(b)) => a.cmp(b),
            (FieldValue::List(a), FieldValue::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Ref(r) => write!(f, "{}", r),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(FieldValue::from_json(&value))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DataRef> for FieldValue {
    fn from(v: DataRef) -> Self {
        FieldValue::Ref(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

// ============================================================================
// Value-or-Reference Fields
// ============================================================================

/// A model-like quantity: a constant or a reference to a stored data channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueOrRef {
    Value(f64),
    Ref(DataRef),
}

impl ValueOrRef {
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Ref(r) => Some(ValueOrRef::Ref(*r)),
            other => other.as_f64().map(ValueOrRef::Value),
        }
    }

    pub fn constant(&self) -> Option<f64> {
        match self {
            ValueOrRef::Value(v) => Some(*v),
            ValueOrRef::Ref(_) => None,
        }
    }

    pub fn reference(&self) -> Option<DataRef> {
        match self {
            ValueOrRef::Ref(r) => Some(*r),
            ValueOrRef::Value(_) => None,
        }
    }
}

impl From<ValueOrRef> for FieldValue {
    fn from(v: ValueOrRef) -> Self {
        match v {
            ValueOrRef::Value(x) => FieldValue::Float(x),
            ValueOrRef::Ref(r) => FieldValue::Ref(r),
        }
    }
}

impl fmt::Display for ValueOrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueOrRef::Value(v) => write!(f, "{}", v),
            ValueOrRef::Ref(r) => write!(f, "{}", r),
        }
    }
}

/// Uncertainty attached to a data channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uncertainty {
    /// Same floor for every observation; must be non-negative.
    Constant(f64),
    /// One value per observation, read from a stored channel.
    PerObservation(DataRef),
}

impl Uncertainty {
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Ref(r) => Some(Uncertainty::PerObservation(*r)),
            other => other.as_f64().map(Uncertainty::Constant),
        }
    }
}

impl From<Uncertainty> for FieldValue {
    fn from(u: Uncertainty) -> Self {
        match u {
            Uncertainty::Constant(x) => FieldValue::Float(x),
            Uncertainty::PerObservation(r) => FieldValue::Ref(r),
        }
    }
}
