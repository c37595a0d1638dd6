//! Typed attribute values.
//!
//! Every value that flows between the metaverse, staging records and pending
//! exports is one of these variants. There is deliberately no `Null` variant:
//! an attribute with no values is represented by an empty value list, and an
//! explicit clear by an `Option::None` intended value on a change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Data type of an attribute definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    String,
    Integer,
    LongInteger,
    Boolean,
    Binary,
    Guid,
    DateTime,
    Reference,
}

impl AttributeDataType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeDataType::String => "string",
            AttributeDataType::Integer => "integer",
            AttributeDataType::LongInteger => "long_integer",
            AttributeDataType::Boolean => "boolean",
            AttributeDataType::Binary => "binary",
            AttributeDataType::Guid => "guid",
            AttributeDataType::DateTime => "date_time",
            AttributeDataType::Reference => "reference",
        }
    }
}

impl fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an attribute holds one value or a set of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributePlurality {
    #[default]
    SingleValued,
    MultiValued,
}

impl AttributePlurality {
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributePlurality::MultiValued)
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Text value. Comparisons are case-sensitive unless a caller folds case.
    String(String),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    LongInteger(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Unique identifier.
    Guid(Uuid),
    /// Point in time.
    DateTime(DateTime<Utc>),
    /// Resolved reference to another object (metaverse or staging record id).
    Reference(Uuid),
    /// Reference that still has to be resolved into the target system's
    /// identifier at export time. Holds the referenced record's identifier.
    UnresolvedReference(String),
}

impl AttributeValue {
    /// Data type of this value.
    #[must_use]
    pub fn data_type(&self) -> AttributeDataType {
        match self {
            AttributeValue::String(_) => AttributeDataType::String,
            AttributeValue::Integer(_) => AttributeDataType::Integer,
            AttributeValue::LongInteger(_) => AttributeDataType::LongInteger,
            AttributeValue::Boolean(_) => AttributeDataType::Boolean,
            AttributeValue::Binary(_) => AttributeDataType::Binary,
            AttributeValue::Guid(_) => AttributeDataType::Guid,
            AttributeValue::DateTime(_) => AttributeDataType::DateTime,
            AttributeValue::Reference(_) | AttributeValue::UnresolvedReference(_) => {
                AttributeDataType::Reference
            }
        }
    }

    /// Whether the value carries no data (empty string or empty binary).
    ///
    /// Empty values are treated the same as an unset attribute by matching
    /// and evaluation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::String(s) | AttributeValue::UnresolvedReference(s) => s.is_empty(),
            AttributeValue::Binary(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Get as a string slice if this is a string value.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Identifier of the referenced record, if this is an unresolved reference.
    #[must_use]
    pub fn unresolved_reference(&self) -> Option<&str> {
        match self {
            AttributeValue::UnresolvedReference(id) => Some(id),
            _ => None,
        }
    }

    /// Whether this value is a reference that has not been resolved yet.
    #[must_use]
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, AttributeValue::UnresolvedReference(_))
    }

    /// Canonical text used to key a value inside a change set.
    ///
    /// Unresolved references key on the referenced identifier; every other
    /// variant keys on its literal text form.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        match self {
            AttributeValue::UnresolvedReference(id) => id.clone(),
            other => other.to_string(),
        }
    }

    /// Equality that optionally folds case for string values.
    ///
    /// Non-string values always compare exactly.
    #[must_use]
    pub fn matches(&self, other: &AttributeValue, case_sensitive: bool) -> bool {
        match (self, other) {
            (AttributeValue::String(a), AttributeValue::String(b)) if !case_sensitive => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => self == other,
        }
    }

    /// Convert to a JSON value for expression contexts and previews.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::String(s) | AttributeValue::UnresolvedReference(s) => {
                serde_json::Value::String(s.clone())
            }
            AttributeValue::Integer(i) => serde_json::Value::from(*i),
            AttributeValue::LongInteger(i) => serde_json::Value::from(*i),
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Binary(bytes) => serde_json::Value::Array(
                bytes.iter().map(|b| serde_json::Value::from(*b)).collect(),
            ),
            AttributeValue::Guid(u) | AttributeValue::Reference(u) => {
                serde_json::Value::String(u.to_string())
            }
            AttributeValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        }
    }

    /// Convert a scalar JSON value into an attribute value.
    ///
    /// Returns `None` for null, arrays and objects; callers flatten arrays
    /// themselves.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(AttributeValue::String(s.clone())),
            serde_json::Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(|i| match i32::try_from(i) {
                Ok(small) => AttributeValue::Integer(small),
                Err(_) => AttributeValue::LongInteger(i),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::LongInteger(i) => write!(f, "{i}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Binary(bytes) => write!(f, "<binary {} bytes>", bytes.len()),
            AttributeValue::Guid(u) => write!(f, "{u}"),
            AttributeValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            AttributeValue::Reference(u) => write!(f, "ref:{u}"),
            AttributeValue::UnresolvedReference(id) => write!(f, "unresolved-ref:{id}"),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::LongInteger(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(u: Uuid) -> Self {
        AttributeValue::Guid(u)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(dt)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}
