//! Property types - single typed values keyed by name inside an object.
//!
//! Every stored property row carries a kind tag; the closed `PropertyValue`
//! enum is dispatched by `match` and constructed back from that tag.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared kind of a property or class field.
///
/// `String` and `Text` share one value family (short vs. long storage);
/// `Password` values use the short-string representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Text,
    Password,
    Number,
    Date,
    Boolean,
    List,
}

impl PropertyKind {
    /// Get the string representation of the kind (the stored tag)
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Text => "text",
            PropertyKind::Password => "password",
            PropertyKind::Number => "number",
            PropertyKind::Date => "date",
            PropertyKind::Boolean => "boolean",
            PropertyKind::List => "list",
        }
    }

    /// Get all property kinds
    pub fn all() -> &'static [PropertyKind] {
        &[
            PropertyKind::String,
            PropertyKind::Text,
            PropertyKind::Password,
            PropertyKind::Number,
            PropertyKind::Date,
            PropertyKind::Boolean,
            PropertyKind::List,
        ]
    }

    /// The one alternate storage representation tried on a failed load.
    ///
    /// Only the short/long string pair drifts; every other kind has a
    /// single physical representation.
    pub fn drift_alternate(&self) -> Option<PropertyKind> {
        match self {
            PropertyKind::String | PropertyKind::Password => Some(PropertyKind::Text),
            PropertyKind::Text => Some(PropertyKind::String),
            _ => None,
        }
    }
}

impl FromStr for PropertyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Ok(PropertyKind::String),
            "text" | "textarea" => Ok(PropertyKind::Text),
            "password" => Ok(PropertyKind::Password),
            "number" | "numeric" => Ok(PropertyKind::Number),
            "date" | "datetime" => Ok(PropertyKind::Date),
            "boolean" | "bool" => Ok(PropertyKind::Boolean),
            "list" => Ok(PropertyKind::List),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    /// Short string
    String(String),
    /// Long text
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
    /// Ordered list of string items
    List(Vec<String>),
}

impl PropertyValue {
    /// The kind tag stored next to this value
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::Date(_) => PropertyKind::Date,
            PropertyValue::Boolean(_) => PropertyKind::Boolean,
            PropertyValue::List(_) => PropertyKind::List,
        }
    }

    /// String content, for both short and long representations
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Re-wrap a short/long string value under the given kind, leaving
    /// every other value untouched. Used when drift recovery settles on
    /// the class-declared representation.
    pub(crate) fn rewrapped(self, kind: PropertyKind) -> PropertyValue {
        match (self, kind) {
            (PropertyValue::String(s) | PropertyValue::Text(s), PropertyKind::Text) => {
                PropertyValue::Text(s)
            }
            (PropertyValue::String(s) | PropertyValue::Text(s), _) => PropertyValue::String(s),
            (value, _) => value,
        }
    }
}

/// A single typed value within an object, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self { name: name.into(), value }
    }

    pub fn kind(&self) -> PropertyKind {
        self.value.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in PropertyKind::all() {
            let s = kind.as_str();
            let parsed: PropertyKind = s.parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(PropertyKind::from_str("textarea").unwrap(), PropertyKind::Text);
        assert_eq!(PropertyKind::from_str("bool").unwrap(), PropertyKind::Boolean);
        assert!(PropertyKind::from_str("blob").is_err());
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(PropertyValue::String("a".into()).kind(), PropertyKind::String);
        assert_eq!(PropertyValue::Number(1.5).kind(), PropertyKind::Number);
        assert_eq!(PropertyValue::List(vec![]).kind(), PropertyKind::List);
    }

    #[test]
    fn test_drift_alternate() {
        assert_eq!(PropertyKind::String.drift_alternate(), Some(PropertyKind::Text));
        assert_eq!(PropertyKind::Text.drift_alternate(), Some(PropertyKind::String));
        assert_eq!(PropertyKind::Number.drift_alternate(), None);
    }

    #[test]
    fn test_rewrapped() {
        let v = PropertyValue::String("hello".into());
        assert_eq!(v.rewrapped(PropertyKind::Text), PropertyValue::Text("hello".into()));
        let v = PropertyValue::Text("hello".into());
        assert_eq!(v.rewrapped(PropertyKind::String), PropertyValue::String("hello".into()));
        let v = PropertyValue::Number(2.0);
        assert_eq!(v.rewrapped(PropertyKind::Text), PropertyValue::Number(2.0));
    }
}
