//! Attribute schemas
//!
//! A [`Schema`] is the host-facing description of a resource type: which
//! attributes exist, their types, whether they are required, defaulted or
//! computed, and which ones hold secrets.

use crate::types::AttributeValues;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Bool,
}

impl AttributeType {
    /// Check whether a JSON value has this type (null always conforms)
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

/// How an attribute gets its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "default", rename_all = "snake_case")]
pub enum Requirement {
    /// Must be set by the caller
    Required,
    /// May be left unset
    Optional,
    /// Falls back to the given value when unset
    Defaulted(Value),
    /// Set by the provider only
    Computed,
    /// May be set; otherwise the provider decides
    OptionalComputed,
}

impl Requirement {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }

    /// Whether a caller may supply this attribute
    pub fn is_configurable(&self) -> bool {
        !matches!(self, Self::Computed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Defaulted(_) => "defaulted",
            Self::Computed => "computed",
            Self::OptionalComputed => "optional, computed",
        }
    }
}

/// A single attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    pub requirement: Requirement,
    /// Secret values are never rendered in plans, diffs, or logs
    #[serde(default)]
    pub sensitive: bool,
    pub description: String,
}

impl Attribute {
    fn new(name: &str, kind: AttributeType, requirement: Requirement, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            requirement,
            sensitive: false,
            description: description.to_string(),
        }
    }

    pub fn required(name: &str, kind: AttributeType, description: &str) -> Self {
        Self::new(name, kind, Requirement::Required, description)
    }

    pub fn optional(name: &str, kind: AttributeType, description: &str) -> Self {
        Self::new(name, kind, Requirement::Optional, description)
    }

    pub fn defaulted(name: &str, kind: AttributeType, default: Value, description: &str) -> Self {
        Self::new(name, kind, Requirement::Defaulted(default), description)
    }

    pub fn computed(name: &str, kind: AttributeType, description: &str) -> Self {
        Self::new(name, kind, Requirement::Computed, description)
    }

    pub fn optional_computed(name: &str, kind: AttributeType, description: &str) -> Self {
        Self::new(name, kind, Requirement::OptionalComputed, description)
    }

    /// Mark the attribute as holding a secret
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Schema of one resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped whenever the persisted layout changes
    pub version: u64,
    pub description: String,
    /// Attributes in declaration order
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(version: u64, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(|a| a.sensitive)
    }

    /// Names of all attributes in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Shape caller-supplied values the way a host's validation layer would.
    ///
    /// Fills defaults for unset defaulted attributes and converts numeric
    /// strings for number attributes. Anything else is left untouched so the
    /// resource can report it.
    pub fn conform(&self, values: &AttributeValues) -> AttributeValues {
        let mut conformed = values.clone();

        for attribute in &self.attributes {
            let current = conformed.get(&attribute.name).filter(|v| !v.is_null());

            match (&attribute.requirement, current) {
                (Requirement::Defaulted(default), None) => {
                    conformed.insert(attribute.name.clone(), default.clone());
                }
                (_, Some(Value::String(s))) if attribute.kind == AttributeType::Number => {
                    if let Ok(n) = s.trim().parse::<i64>() {
                        conformed.insert(attribute.name.clone(), Value::from(n));
                    }
                }
                _ => {}
            }
        }

        conformed
    }

    /// Copy of `values` with sensitive attributes replaced by a marker
    pub fn redact(&self, values: &AttributeValues) -> AttributeValues {
        values
            .iter()
            .map(|(name, value)| {
                if self.is_sensitive(name) && !value.is_null() {
                    (name.clone(), Value::String(SENSITIVE_PLACEHOLDER.to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

/// Text shown in place of a sensitive value
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";
