//! Diff computation between persisted and desired attribute values

use crate::schema::{Requirement, SENSITIVE_PLACEHOLDER, Schema};
use crate::types::AttributeValues;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What the host has to do to converge one resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

impl Action {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
            Self::NoOp => " ",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// A single attribute that differs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub sensitive: bool,
}

impl AttributeChange {
    /// Render the old value for display, hiding secrets
    pub fn render_before(&self) -> String {
        self.render(self.before.as_ref())
    }

    /// Render the new value for display, hiding secrets
    pub fn render_after(&self) -> String {
        self.render(self.after.as_ref())
    }

    fn render(&self, value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => "(null)".to_string(),
            Some(_) if self.sensitive => SENSITIVE_PLACEHOLDER.to_string(),
            Some(Value::String(s)) => format!("{s:?}"),
            Some(other) => other.to_string(),
        }
    }
}

/// A diff between current and desired state of a resource instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Address of the instance, e.g. `message_email.welcome`
    pub address: String,
    pub resource_type: String,
    pub action: Action,
    pub changes: Vec<AttributeChange>,
}

impl ResourceDiff {
    /// Compare prior state against desired values under `schema`.
    ///
    /// Computed attributes never cause a change; optional-computed ones only
    /// when the desired side sets them.
    pub fn compute(
        address: &str,
        resource_type: &str,
        schema: &Schema,
        prior: Option<&AttributeValues>,
        desired: Option<&AttributeValues>,
    ) -> Self {
        let (action, changes) = match (prior, desired) {
            (None, None) => (Action::NoOp, Vec::new()),
            (None, Some(desired)) => (Action::Create, attribute_changes(schema, None, Some(desired))),
            (Some(prior), None) => (Action::Delete, attribute_changes(schema, Some(prior), None)),
            (Some(prior), Some(desired)) => {
                let changes = attribute_changes(schema, Some(prior), Some(desired));
                if changes.is_empty() {
                    (Action::NoOp, changes)
                } else {
                    (Action::Update, changes)
                }
            }
        };

        Self {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
            action,
            changes,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.action != Action::NoOp
    }
}

fn is_set(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

fn attribute_changes(
    schema: &Schema,
    prior: Option<&AttributeValues>,
    desired: Option<&AttributeValues>,
) -> Vec<AttributeChange> {
    let mut changes = Vec::new();

    for attribute in &schema.attributes {
        let before = prior.and_then(|p| p.get(&attribute.name));
        let after = desired.and_then(|d| d.get(&attribute.name));

        // On update, only caller-owned values count as drift
        if prior.is_some() && desired.is_some() {
            match attribute.requirement {
                Requirement::Computed => continue,
                Requirement::OptionalComputed if !is_set(after) => continue,
                _ => {}
            }
        }

        let differs = match (is_set(before), is_set(after)) {
            (false, false) => false,
            (true, true) => before != after,
            _ => true,
        };

        if differs {
            changes.push(AttributeChange {
                name: attribute.name.clone(),
                before: before.filter(|v| !v.is_null()).cloned(),
                after: after.filter(|v| !v.is_null()).cloned(),
                sensitive: attribute.sensitive,
            });
        }
    }

    changes
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of instances to create
    pub additions: usize,
    /// Number of instances to update
    pub updates: usize,
    /// Number of instances to delete
    pub removals: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a ResourceDiff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.action {
                Action::Create => summary.additions += 1,
                Action::Update => summary.updates += 1,
                Action::Delete => summary.removals += 1,
                Action::NoOp => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.updates + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> HashMap<String, Vec<&ResourceDiff>> {
    let mut groups: HashMap<String, Vec<&ResourceDiff>> = HashMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(0, "test")
            .with_attribute(Attribute::required("body", AttributeType::String, "body"))
            .with_attribute(Attribute::optional_computed("from", AttributeType::String, "from"))
            .with_attribute(Attribute::optional("password", AttributeType::String, "pw").sensitive())
            .with_attribute(Attribute::computed("id", AttributeType::String, "id"))
    }

    fn values(pairs: &[(&str, Value)]) -> AttributeValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_when_no_prior() {
        let desired = values(&[("body", json!("B"))]);
        let diff = ResourceDiff::compute("t.a", "t", &schema(), None, Some(&desired));
        assert_eq!(diff.action, Action::Create);
        assert_eq!(diff.changes.len(), 1);
    }

    #[test]
    fn test_computed_attributes_do_not_cause_updates() {
        let prior = values(&[
            ("body", json!("B")),
            ("from", json!("a@x.com")),
            ("id", json!("b3:abc")),
        ]);
        let desired = values(&[("body", json!("B")), ("from", Value::Null)]);

        let diff = ResourceDiff::compute("t.a", "t", &schema(), Some(&prior), Some(&desired));
        assert_eq!(diff.action, Action::NoOp);
    }

    #[test]
    fn test_optional_computed_set_by_caller_is_compared() {
        let prior = values(&[("body", json!("B")), ("from", json!("a@x.com"))]);
        let desired = values(&[("body", json!("B")), ("from", json!("z@x.com"))]);

        let diff = ResourceDiff::compute("t.a", "t", &schema(), Some(&prior), Some(&desired));
        assert_eq!(diff.action, Action::Update);
        assert_eq!(diff.changes[0].name, "from");
    }

    #[test]
    fn test_sensitive_change_is_rendered_redacted() {
        let prior = values(&[("body", json!("B")), ("password", json!("old-secret"))]);
        let desired = values(&[("body", json!("B")), ("password", json!("new-secret"))]);

        let diff = ResourceDiff::compute("t.a", "t", &schema(), Some(&prior), Some(&desired));
        assert_eq!(diff.action, Action::Update);

        let change = &diff.changes[0];
        assert_eq!(change.render_before(), SENSITIVE_PLACEHOLDER);
        assert_eq!(change.render_after(), SENSITIVE_PLACEHOLDER);
        assert!(!format!("{}{}", change.render_before(), change.render_after()).contains("secret"));
    }

    #[test]
    fn test_summary_counts_actions() {
        let desired = values(&[("body", json!("B"))]);
        let diffs = vec![
            ResourceDiff::compute("t.a", "t", &schema(), None, Some(&desired)),
            ResourceDiff::compute("t.b", "t", &schema(), Some(&desired), None),
            ResourceDiff::compute("t.c", "t", &schema(), Some(&desired), Some(&desired)),
        ];

        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.total(), 2);
        assert_eq!(group_by_type(&diffs)["t"].len(), 3);
    }
}
