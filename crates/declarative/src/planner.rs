//! Execution planner - builds the list of lifecycle calls a host has to make

use crate::diff::{Action, DiffSummary, ResourceDiff};
use crate::types::AttributeValues;

/// One lifecycle call to make, with the values it needs
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub diff: ResourceDiff,
    /// Persisted state, if the instance exists
    pub prior: Option<AttributeValues>,
    /// Values the instance should converge to, if it should exist
    pub planned: Option<AttributeValues>,
}

impl PlannedChange {
    pub fn address(&self) -> &str {
        &self.diff.address
    }

    pub fn action(&self) -> Action {
        self.diff.action
    }
}

/// An execution plan: one entry per resource instance
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub changes: Vec<PlannedChange>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the plan
    pub fn push(&mut self, change: PlannedChange) {
        self.changes.push(change);
    }

    /// Entries that actually require a lifecycle call
    pub fn pending(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes.iter().filter(|c| c.diff.has_changes())
    }

    /// Diffs of all entries, including no-ops
    pub fn diffs(&self) -> impl Iterator<Item = &ResourceDiff> {
        self.changes.iter().map(|c| &c.diff)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.diffs())
    }

    /// Filter plan to only include entries matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlannedChange) -> bool,
    {
        Self {
            changes: self.changes.into_iter().filter(|c| predicate(c)).collect(),
        }
    }

    /// Filter plan to only include entries matching a target pattern
    ///
    /// Target format: "type" or "type.name"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|c| matches_filter(&c.diff, resource_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Number of entries requiring a lifecycle call
    pub fn total_changes(&self) -> usize {
        self.pending().count()
    }

    /// Check if plan has nothing to do
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }
}

/// Parse a target string like "type.name" into (type, name)
pub fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a diff matches the filter criteria
///
/// The type part matches either the full type name or its suffix after the
/// provider prefix, so `email` selects `message_email`.
fn matches_filter(diff: &ResourceDiff, resource_type: Option<&str>, name: Option<&str>) -> bool {
    if let Some(rt) = resource_type {
        let matches_type =
            diff.resource_type == rt || diff.resource_type.ends_with(&format!("_{rt}"));
        if !matches_type {
            return false;
        }
    }

    if let Some(n) = name {
        let instance = diff
            .address
            .split_once('.')
            .map_or(diff.address.as_str(), |(_, instance)| instance);
        if instance != n {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn change(address: &str, resource_type: &str) -> PlannedChange {
        let planned = AttributeValues::new();
        PlannedChange {
            diff: ResourceDiff::compute(
                address,
                resource_type,
                &Schema::new(0, "test"),
                None,
                Some(&planned),
            ),
            prior: None,
            planned: Some(planned),
        }
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("email"), (Some("email".to_string()), None));
        assert_eq!(
            parse_target("message_email.welcome"),
            (
                Some("message_email".to_string()),
                Some("welcome".to_string())
            )
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }

    #[test]
    fn test_filter_by_target() {
        let mut plan = ExecutionPlan::new();
        plan.push(change("message_email.welcome", "message_email"));
        plan.push(change("message_email.goodbye", "message_email"));
        plan.push(change("message_sms.welcome", "message_sms"));

        let plan = plan.filter_by_target(Some("email"));
        assert_eq!(plan.total_changes(), 2);

        let plan = plan.filter_by_target(Some("message_email.welcome"));
        assert_eq!(plan.total_changes(), 1);
        assert_eq!(plan.changes[0].address(), "message_email.welcome");
    }

    #[test]
    fn test_no_op_entries_are_not_pending() {
        let values = AttributeValues::new();
        let mut plan = ExecutionPlan::new();
        plan.push(PlannedChange {
            diff: ResourceDiff::compute(
                "t.a",
                "t",
                &Schema::new(0, "test"),
                Some(&values),
                Some(&values),
            ),
            prior: Some(values.clone()),
            planned: Some(values),
        });

        assert!(plan.is_empty());
        assert_eq!(plan.changes.len(), 1);
    }
}
