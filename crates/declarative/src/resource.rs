//! Lifecycle contract between a host and the resources a provider offers
//!
//! A host drives every resource instance through the same five calls:
//! create, read, update, delete and import. Each call is an independent unit
//! of work; the host never runs two calls for the same instance at once, but
//! may run calls for different instances concurrently, hence `Send + Sync`.

use crate::schema::Schema;
use crate::types::{AttributeValues, Diagnostic, Diagnostics};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a lifecycle call that may produce state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// State to persist; `None` means the instance does not exist
    pub state: Option<AttributeValues>,
    pub diagnostics: Diagnostics,
}

impl Response {
    /// Successful call producing `state`
    pub fn ok(state: AttributeValues) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Call that leaves no state behind
    pub fn absent(diagnostics: impl Into<Diagnostics>) -> Self {
        Self {
            state: None,
            diagnostics: diagnostics.into(),
        }
    }

    /// Call that keeps `state` and reports `diagnostics` alongside it
    pub fn with_diagnostics(state: AttributeValues, diagnostics: impl Into<Diagnostics>) -> Self {
        Self {
            state: Some(state),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }
}

/// Core trait for a resource type
///
/// Implementations must never panic or leak errors across this boundary:
/// every failure is reported as a [`Diagnostic`] alongside an unchanged or
/// absent state.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Full type name, derived from the provider's type name
    fn type_name(&self, provider_type_name: &str) -> String;

    /// Attribute schema consumed by the host's validation layer
    fn schema(&self) -> Schema;

    /// Bring a new instance into existence from the planned values
    fn create(&self, plan: &AttributeValues) -> Response;

    /// Refresh persisted state
    fn read(&self, state: &AttributeValues) -> Response;

    /// Move an existing instance to the planned values
    fn update(&self, plan: &AttributeValues, state: &AttributeValues) -> Response;

    /// Remove an instance; the host drops the state unless errors are reported
    fn delete(&self, state: &AttributeValues) -> Diagnostics;

    /// Reconstruct state for an instance identified by `id`
    fn import_state(&self, id: &str) -> Response;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// A provider groups resource types under one type-name prefix
pub trait Provider: Send + Sync {
    /// Provider type name (prefix of every resource type name)
    fn type_name(&self) -> &str;

    /// All resource types this provider offers
    fn resources(&self) -> Vec<BoxedResource>;
}

/// Resource types of a provider, indexed by full type name
pub struct Registry {
    provider_type_name: String,
    resources: BTreeMap<String, BoxedResource>,
}

impl Registry {
    pub fn from_provider(provider: &dyn Provider) -> Self {
        let provider_type_name = provider.type_name().to_string();
        let resources = provider
            .resources()
            .into_iter()
            .map(|r| (r.type_name(&provider_type_name), r))
            .collect();

        Self {
            provider_type_name,
            resources,
        }
    }

    pub fn provider_type_name(&self) -> &str {
        &self.provider_type_name
    }

    /// Look up a resource by full type name
    pub fn get(&self, type_name: &str) -> Option<&dyn Resource> {
        self.resources.get(type_name).map(|r| r.as_ref())
    }

    /// Resolve a short name ("email") or full name ("message_email")
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.resources.contains_key(name) {
            return Some(name.to_string());
        }
        let full = format!("{}_{}", self.provider_type_name, name);
        self.resources.contains_key(&full).then_some(full)
    }

    /// Full type names in sorted order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Diagnostic for a type this registry does not know
    pub fn unknown_type(&self, type_name: &str) -> Diagnostic {
        Diagnostic::error(
            format!("Unknown resource type: {type_name}"),
            format!(
                "Provider '{}' offers: {}",
                self.provider_type_name,
                self.type_names().collect::<Vec<_>>().join(", ")
            ),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::testing::TestProvider;
    use super::*;

    #[test]
    fn test_registry_resolves_short_and_full_names() {
        let registry = Registry::from_provider(&TestProvider::default());
        assert_eq!(registry.resolve("thing").as_deref(), Some("test_thing"));
        assert_eq!(registry.resolve("test_thing").as_deref(), Some("test_thing"));
        assert!(registry.resolve("other").is_none());
        assert!(registry.get("test_thing").is_some());
    }

    #[test]
    fn test_unknown_type_lists_known_types() {
        let registry = Registry::from_provider(&TestProvider::default());
        let diag = registry.unknown_type("test_other");
        assert!(diag.is_error());
        assert!(diag.detail.contains("test_thing"));
    }
}
