//! `courier state list|show`

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{AttributeValues, Registry};
use serde_json::Value;

use crate::Context;
use crate::host::{self, state::HostState};
use crate::ui;

/// Stored attributes with every sensitive value replaced
fn redacted(registry: &Registry, resource_type: &str, attributes: &AttributeValues) -> AttributeValues {
    match registry.get(resource_type) {
        Some(resource) => resource.schema().redact(attributes),
        // Unknown type: nothing tells us what is secret, so show names only
        None => attributes
            .keys()
            .map(|k| (k.clone(), Value::String("(unknown type)".into())))
            .collect(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "(null)".dimmed().to_string(),
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

pub fn list(ctx: &Context) -> Result<()> {
    let state = HostState::load(&ctx.state)?;

    if state.resources.is_empty() {
        ui::info(&format!("No resources in {}", ctx.state.display()));
        return Ok(());
    }

    for (address, stored) in &state.resources {
        let id = stored
            .attributes
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("-");
        println!("{:<40} {}", address, id.dimmed());
    }
    Ok(())
}

pub fn show(ctx: &Context, address: &str) -> Result<()> {
    let registry = super::registry(ctx)?;
    let state = HostState::load(&ctx.state)?;

    let (resource_type, name) = host::parse_address(&registry, address)?;
    let address = format!("{resource_type}.{name}");
    let Some(stored) = state.get(&address) else {
        bail!("{address} is not in {}", ctx.state.display());
    };

    ui::header(&address);
    for (key, value) in redacted(&registry, &stored.resource_type, &stored.attributes) {
        ui::kv(&key, &render(&value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::mock_provider;
    use declarative::SENSITIVE_PLACEHOLDER;
    use mailkit::relay::MockRelay;
    use serde_json::json;

    #[test]
    fn test_show_redacts_password() {
        let registry = Registry::from_provider(&mock_provider(&MockRelay::new()));
        let mut attributes = AttributeValues::new();
        attributes.insert("to".into(), json!("b@x.com"));
        attributes.insert("smtp_password".into(), json!("hunter2"));

        let shown = redacted(&registry, "message_email", &attributes);
        assert_eq!(shown["smtp_password"], json!(SENSITIVE_PLACEHOLDER));
        assert_eq!(shown["to"], json!("b@x.com"));

        let unknown = redacted(&registry, "other_thing", &attributes);
        assert!(!unknown.values().any(|v| v == "hunter2"));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("B")), "\"B\"");
        assert_eq!(render(&json!(587)), "587");
    }
}
