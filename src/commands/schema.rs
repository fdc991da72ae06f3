//! `courier schema`

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{Registry, Schema};
use serde_json::json;

use crate::Context;
use crate::ui;

/// All schemas keyed by full type name, as JSON
fn schemas_json(registry: &Registry) -> serde_json::Value {
    let resources: serde_json::Map<String, serde_json::Value> = registry
        .type_names()
        .filter_map(|name| {
            let schema = serde_json::to_value(registry.get(name)?.schema()).ok()?;
            Some((name.to_string(), schema))
        })
        .collect();

    json!({
        "provider": registry.provider_type_name(),
        "resources": resources,
    })
}

fn print_schema(type_name: &str, schema: &Schema) {
    ui::section(type_name);
    ui::dim(&format!("{} (schema version {})", schema.description, schema.version));
    println!();

    for attribute in &schema.attributes {
        let mut flags = attribute.requirement.label().to_string();
        if attribute.sensitive {
            flags.push_str(", sensitive");
        }
        println!(
            "  {:<16} {:<8} {}",
            attribute.name.bold(),
            attribute.kind.to_string(),
            format!("({flags})").dimmed()
        );
        if !attribute.description.is_empty() {
            ui::dim(&format!("                  {}", attribute.description));
        }
    }
}

pub fn run(ctx: &Context, as_json: bool) -> Result<()> {
    let registry = super::registry(ctx)?;

    if as_json {
        let rendered = serde_json::to_string_pretty(&schemas_json(&registry))
            .context("Failed to serialize schema")?;
        println!("{rendered}");
        return Ok(());
    }

    ui::header(&format!("Provider: {}", registry.provider_type_name()));
    for type_name in registry.type_names() {
        if let Some(resource) = registry.get(type_name) {
            print_schema(type_name, &resource.schema());
        }
    }
    Ok(())
}
