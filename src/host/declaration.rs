//! Declaration files
//!
//! A declaration file is TOML or JSON. Each top-level key names a resource
//! type (short `email` or full `message_email`) and maps instance names to
//! attribute tables:
//!
//! ```toml
//! [email.deploy_done]
//! to = "oncall@example.com"
//! subject = "Deploy finished"
//! body = "All green."
//! smtp_server = "smtp.example.com"
//! smtp_port = 587
//! ```

use anyhow::{Context, Result, bail};
use declarative::{AttributeValues, Registry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One declared resource instance, conformed to its schema
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// `<type>.<name>`
    pub address: String,
    pub resource_type: String,
    pub values: AttributeValues,
    /// File the declaration came from
    pub source: PathBuf,
}

type DeclarationFile = BTreeMap<String, BTreeMap<String, AttributeValues>>;

/// Format of a declaration file, from its extension
fn parse_file(path: &Path) -> Result<DeclarationFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid declaration file: {}", path.display())),
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid declaration file: {}", path.display())),
        _ => bail!(
            "Unsupported declaration file {} (expected .toml or .json)",
            path.display()
        ),
    }
}

/// Load and check every declaration in `files`, sorted by address
pub fn load(files: &[PathBuf], registry: &Registry) -> Result<Vec<Declaration>> {
    let mut declarations: BTreeMap<String, Declaration> = BTreeMap::new();

    for file in files {
        let parsed = parse_file(file)?;
        log::debug!("Read {} resource type(s) from {}", parsed.len(), file.display());

        for (type_key, instances) in parsed {
            let Some(resource_type) = registry.resolve(&type_key) else {
                bail!(
                    "{}: {}",
                    file.display(),
                    registry.unknown_type(&type_key).detail
                );
            };

            for (name, values) in instances {
                let declaration = declare(registry, &resource_type, &name, values, file)?;
                if let Some(existing) = declarations.get(&declaration.address) {
                    bail!(
                        "{} is declared twice ({} and {})",
                        declaration.address,
                        existing.source.display(),
                        file.display()
                    );
                }
                declarations.insert(declaration.address.clone(), declaration);
            }
        }
    }

    Ok(declarations.into_values().collect())
}

fn declare(
    registry: &Registry,
    resource_type: &str,
    name: &str,
    values: AttributeValues,
    file: &Path,
) -> Result<Declaration> {
    if name.is_empty() || name.contains('.') {
        bail!("{}: invalid resource name {:?}", file.display(), name);
    }

    let address = format!("{resource_type}.{name}");
    let Some(resource) = registry.get(resource_type) else {
        bail!("{}", registry.unknown_type(resource_type).detail);
    };
    let schema = resource.schema();

    for key in values.keys() {
        match schema.attribute(key) {
            None => bail!("{address}: unsupported attribute \"{key}\""),
            Some(attribute) if !attribute.requirement.is_configurable() => {
                bail!("{address}: \"{key}\" is computed and cannot be set")
            }
            Some(_) => {}
        }
    }

    Ok(Declaration {
        values: schema.conform(&values),
        address,
        resource_type: resource_type.to_string(),
        source: file.to_path_buf(),
    })
}
