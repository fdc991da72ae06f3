//! Host state file
//!
//! What a real orchestrator would persist between runs: the state returned
//! by the last successful lifecycle call of every managed resource.
//!
//! ```json
//! {
//!   "version": 1,
//!   "resources": {
//!     "message_email.welcome": { "type": "message_email", "attributes": { ... } }
//!   }
//! }
//! ```

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use declarative::{AttributeValues, ChangeOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub attributes: AttributeValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    pub version: u32,
    /// Last time the state was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resources: BTreeMap<String, StoredResource>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_updated: None,
            resources: BTreeMap::new(),
        }
    }
}

impl HostState {
    /// Load state from disk, or return an empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version != STATE_VERSION {
            bail!(
                "Unsupported state version {} in {} (expected {})",
                state.version,
                path.display(),
                STATE_VERSION
            );
        }

        log::debug!(
            "Loaded {} resource(s) from {}",
            state.resources.len(),
            path.display()
        );
        Ok(state)
    }

    /// Write the state through a temporary file and a rename
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&StoredResource> {
        self.resources.get(address)
    }

    pub fn insert(&mut self, address: &str, resource_type: &str, attributes: AttributeValues) {
        self.resources.insert(
            address.to_string(),
            StoredResource {
                resource_type: resource_type.to_string(),
                attributes,
            },
        );
    }

    /// Take over the state a lifecycle call left behind
    pub fn record(&mut self, outcome: &ChangeOutcome) {
        match &outcome.state {
            Some(attributes) => {
                self.insert(&outcome.address, &outcome.resource_type, attributes.clone());
            }
            None => {
                self.resources.remove(&outcome.address);
            }
        }
    }
}
