//! Provider configuration (`config.toml`)
//!
//! ```toml
//! [provider]
//! default_sender = "noreply@example.com"
//! timeout_secs = 30
//! tls = "opportunistic"   # none | opportunistic | required | wrapper
//!
//! [ledger]
//! path = "~/.local/state/courier/ledger.toml"
//! ```
//!
//! Every key is optional and a missing file means all defaults.

use crate::paths;
use anyhow::{Context, Result, bail};
use mailkit::{DispatchOptions, TlsMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Sender for resources that set no `from`
    #[serde(default)]
    pub default_sender: Option<String>,
    /// SMTP connect/read/write timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tls: TlsMode,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_sender: None,
            timeout_secs: default_timeout_secs(),
            tls: TlsMode::default(),
        }
    }
}

impl ProviderConfig {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            tls: self.tls,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Ledger file; `~` and `$VARS` are expanded
    #[serde(default)]
    pub path: Option<String>,
}

impl CourierConfig {
    /// Load from `path`, or from the default config file.
    ///
    /// An explicitly given file must exist; the default one may be missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (paths::config_file()?, false),
        };

        if !path.exists() {
            if explicit {
                bail!("Config file not found: {}", path.display());
            }
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format: {}", path.display()))?;
        config.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs must be at least 1");
        }
        if let Some(sender) = &self.provider.default_sender
            && !sender.contains('@')
        {
            bail!("provider.default_sender is not an email address: {sender:?}");
        }
        Ok(())
    }

    /// Resolved ledger file path
    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger.path {
            Some(path) => Ok(paths::expand(path)),
            None => paths::ledger_file(),
        }
    }
}
