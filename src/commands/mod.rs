// Plan, apply, destroy, refresh
pub mod declarative;

// Single-purpose commands
pub mod import;
pub mod schema;
pub mod state;

use crate::Context;
use crate::config::CourierConfig;
use crate::provider::MessageProvider;
use anyhow::Result;
use ::declarative::Registry;

/// Registry of the `message` provider, configured from the user's config file
pub fn registry(ctx: &Context) -> Result<Registry> {
    let config = CourierConfig::load(ctx.config.as_deref())?;
    let provider = MessageProvider::from_config(&config)?;
    Ok(Registry::from_provider(&provider))
}
