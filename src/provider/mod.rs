//! The `message` provider
//!
//! Registers the `email` resource type. Every resource it builds shares one
//! dispatcher and one ledger.

pub mod email;
pub mod ledger;

use crate::config::CourierConfig;
use anyhow::Result;
use declarative::{BoxedResource, Provider};
use email::EmailResource;
use email::model::ProviderDefaults;
use ledger::{FileLedger, Ledger};
use mailkit::{DispatchOptions, Dispatcher};
use std::sync::Arc;

pub const PROVIDER_TYPE_NAME: &str = "message";

/// Builds the dispatcher of each resource
type DispatcherFactory = Box<dyn Fn() -> Dispatcher + Send + Sync>;

pub struct MessageProvider {
    dispatcher: DispatcherFactory,
    ledger: Arc<dyn Ledger>,
    defaults: ProviderDefaults,
}

impl MessageProvider {
    /// Provider talking SMTP, with a file ledger at the configured path
    pub fn from_config(config: &CourierConfig) -> Result<Self> {
        let options: DispatchOptions = config.provider.dispatch_options();
        let ledger = FileLedger::new(config.ledger_path()?);
        log::debug!("Dispatch ledger: {}", ledger.path().display());

        Ok(Self::new(
            Box::new(move || Dispatcher::smtp(options)),
            Arc::new(ledger),
            ProviderDefaults {
                default_sender: config.provider.default_sender.clone(),
            },
        ))
    }

    pub fn new(
        dispatcher: DispatcherFactory,
        ledger: Arc<dyn Ledger>,
        defaults: ProviderDefaults,
    ) -> Self {
        Self {
            dispatcher,
            ledger,
            defaults,
        }
    }
}

impl Provider for MessageProvider {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_NAME
    }

    fn resources(&self) -> Vec<BoxedResource> {
        vec![Box::new(EmailResource::new(
            (self.dispatcher)(),
            Arc::clone(&self.ledger),
            self.defaults.clone(),
        ))]
    }
}
