//! The `email` resource
//!
//! Creating an instance sends one email; the persisted state records what
//! was sent under its dispatch marker. Before any send the marker is looked
//! up in the provider's [`Ledger`], which makes a repeated create with the
//! same content a no-op. Each instance holding a marker counts as a holder
//! of its ledger entry. Update sends again only when content or transport
//! changed. Delete and read never talk to a relay.

pub mod model;
pub mod schema;

use crate::provider::ledger::{Ledger, LedgerEntry};
use chrono::Utc;
use declarative::{AttributeValues, Diagnostic, Diagnostics, Resource, Response, Schema};
use mailkit::{DispatchMarker, Dispatcher};
use model::{Lifecycle, ProviderDefaults, ResourceConfig, ResourceState, ValidationError};
use schema::attr;
use std::sync::Arc;
use thiserror::Error;

/// An id that does not resolve to a recorded dispatch
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{id:?} is not a dispatch marker: {source}")]
    Malformed {
        id: String,
        #[source]
        source: mailkit::Error,
    },

    #[error("no dispatch with marker {0} is recorded in the ledger")]
    Unknown(DispatchMarker),
}

/// Anything that can go wrong inside a lifecycle call
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dispatch(#[from] mailkit::Error),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("dispatch ledger unavailable: {0:#}")]
    Ledger(anyhow::Error),
}

impl LifecycleError {
    pub fn into_diagnostics(self) -> Diagnostics {
        match self {
            Self::Validation(e) => e.to_diagnostics(),
            Self::Dispatch(e) => {
                let category = e.category();
                let diagnostic = Diagnostic::error(
                    format!("Failed to send email: {}", category.description()),
                    format!("{e}. {}", category.advice()),
                );
                if e.is_retryable() {
                    diagnostic.retryable().into()
                } else {
                    diagnostic.into()
                }
            }
            Self::Import(e) => {
                Diagnostic::error("Cannot import email", e.to_string()).with_attribute(attr::ID).into()
            }
            Self::Ledger(e) => Diagnostic::error(
                "Cannot consult the dispatch ledger",
                format!("{e:#}. Nothing was sent, to avoid sending a duplicate."),
            )
            .into(),
        }
    }
}

/// Outcome of making sure a message went out
struct Dispatched {
    state: ResourceState,
    /// A relay accepted the message during this call
    sent: bool,
}

/// Lifecycle controller of `<provider>_email`
#[derive(Debug)]
pub struct EmailResource {
    dispatcher: Dispatcher,
    ledger: Arc<dyn Ledger>,
    defaults: ProviderDefaults,
}

impl EmailResource {
    pub fn new(dispatcher: Dispatcher, ledger: Arc<dyn Ledger>, defaults: ProviderDefaults) -> Self {
        Self {
            dispatcher,
            ledger,
            defaults,
        }
    }

    /// Make sure the message described by `config` has been sent exactly once.
    ///
    /// When the ledger already holds its marker, becomes one more holder of
    /// that entry and returns the recorded state without sending.
    fn ensure_dispatched(
        &self,
        config: ResourceConfig,
        warnings: &mut Diagnostics,
    ) -> Result<Dispatched, LifecycleError> {
        let marker = config.marker();

        if let Some(entry) = self.ledger.acquire(&marker).map_err(LifecycleError::Ledger)? {
            log::info!(
                "{} was already sent at {}, not sending again ({} holders)",
                marker,
                entry.dispatched_at,
                entry.holders
            );
            return Ok(Dispatched {
                state: ResourceState {
                    config,
                    id: marker,
                    dispatched_at: entry.dispatched_at,
                },
                sent: false,
            });
        }

        let receipt = self.dispatcher.dispatch(&config.message(), &config.transport)?;
        let state = ResourceState {
            config,
            id: receipt.marker,
            dispatched_at: Utc::now(),
        };

        let stored = state.without_password();
        if let Err(e) = self.ledger.record(LedgerEntry::new(
            stored.id.clone(),
            stored.dispatched_at,
            &stored.to_attributes(),
        )) {
            log::warn!("Sent {} but could not record it: {:#}", state.id, e);
            warnings.push(Diagnostic::warning(
                "Email sent but not recorded in the dispatch ledger",
                format!("{e:#}. A retried create may send it again."),
            ));
        }

        Ok(Dispatched { state, sent: true })
    }

    /// Give up this instance's hold on `id`
    fn release(&self, id: &DispatchMarker, warnings: &mut Diagnostics) {
        match self.ledger.release(id) {
            Ok(Some(0)) => log::debug!("Removed {} from the ledger", id),
            Ok(Some(left)) => log::debug!("{} is still held by {} other instance(s)", id, left),
            Ok(None) => log::debug!("{} was not in the ledger", id),
            Err(e) => warnings.push(Diagnostic::warning(
                "Could not update the dispatch ledger",
                format!("{e:#}"),
            )),
        }
    }

    fn import(&self, id: &str) -> Result<ResourceState, LifecycleError> {
        let marker: DispatchMarker = id.trim().parse().map_err(|source| ImportError::Malformed {
            id: id.to_string(),
            source,
        })?;

        // Import adopts a holder whose state the host lost; its count stays
        let entry = self
            .ledger
            .lookup(&marker)
            .map_err(LifecycleError::Ledger)?
            .ok_or_else(|| ImportError::Unknown(marker.clone()))?;

        let config = ResourceConfig::from_attributes(&entry.attributes, &self.defaults)?;
        Ok(ResourceState {
            config,
            id: marker,
            dispatched_at: entry.dispatched_at,
        })
    }
}

impl Resource for EmailResource {
    fn type_name(&self, provider_type_name: &str) -> String {
        format!("{provider_type_name}_email")
    }

    fn schema(&self) -> Schema {
        schema::email_schema()
    }

    fn create(&self, plan: &AttributeValues) -> Response {
        let mut diagnostics = Diagnostics::new();

        let lifecycle = match ResourceConfig::from_attributes(plan, &self.defaults)
            .map_err(LifecycleError::from)
            .and_then(|config| self.ensure_dispatched(config, &mut diagnostics))
        {
            Ok(dispatched) => Lifecycle::dispatched(dispatched.state),
            Err(e) => {
                log::debug!("create failed: {e}");
                diagnostics.append(e.into_diagnostics());
                Lifecycle::Absent
            }
        };

        Response {
            state: lifecycle.attributes(),
            diagnostics,
        }
    }

    fn read(&self, state: &AttributeValues) -> Response {
        match ResourceState::from_attributes(state, &self.defaults) {
            Ok(_) => Response::ok(state.clone()),
            Err(e) => Response::with_diagnostics(
                state.clone(),
                Diagnostic::warning("Stored email state is malformed", e.to_string()),
            ),
        }
    }

    fn update(&self, plan: &AttributeValues, state: &AttributeValues) -> Response {
        let config = match ResourceConfig::from_attributes(plan, &self.defaults) {
            Ok(config) => config,
            Err(e) => return Response::with_diagnostics(state.clone(), e.to_diagnostics()),
        };

        let prior = ResourceState::from_attributes(state, &self.defaults).ok();
        let marker = config.marker();

        // Only non-content fields (e.g. the password) changed: nothing to send
        if let Some(prior) = prior.as_ref().filter(|p| p.id == marker) {
            return Response::ok(
                ResourceState {
                    config,
                    id: marker,
                    dispatched_at: prior.dispatched_at,
                }
                .to_attributes(),
            );
        }

        let mut diagnostics = Diagnostics::new();
        match self.ensure_dispatched(config, &mut diagnostics) {
            Ok(next) => {
                // The prior marker is only superseded by a fresh send
                if let Some(prior) = prior.as_ref().filter(|_| next.sent) {
                    self.release(&prior.id, &mut diagnostics);
                }
                Response::with_diagnostics(next.state.to_attributes(), diagnostics)
            }
            Err(e) => {
                diagnostics.append(e.into_diagnostics());
                Response::with_diagnostics(state.clone(), diagnostics)
            }
        }
    }

    fn delete(&self, state: &AttributeValues) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        match state
            .get(attr::ID)
            .and_then(|id| id.as_str())
            .map(str::parse::<DispatchMarker>)
        {
            Some(Ok(id)) => self.release(&id, &mut diagnostics),
            Some(Err(e)) => diagnostics.push(Diagnostic::warning(
                "Stored email state has a malformed id",
                e.to_string(),
            )),
            None => log::debug!("Deleting email state without an id"),
        }

        diagnostics
    }

    fn import_state(&self, id: &str) -> Response {
        match self.import(id) {
            Ok(state) => Response::ok(state.to_attributes()),
            Err(e) => Response::absent(e.into_diagnostics()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::model::fixtures::plan;
    use super::*;
    use crate::provider::ledger::MemoryLedger;
    use anyhow::anyhow;
    use mailkit::relay::MockRelay;
    use serde_json::{Value, json};
    use std::thread;

    struct Harness {
        relay: MockRelay,
        ledger: Arc<MemoryLedger>,
        resource: EmailResource,
    }

    fn harness() -> Harness {
        let relay = MockRelay::new();
        let ledger = Arc::new(MemoryLedger::new());
        let resource = EmailResource::new(
            Dispatcher::with_relay(Box::new(relay.clone())),
            ledger.clone(),
            ProviderDefaults::default(),
        );
        Harness {
            relay,
            ledger,
            resource,
        }
    }

    /// Ledger whose writes always fail
    #[derive(Debug, Default)]
    struct ReadOnlyLedger;

    impl Ledger for ReadOnlyLedger {
        fn lookup(&self, _marker: &DispatchMarker) -> anyhow::Result<Option<LedgerEntry>> {
            Ok(None)
        }

        fn acquire(&self, _marker: &DispatchMarker) -> anyhow::Result<Option<LedgerEntry>> {
            Ok(None)
        }

        fn record(&self, _entry: LedgerEntry) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }

        fn release(&self, _marker: &DispatchMarker) -> anyhow::Result<Option<u32>> {
            Err(anyhow!("disk full"))
        }

        fn entries(&self) -> anyhow::Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
    }

    fn transient() -> mailkit::Error {
        mailkit::Error::Timeout {
            message: "read timed out".into(),
        }
    }

    #[test]
    fn test_create_sends_and_records() {
        let h = harness();
        let response = h.resource.create(&plan());

        assert!(!response.has_error());
        let state = response.state.unwrap();
        assert!(state[attr::ID].as_str().unwrap().starts_with("b3:"));
        assert!(state[attr::DISPATCHED_AT].is_string());
        assert_eq!(state[attr::SMTP_PORT], json!(587));
        assert_eq!(h.relay.sent_count(), 1);
        assert_eq!(h.ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_create_twice_sends_once() {
        let h = harness();
        let first = h.resource.create(&plan());
        let second = h.resource.create(&plan());

        assert!(!first.has_error());
        assert!(!second.has_error());
        assert_eq!(first.state, second.state);
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_invalid_plan_never_dispatches() {
        let h = harness();
        let mut values = plan();
        values.insert(attr::TO.into(), json!(""));

        let response = h.resource.create(&values);
        assert!(response.state.is_none());
        assert!(response.has_error());
        assert_eq!(
            response.diagnostics.errors().next().unwrap().attribute.as_deref(),
            Some("to")
        );
        assert_eq!(h.relay.sent_count(), 0);
    }

    #[test]
    fn test_fatal_failure_leaves_no_state() {
        let h = harness();
        h.relay
            .fail_next(mailkit::Error::from_reply("535", "authentication failed"));

        let response = h.resource.create(&plan());
        assert!(response.state.is_none());
        assert!(response.has_error());
        assert!(!response.diagnostics.is_retryable());
        assert!(h.ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_address_reported_as_fatal() {
        let h = harness();
        let mut values = plan();
        values.insert(attr::TO.into(), json!("b c@x.com"));

        let response = h.resource.create(&values);
        assert!(response.state.is_none());
        assert!(response.has_error());
        assert!(!response.diagnostics.is_retryable());
        assert_eq!(h.relay.sent_count(), 0);
    }

    #[test]
    fn test_padded_recipient_is_sent_trimmed() {
        let h = harness();
        let mut values = plan();
        values.insert(attr::TO.into(), json!(" b@x.com "));

        let padded = h.resource.create(&values).state.unwrap();
        assert!(h.relay.sent()[0].text().contains("\r\nTo: b@x.com\r\n"));

        // Same message as the unpadded declaration
        let plain = h.resource.create(&plan()).state.unwrap();
        assert_eq!(padded[attr::ID], plain[attr::ID]);
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_transient_failure_then_retry_sends_once() {
        let h = harness();
        h.relay.fail_next(transient());

        let failed = h.resource.create(&plan());
        assert!(failed.state.is_none());
        assert!(failed.diagnostics.is_retryable());
        assert_eq!(h.relay.sent_count(), 0);

        let retried = h.resource.create(&plan());
        assert!(!retried.has_error());
        assert!(retried.state.is_some());
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_ledger_write_failure_keeps_state_with_warning() {
        let relay = MockRelay::new();
        let resource = EmailResource::new(
            Dispatcher::with_relay(Box::new(relay.clone())),
            Arc::new(ReadOnlyLedger),
            ProviderDefaults::default(),
        );

        let response = resource.create(&plan());
        assert!(response.state.is_some());
        assert!(!response.has_error());
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(relay.sent_count(), 1);
    }

    #[test]
    fn test_read_is_pass_through() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();

        let response = h.resource.read(&state);
        assert_eq!(response.state.as_ref(), Some(&state));
        assert!(response.diagnostics.is_empty());
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_update_with_new_body_dispatches_again() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();

        let mut changed = plan();
        changed.insert(attr::BODY.into(), json!("B2"));
        let response = h.resource.update(&changed, &state);

        assert!(!response.has_error());
        let next = response.state.unwrap();
        assert_ne!(next[attr::ID], state[attr::ID]);
        assert_eq!(next[attr::BODY], json!("B2"));
        assert_eq!(h.relay.sent_count(), 2);

        // The superseded marker is gone, the new one recorded
        let markers: Vec<String> = h
            .ledger
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.marker.to_string())
            .collect();
        assert_eq!(markers, [next[attr::ID].as_str().unwrap()]);
    }

    #[test]
    fn test_update_password_only_does_not_dispatch() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();

        let mut changed = plan();
        changed.insert(attr::SMTP_PASSWORD.into(), json!("rotated"));
        let response = h.resource.update(&changed, &state);

        let next = response.state.unwrap();
        assert_eq!(next[attr::ID], state[attr::ID]);
        assert_eq!(next[attr::DISPATCHED_AT], state[attr::DISPATCHED_AT]);
        assert_eq!(next[attr::SMTP_PASSWORD], json!("rotated"));
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_failed_update_keeps_prior_state() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();
        h.relay.fail_next(transient());

        let mut changed = plan();
        changed.insert(attr::SUBJECT.into(), json!("Hello"));
        let response = h.resource.update(&changed, &state);

        assert!(response.has_error());
        assert!(response.diagnostics.is_retryable());
        assert_eq!(response.state, Some(state));
        assert_eq!(h.ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_never_dispatches() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();

        let diagnostics = h.resource.delete(&state);
        assert!(diagnostics.is_empty());
        assert_eq!(h.relay.sent_count(), 1);
        assert!(h.ledger.entries().unwrap().is_empty());

        // Even garbage state deletes without error
        let mut garbage = AttributeValues::new();
        garbage.insert(attr::ID.into(), json!("nope"));
        assert!(!h.resource.delete(&garbage).has_error());
        assert!(!h.resource.delete(&AttributeValues::new()).has_error());
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_delete_with_failing_ledger_only_warns() {
        let resource = EmailResource::new(
            Dispatcher::with_relay(Box::new(MockRelay::new())),
            Arc::new(ReadOnlyLedger),
            ProviderDefaults::default(),
        );
        let mut state = plan();
        state.insert(attr::ID.into(), json!(format!("b3:{}", "0".repeat(64))));

        let diagnostics = resource.delete(&state);
        assert!(!diagnostics.has_error());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_import_known_marker() {
        let h = harness();
        let state = h.resource.create(&plan()).state.unwrap();
        let id = state[attr::ID].as_str().unwrap();

        let response = h.resource.import_state(id);
        assert!(!response.has_error());
        let imported = response.state.unwrap();
        assert_eq!(imported[attr::ID], state[attr::ID]);
        assert_eq!(imported[attr::BODY], json!("B"));
        assert_eq!(imported[attr::SMTP_PASSWORD], Value::Null);
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_import_unknown_or_malformed_creates_nothing() {
        let h = harness();
        let unknown = format!("b3:{}", "0".repeat(64));

        for id in ["garbage", unknown.as_str()] {
            let response = h.resource.import_state(id);
            assert!(response.state.is_none(), "{id}");
            assert!(response.has_error(), "{id}");
        }
        assert_eq!(h.relay.sent_count(), 0);
    }

    #[test]
    fn test_password_never_leaks() {
        let h = harness();
        h.relay.fail_next(transient());
        let failed = h.resource.create(&plan());
        let state = h.resource.create(&plan()).state.unwrap();

        let ledger_dump = format!("{:?}", h.ledger.entries().unwrap());
        let diagnostics_dump = format!("{:?}", failed.diagnostics);
        let config = ResourceConfig::from_attributes(&plan(), &ProviderDefaults::default()).unwrap();

        assert!(!ledger_dump.contains("hunter2"));
        assert!(!diagnostics_dump.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(!format!("{:?}", h.resource).contains("hunter2"));
        assert!(!h.relay.sent()[0].text().contains("hunter2"));
        // Host state keeps it; it is the host's job to redact
        assert_eq!(state[attr::SMTP_PASSWORD], json!("hunter2"));
    }

    fn holders(h: &Harness, id: &Value) -> Option<u32> {
        let marker: DispatchMarker = id.as_str().unwrap().parse().unwrap();
        h.ledger.lookup(&marker).unwrap().map(|e| e.holders)
    }

    #[test]
    fn test_identical_resources_share_one_dispatch() {
        let h = harness();
        let a = h.resource.create(&plan()).state.unwrap();
        let b = h.resource.create(&plan()).state.unwrap();

        assert_eq!(a[attr::ID], b[attr::ID]);
        assert_eq!(h.relay.sent_count(), 1);
        assert_eq!(holders(&h, &a[attr::ID]), Some(2));
    }

    #[test]
    fn test_delete_keeps_dispatch_still_held_by_another_resource() {
        let h = harness();
        let a = h.resource.create(&plan()).state.unwrap();
        let b = h.resource.create(&plan()).state.unwrap();

        assert!(h.resource.delete(&a).is_empty());
        assert_eq!(holders(&h, &b[attr::ID]), Some(1));

        let imported = h.resource.import_state(b[attr::ID].as_str().unwrap());
        assert!(!imported.has_error());
        assert_eq!(imported.state.unwrap()[attr::ID], b[attr::ID]);

        // b's create retried after a lost state write is still a no-op
        assert!(!h.resource.create(&plan()).has_error());
        assert_eq!(h.relay.sent_count(), 1);
    }

    #[test]
    fn test_delete_last_holder_drops_entry() {
        let h = harness();
        let a = h.resource.create(&plan()).state.unwrap();
        let b = h.resource.create(&plan()).state.unwrap();

        h.resource.delete(&a);
        h.resource.delete(&b);
        assert!(h.ledger.entries().unwrap().is_empty());
        assert!(h.resource.import_state(b[attr::ID].as_str().unwrap()).has_error());
    }

    #[test]
    fn test_update_away_from_shared_dispatch_keeps_it_for_the_other() {
        let h = harness();
        let a = h.resource.create(&plan()).state.unwrap();
        let b = h.resource.create(&plan()).state.unwrap();

        let mut changed = plan();
        changed.insert(attr::BODY.into(), json!("B2"));
        let next = h.resource.update(&changed, &a).state.unwrap();

        assert_eq!(h.relay.sent_count(), 2);
        assert_eq!(holders(&h, &next[attr::ID]), Some(1));
        assert_eq!(holders(&h, &b[attr::ID]), Some(1));
        assert!(!h.resource.import_state(b[attr::ID].as_str().unwrap()).has_error());
    }

    #[test]
    fn test_update_onto_recorded_dispatch_keeps_prior_marker() {
        let h = harness();
        let mut other = plan();
        other.insert(attr::BODY.into(), json!("B2"));
        let recorded = h.resource.create(&other).state.unwrap();
        let state = h.resource.create(&plan()).state.unwrap();

        let response = h.resource.update(&other, &state);
        assert!(!response.has_error());
        let next = response.state.unwrap();

        // Nothing new went out, so nothing is superseded
        assert_eq!(next[attr::ID], recorded[attr::ID]);
        assert_eq!(next[attr::DISPATCHED_AT], recorded[attr::DISPATCHED_AT]);
        assert_eq!(h.relay.sent_count(), 2);
        assert_eq!(holders(&h, &recorded[attr::ID]), Some(2));
        assert_eq!(holders(&h, &state[attr::ID]), Some(1));
    }

    #[test]
    fn test_concurrent_creates_each_dispatch_once() {
        let h = harness();
        let resource = &h.resource;

        thread::scope(|scope| {
            for i in 0..8 {
                scope.spawn(move || {
                    let mut values = plan();
                    values.insert(attr::TO.into(), json!(format!("user{i}@x.com")));
                    assert!(!resource.create(&values).has_error());
                });
            }
        });

        assert_eq!(h.relay.sent_count(), 8);
        assert_eq!(h.ledger.entries().unwrap().len(), 8);
    }
}
