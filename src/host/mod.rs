//! Local host harness
//!
//! Plays the orchestrator's part for the provider: turns declarations and
//! persisted state into an [`ExecutionPlan`], and runs the calls that do not
//! go through a plan (refresh and import).

pub mod declaration;
pub mod state;

use anyhow::{Result, bail};
use declarative::{
    AttributeValues, Diagnostics, ExecutionPlan, PlannedChange, Registry, ResourceDiff, Response,
};
use declaration::Declaration;
use state::HostState;
use std::collections::BTreeSet;

fn change(
    registry: &Registry,
    address: &str,
    resource_type: &str,
    prior: Option<&AttributeValues>,
    planned: Option<AttributeValues>,
) -> Result<PlannedChange> {
    let Some(resource) = registry.get(resource_type) else {
        bail!("{address}: {}", registry.unknown_type(resource_type).detail);
    };

    Ok(PlannedChange {
        diff: ResourceDiff::compute(
            address,
            resource_type,
            &resource.schema(),
            prior,
            planned.as_ref(),
        ),
        prior: prior.cloned(),
        planned,
    })
}

/// Converge `state` to `declarations`: create, update, or delete per address
pub fn plan(
    registry: &Registry,
    declarations: &[Declaration],
    state: &HostState,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    let declared: BTreeSet<&str> = declarations.iter().map(|d| d.address.as_str()).collect();

    for declaration in declarations {
        let prior = state
            .get(&declaration.address)
            .filter(|stored| stored.resource_type == declaration.resource_type)
            .map(|stored| &stored.attributes);

        plan.push(change(
            registry,
            &declaration.address,
            &declaration.resource_type,
            prior,
            Some(declaration.values.clone()),
        )?);
    }

    for (address, stored) in &state.resources {
        if !declared.contains(address.as_str()) {
            plan.push(change(
                registry,
                address,
                &stored.resource_type,
                Some(&stored.attributes),
                None,
            )?);
        }
    }

    plan.changes.sort_by(|a, b| a.address().cmp(b.address()));
    Ok(plan)
}

/// Delete everything in `state`
pub fn destroy_plan(registry: &Registry, state: &HostState) -> Result<ExecutionPlan> {
    plan(registry, &[], state)
}

/// Read every stored resource, updating `state` with what comes back.
///
/// Returns the diagnostics of each address that reported any.
pub fn refresh(registry: &Registry, state: &mut HostState) -> Vec<(String, Diagnostics)> {
    let mut reports = Vec::new();
    let addresses: Vec<String> = state.resources.keys().cloned().collect();

    for address in addresses {
        let Some(stored) = state.get(&address).cloned() else {
            continue;
        };
        let Some(resource) = registry.get(&stored.resource_type) else {
            reports.push((
                address,
                Diagnostics::from(registry.unknown_type(&stored.resource_type)),
            ));
            continue;
        };

        let Response { state: read, diagnostics } = resource.read(&stored.attributes);
        match read {
            Some(attributes) => state.insert(&address, &stored.resource_type, attributes),
            None if !diagnostics.has_error() => {
                log::info!("{address} no longer exists, dropping it from state");
                state.resources.remove(&address);
            }
            None => {}
        }

        if !diagnostics.is_empty() {
            reports.push((address, diagnostics));
        }
    }

    reports
}

/// Split `<type>.<name>`, resolving a short type name
pub fn parse_address(registry: &Registry, address: &str) -> Result<(String, String)> {
    let Some((type_part, name)) = address.split_once('.') else {
        bail!("Invalid address {address:?}: expected <type>.<name>");
    };
    if name.is_empty() || name.contains('.') {
        bail!("Invalid address {address:?}: expected <type>.<name>");
    }
    let Some(resource_type) = registry.resolve(type_part) else {
        bail!("{}", registry.unknown_type(type_part).detail);
    };
    Ok((resource_type, name.to_string()))
}

/// Adopt an existing instance under `address`
///
/// On success the imported state is stored; the response is returned either
/// way so the caller can show its diagnostics.
pub fn import(
    registry: &Registry,
    state: &mut HostState,
    address: &str,
    id: &str,
) -> Result<Response> {
    let (resource_type, name) = parse_address(registry, address)?;
    let address = format!("{resource_type}.{name}");

    if state.get(&address).is_some() {
        bail!("{address} is already managed; remove it from state before importing");
    }
    let Some(resource) = registry.get(&resource_type) else {
        bail!("{}", registry.unknown_type(&resource_type).detail);
    };

    let response = resource.import_state(id);
    if let Some(attributes) = &response.state
        && !response.has_error()
    {
        state.insert(&address, &resource_type, attributes.clone());
    }
    Ok(response)
}
