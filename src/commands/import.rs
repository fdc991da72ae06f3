//! `courier import <ADDRESS> <ID>`

use anyhow::{Result, bail};

use crate::Context;
use crate::host::{self, state::HostState};
use crate::ui;

pub fn run(ctx: &Context, address: &str, id: &str) -> Result<()> {
    let registry = super::registry(ctx)?;
    let mut state = HostState::load(&ctx.state)?;

    let response = host::import(&registry, &mut state, address, id)?;
    ui::diagnostics(address, &response.diagnostics);

    if response.has_error() || response.state.is_none() {
        bail!("Import of {address} failed; state unchanged");
    }

    state.save(&ctx.state)?;
    ui::success(&format!("Imported {id} as {address}"));
    Ok(())
}
