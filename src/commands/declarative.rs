//! Declarative commands
//!
//! - `plan` - Show what apply would do
//! - `apply` - Converge host state to the declarations
//! - `destroy` - Delete every managed resource
//! - `refresh` - Re-read every managed resource

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{
    Action, ApplyResult, ConfirmCallback, ExecuteOptions, ExecuteReport, ExecutionPlan,
    ProgressCallback, Registry, ResourceDiff, execute, group_by_type,
};
use indicatif::ProgressBar;

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs};
use crate::host::{self, declaration, state::HostState};
use crate::ui;

// ============================================================================
// Callbacks
// ============================================================================

/// Progress bar over the lifecycle calls of one apply
struct TerminalProgress {
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl TerminalProgress {
    fn new(quiet: bool) -> Self {
        Self { quiet, bar: None }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_start(&mut self, count: usize) {
        if !self.quiet {
            self.bar = Some(ui::progress_bar(count as u64));
        }
    }

    fn on_change_start(&mut self, address: &str, action: Action) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{action} {address}"));
        }
    }

    fn on_change_complete(&mut self, address: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => "○",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
            _ => "✓",
        };
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{symbol} {address}"));
            bar.inc(1);
        }
    }

    fn on_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Asks on the terminal unless `--yes` was given
struct TerminalConfirm {
    yes: bool,
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .context("Failed to read confirmation")
    }
}

// ============================================================================
// Display
// ============================================================================

fn colored_symbol(action: Action) -> colored::ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Update => action.symbol().yellow(),
        Action::Delete => action.symbol().red(),
        Action::NoOp => action.symbol().dimmed(),
    }
}

fn display_diff(diff: &ResourceDiff, verbose: bool) {
    let note = match diff.action {
        Action::Create => "(will send)",
        Action::Update => "(will send if content changed)",
        Action::Delete => "(will forget, never sends)",
        Action::NoOp => "(up to date)",
    };
    println!(
        "  {} {:<40} {}",
        colored_symbol(diff.action),
        diff.address,
        note.dimmed()
    );

    if diff.action == Action::NoOp || (diff.action == Action::Delete && !verbose) {
        return;
    }

    for change in &diff.changes {
        let line = match diff.action {
            Action::Create => format!("{} = {}", change.name, change.render_after()),
            Action::Delete => format!("{} = {}", change.name, change.render_before()),
            _ => format!(
                "{}: {} → {}",
                change.name,
                change.render_before(),
                change.render_after()
            ),
        };
        ui::dim(&format!("    {line}"));
    }
}

/// Print the plan grouped by resource type
fn display_plan(plan: &ExecutionPlan, ctx: &Context) {
    let diffs: Vec<ResourceDiff> = plan
        .diffs()
        .filter(|d| d.has_changes() || ctx.verbose > 0)
        .cloned()
        .collect();

    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let grouped = group_by_type(&diffs);
    let mut types: Vec<_> = grouped.keys().collect();
    types.sort();

    for resource_type in types {
        ui::section(resource_type);
        for diff in &grouped[resource_type.as_str()] {
            display_diff(diff, ctx.verbose > 0);
        }
    }

    let summary = plan.summary();
    println!();
    println!(
        "  Plan: {} to send, {} to update, {} to forget",
        summary.additions.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.removals.to_string().red()
    );
}

fn print_summary(report: &ExecuteReport) {
    let summary = &report.summary;
    println!();
    if summary.is_success() {
        println!("  {} Apply complete", "✓".green().bold());
    } else {
        println!("  {} Apply finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.updated > 0 {
        println!("    • {} updated", summary.updated);
    }
    if summary.deleted > 0 {
        println!("    • {} deleted", summary.deleted);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

// ============================================================================
// Commands
// ============================================================================

fn build_plan(ctx: &Context, args: &PlanArgs) -> Result<(Registry, HostState, ExecutionPlan)> {
    let registry = super::registry(ctx)?;
    let state = HostState::load(&ctx.state)?;
    let declarations = declaration::load(&args.files, &registry)?;
    log::info!(
        "{} declared, {} in state",
        declarations.len(),
        state.resources.len()
    );

    let plan = host::plan(&registry, &declarations, &state)?.filter_by_target(args.target.as_deref());
    Ok((registry, state, plan))
}

pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<()> {
    ui::header("Courier Plan");
    let (_, _, plan) = build_plan(ctx, args)?;
    display_plan(&plan, ctx);
    Ok(())
}

/// Run `plan`, record every outcome in state, and save it
fn run(
    ctx: &Context,
    registry: &Registry,
    mut state: HostState,
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    yes: bool,
) -> Result<()> {
    display_plan(plan, ctx);

    if plan.is_empty() {
        return Ok(());
    }

    if opts.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    println!();
    let mut progress = TerminalProgress::new(ctx.quiet);
    let mut confirm = TerminalConfirm { yes };
    let report = execute(plan, registry, opts, &mut progress, &mut confirm)?;

    if report.outcomes.is_empty() && report.summary.skipped > 0 {
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    for outcome in &report.outcomes {
        state.record(outcome);
        ui::diagnostics(&outcome.address, &outcome.diagnostics);
        if outcome.attempts > 1 {
            log::info!("{} took {} attempts", outcome.address, outcome.attempts);
        }
    }
    state.save(&ctx.state)?;

    print_summary(&report);
    if !report.summary.is_success() {
        bail!("{} change(s) failed", report.summary.failed);
    }
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    ui::header("Courier Apply");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let (registry, state, plan) = build_plan(ctx, &args.plan)?;
    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1),
        retries: args.retries,
        ..Default::default()
    };

    run(ctx, &registry, state, &plan, &opts, args.yes)
}

pub fn destroy(ctx: &Context, target: Option<&str>, yes: bool) -> Result<()> {
    ui::header("Courier Destroy");

    let registry = super::registry(ctx)?;
    let state = HostState::load(&ctx.state)?;
    let plan = host::destroy_plan(&registry, &state)?.filter_by_target(target);

    run(ctx, &registry, state, &plan, &ExecuteOptions::default(), yes)
}

pub fn refresh(ctx: &Context) -> Result<()> {
    ui::header("Courier Refresh");

    let registry = super::registry(ctx)?;
    let mut state = HostState::load(&ctx.state)?;
    if state.resources.is_empty() {
        ui::info("State is empty");
        return Ok(());
    }

    let reports = host::refresh(&registry, &mut state);
    for (address, diagnostics) in &reports {
        ui::diagnostics(address, diagnostics);
    }
    state.save(&ctx.state)?;

    ui::success(&format!("Refreshed {} resource(s)", state.resources.len()));
    Ok(())
}
