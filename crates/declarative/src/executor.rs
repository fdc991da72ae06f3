//! Execution engine - makes the planned lifecycle calls with bounded parallelism
//!
//! Calls for different instances are independent and may run concurrently.
//! A plan holds at most one entry per address, so no instance ever sees two
//! calls in flight.

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::diff::Action;
use crate::planner::{ExecutionPlan, PlannedChange};
use crate::resource::{Registry, Resource};
use crate::types::{ApplyResult, AttributeValues, Diagnostic, Diagnostics, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::thread;

/// What happened to one planned change
#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    pub address: String,
    pub resource_type: String,
    pub action: Action,
    pub result: ApplyResult,
    /// State the host must persist afterwards; `None` removes the instance
    pub state: Option<AttributeValues>,
    pub diagnostics: Diagnostics,
    /// Number of lifecycle calls made, including retries
    pub attempts: u32,
}

/// Results of executing a plan
#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    pub summary: ExecuteSummary,
    pub outcomes: Vec<ChangeOutcome>,
}

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `registry` - Resource types able to serve the plan's entries
/// * `opts` - Execution options (dry_run, jobs, retries)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    registry: &Registry,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let pending: Vec<&PlannedChange> = plan.pending().collect();

    if pending.is_empty() || opts.dry_run {
        return Ok(ExecuteReport::default());
    }

    if !confirm.confirm(&format!("Apply {} change(s)?", pending.len()))? {
        return Ok(ExecuteReport {
            summary: ExecuteSummary {
                skipped: pending.len(),
                ..Default::default()
            },
            outcomes: Vec::new(),
        });
    }

    progress.on_start(pending.len());

    let outcomes = if opts.jobs <= 1 || pending.len() == 1 {
        execute_sequential(&pending, registry, opts, progress)
    } else {
        execute_parallel(&pending, registry, opts, progress)?
    };

    progress.on_complete();

    let mut summary = ExecuteSummary::default();
    for outcome in &outcomes {
        summary.add_result(&outcome.result);
    }

    Ok(ExecuteReport { summary, outcomes })
}

fn execute_sequential<P: ProgressCallback>(
    pending: &[&PlannedChange],
    registry: &Registry,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Vec<ChangeOutcome> {
    let mut outcomes = Vec::with_capacity(pending.len());
    for change in pending {
        progress.on_change_start(change.address(), change.action());
        let outcome = apply_change(change, registry, opts);
        progress.on_change_complete(&outcome.address, &outcome.result);
        outcomes.push(outcome);
    }
    outcomes
}

/// Execute changes in parallel using rayon
fn execute_parallel<P: ProgressCallback>(
    pending: &[&PlannedChange],
    registry: &Registry,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<Vec<ChangeOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let outcomes: Vec<ChangeOutcome> = pool.install(|| {
        pending
            .par_iter()
            .map(|change| apply_change(change, registry, opts))
            .collect()
    });

    // The progress callback is not shared across threads; report afterwards
    for outcome in &outcomes {
        progress.on_change_complete(&outcome.address, &outcome.result);
    }

    Ok(outcomes)
}

/// Make the lifecycle call for one change, re-invoking it on retryable failures
pub fn apply_change(change: &PlannedChange, registry: &Registry, opts: &ExecuteOptions) -> ChangeOutcome {
    let address = change.address().to_string();
    let resource_type = change.diff.resource_type.clone();
    let action = change.action();

    let Some(resource) = registry.get(&resource_type) else {
        let diagnostics = Diagnostics::from(registry.unknown_type(&resource_type));
        return finish(change, change.prior.clone(), diagnostics, 0);
    };

    let mut attempt = 0;
    loop {
        let (state, diagnostics) = invoke(resource, change);

        if diagnostics.is_retryable() && attempt < opts.retries {
            let delay = opts.delay_for_attempt(attempt);
            log::warn!(
                "{} ({}): {} - attempt {}/{}, retrying in {:?}",
                address,
                action,
                diagnostics.first_error().unwrap_or("failed"),
                attempt + 1,
                opts.retries + 1,
                delay
            );
            thread::sleep(delay);
            attempt += 1;
            continue;
        }

        log::debug!("{} ({}) finished after {} call(s)", address, action, attempt + 1);
        return finish(change, state, diagnostics, attempt + 1);
    }
}

/// Dispatch a change to the matching lifecycle call
fn invoke(
    resource: &dyn Resource,
    change: &PlannedChange,
) -> (Option<AttributeValues>, Diagnostics) {
    match (change.action(), &change.prior, &change.planned) {
        (Action::Create, _, Some(planned)) => {
            let response = resource.create(planned);
            (response.state, response.diagnostics)
        }
        (Action::Update, Some(prior), Some(planned)) => {
            let response = resource.update(planned, prior);
            (response.state, response.diagnostics)
        }
        (Action::Delete, Some(prior), _) => {
            let diagnostics = resource.delete(prior);
            let state = diagnostics.has_error().then(|| prior.clone());
            (state, diagnostics)
        }
        (Action::NoOp, prior, _) => (prior.clone(), Diagnostics::new()),
        (action, prior, _) => (
            prior.clone(),
            Diagnostics::from(Diagnostic::error(
                format!("Inconsistent plan for {}", change.address()),
                format!("a {action} change is missing the values it needs"),
            )),
        ),
    }
}

fn finish(
    change: &PlannedChange,
    state: Option<AttributeValues>,
    diagnostics: Diagnostics,
    attempts: u32,
) -> ChangeOutcome {
    let result = if diagnostics.has_error() {
        ApplyResult::Failed {
            error: diagnostics.first_error().unwrap_or("failed").to_string(),
            retryable: diagnostics.is_retryable(),
        }
    } else {
        match change.action() {
            Action::Create => ApplyResult::Created,
            Action::Update => ApplyResult::Updated,
            Action::Delete => ApplyResult::Deleted,
            Action::NoOp => ApplyResult::NoChange,
        }
    };

    ChangeOutcome {
        address: change.address().to_string(),
        resource_type: change.diff.resource_type.clone(),
        action: change.action(),
        result,
        state,
        diagnostics,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::diff::ResourceDiff;
    use crate::resource::testing::TestProvider;
    use serde_json::json;
    use std::time::Duration;

    fn planned(name: &str) -> AttributeValues {
        let mut values = AttributeValues::new();
        values.insert("name".into(), json!(name));
        values
    }

    fn plan_for(
        registry: &Registry,
        entries: &[(&str, Option<AttributeValues>, Option<AttributeValues>)],
    ) -> ExecutionPlan {
        let resource = registry.get("test_thing").unwrap();
        let schema = resource.schema();
        let mut plan = ExecutionPlan::new();
        for (address, prior, desired) in entries {
            plan.push(PlannedChange {
                diff: ResourceDiff::compute(
                    address,
                    "test_thing",
                    &schema,
                    prior.as_ref(),
                    desired.as_ref(),
                ),
                prior: prior.clone(),
                planned: desired.clone(),
            });
        }
        plan
    }

    fn fast_opts(jobs: usize, retries: u32) -> ExecuteOptions {
        ExecuteOptions {
            jobs,
            retries,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let report = execute(
            &ExecutionPlan::new(),
            &registry,
            &fast_opts(1, 0),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(report.summary.total(), 0);
    }

    #[test]
    fn test_execute_creates_updates_and_deletes() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let plan = plan_for(
            &registry,
            &[
                ("test_thing.a", None, Some(planned("a"))),
                ("test_thing.b", Some(planned("b")), Some(planned("b2"))),
                ("test_thing.c", Some(planned("c")), None),
            ],
        );

        let report = execute(&plan, &registry, &fast_opts(1, 0), &mut NoProgress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.summary.created, 1);
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.deleted, 1);
        assert_eq!(provider.counters.creates(), 1);
        assert_eq!(provider.counters.updates(), 1);
        assert_eq!(provider.counters.deletes(), 1);

        let deleted = report
            .outcomes
            .iter()
            .find(|o| o.address == "test_thing.c")
            .unwrap();
        assert!(deleted.state.is_none());
    }

    #[test]
    fn test_execute_parallel_calls_each_instance_once() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let entries: Vec<_> = (0..8)
            .map(|i| (format!("test_thing.n{i}"), None, Some(planned(&format!("n{i}")))))
            .collect();
        let borrowed: Vec<_> = entries
            .iter()
            .map(|(a, p, d)| (a.as_str(), p.clone(), d.clone()))
            .collect();
        let plan = plan_for(&registry, &borrowed);

        let report = execute(&plan, &registry, &fast_opts(4, 0), &mut NoProgress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.summary.created, 8);
        assert_eq!(provider.counters.creates(), 8);
    }

    #[test]
    fn test_retryable_failures_are_retried() {
        let provider = TestProvider::default();
        *provider.counters.transient_failures.lock().unwrap() = 2;
        let registry = Registry::from_provider(&provider);
        let plan = plan_for(&registry, &[("test_thing.a", None, Some(planned("a")))]);

        let report = execute(&plan, &registry, &fast_opts(1, 3), &mut NoProgress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.summary.created, 1);
        assert_eq!(report.outcomes[0].attempts, 3);
        assert_eq!(provider.counters.creates(), 1);
    }

    #[test]
    fn test_retries_exhausted_reports_failure() {
        let provider = TestProvider::default();
        *provider.counters.transient_failures.lock().unwrap() = 5;
        let registry = Registry::from_provider(&provider);
        let plan = plan_for(&registry, &[("test_thing.a", None, Some(planned("a")))]);

        let report = execute(&plan, &registry, &fast_opts(1, 1), &mut NoProgress, &mut AutoConfirm)
            .unwrap();

        assert_eq!(report.summary.failed, 1);
        assert_eq!(
            report.outcomes[0].result,
            ApplyResult::Failed {
                error: "timeout".into(),
                retryable: true
            }
        );
        assert!(report.outcomes[0].state.is_none());
        assert_eq!(provider.counters.creates(), 0);
    }

    #[test]
    fn test_declined_confirmation_skips_everything() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let plan = plan_for(&registry, &[("test_thing.a", None, Some(planned("a")))]);

        let report = execute(&plan, &registry, &fast_opts(1, 0), &mut NoProgress, &mut AutoDecline)
            .unwrap();

        assert_eq!(report.summary.skipped, 1);
        assert_eq!(provider.counters.creates(), 0);
    }

    #[test]
    fn test_dry_run_makes_no_calls() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let plan = plan_for(&registry, &[("test_thing.a", None, Some(planned("a")))]);
        let opts = ExecuteOptions {
            dry_run: true,
            ..fast_opts(1, 0)
        };

        let report = execute(&plan, &registry, &opts, &mut NoProgress, &mut AutoConfirm).unwrap();

        assert_eq!(report.summary.total(), 0);
        assert_eq!(provider.counters.creates(), 0);
    }

    #[test]
    fn test_unknown_type_fails_without_touching_state() {
        let provider = TestProvider::default();
        let registry = Registry::from_provider(&provider);
        let prior = planned("a");
        let change = PlannedChange {
            diff: ResourceDiff::compute(
                "test_other.a",
                "test_other",
                &crate::schema::Schema::new(0, "x"),
                Some(&prior),
                None,
            ),
            prior: Some(prior.clone()),
            planned: None,
        };

        let outcome = apply_change(&change, &registry, &fast_opts(1, 0));
        assert!(!outcome.result.is_success());
        assert_eq!(outcome.state, Some(prior));
    }
}
