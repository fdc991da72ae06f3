//! # Declarative
//!
//! Host-side lifecycle protocol for declaratively managed resources.
//!
//! A provider offers resource types; each type publishes a [`Schema`] and
//! answers five lifecycle calls (create, read, update, delete, import). The
//! host compares persisted state with declared values, builds an
//! [`ExecutionPlan`] and drives the calls through [`execute`].
//!
//! ## Core Concepts
//!
//! - **Schema**: Typed attributes with requirement and sensitivity flags
//! - **Resource**: One managed type answering the lifecycle calls
//! - **Diagnostics**: Errors and warnings returned instead of panics
//! - **ExecutionPlan**: One pending lifecycle call per instance
//! - **Executor**: Runs the plan with bounded parallelism and retries
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{execute, AutoConfirm, ExecuteOptions, NoProgress, Registry};
//!
//! let registry = Registry::from_provider(&my_provider);
//! let report = execute(&plan, &registry, &ExecuteOptions::default(), &mut NoProgress, &mut AutoConfirm)?;
//! for outcome in report.outcomes {
//!     state.store(&outcome.address, outcome.state);
//! }
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{group_by_type, Action, AttributeChange, DiffSummary, ResourceDiff};
pub use executor::{apply_change, execute, ChangeOutcome, ExecuteReport};
pub use planner::{parse_target, ExecutionPlan, PlannedChange};
pub use resource::{BoxedResource, Provider, Registry, Resource, Response};
pub use schema::{Attribute, AttributeType, Requirement, Schema, SENSITIVE_PLACEHOLDER};
pub use types::{
    ApplyResult, AttributeValues, Diagnostic, Diagnostics, ExecuteOptions, ExecuteSummary,
    Severity,
};
