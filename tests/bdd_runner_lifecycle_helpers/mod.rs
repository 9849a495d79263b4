//! Behavioural helpers for runner lifecycle scenarios.

mod service;
mod state;
mod steps;

pub(crate) use state::{RunnerLifecycleState, runner_lifecycle_state};
#[expect(
    unused_imports,
    reason = "rstest-bdd discovers step functions via attributes, not runtime usage"
)]
pub(crate) use steps::*;
