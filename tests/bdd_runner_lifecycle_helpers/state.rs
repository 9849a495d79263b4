//! Scenario state for runner lifecycle behavioural tests.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use podbridge::engine::Runner;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tokio::runtime::Runtime;

#[derive(Default, ScenarioState)]
pub(crate) struct RunnerLifecycleState {
    pub(crate) ready_after: Slot<Option<u32>>,
    pub(crate) retry_count: Slot<u32>,
    pub(crate) exit_code: Slot<Option<i32>>,
    pub(crate) runtime: Slot<Arc<Runtime>>,
    pub(crate) runner: Slot<Arc<Runner>>,
    pub(crate) spawned: Slot<Arc<AtomicUsize>>,
    pub(crate) terminations: Slot<Arc<AtomicUsize>>,
    pub(crate) started: Slot<bool>,
    pub(crate) stopped: Slot<bool>,
}

#[fixture]
pub(crate) fn runner_lifecycle_state() -> RunnerLifecycleState {
    let state = RunnerLifecycleState::default();
    state.ready_after.set(Some(1));
    state.retry_count.set(5);
    state.exit_code.set(None);
    state
}
