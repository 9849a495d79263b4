//! Scenario state for engine query behavioural tests.

use std::sync::{Arc, Mutex};

use podbridge::engine::{Availability, CommandResult, EngineKind, SemVerTriple};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use serde_json::Value;

/// Command lines seen by the fake host, wrapper included.
pub(crate) type Invocations = Arc<Mutex<Vec<String>>>;

#[derive(Default, ScenarioState)]
pub(crate) struct EngineQueryState {
    pub(crate) kind: Slot<EngineKind>,
    pub(crate) program_found: Slot<bool>,
    pub(crate) version: Slot<SemVerTriple>,
    pub(crate) output: Slot<CommandResult>,
    pub(crate) invocations: Slot<Invocations>,
    pub(crate) listed: Slot<Vec<Value>>,
    pub(crate) availability: Slot<Availability>,
}

#[fixture]
pub(crate) fn engine_query_state() -> EngineQueryState {
    let state = EngineQueryState::default();
    state.kind.set(EngineKind::NativePodman);
    state.program_found.set(true);
    state.version.set(SemVerTriple::new(4, 9, 3));
    state.output.set(CommandResult::from_exit(0, "", ""));
    state.invocations.set(Arc::new(Mutex::new(Vec::new())));
    state
}
