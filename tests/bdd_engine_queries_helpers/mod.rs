//! Behavioural helpers for engine query scenarios.

mod host;
mod state;
mod steps;

pub(crate) use state::{EngineQueryState, engine_query_state};
#[expect(
    unused_imports,
    reason = "rstest-bdd discovers step functions via attributes, not runtime usage"
)]
pub(crate) use steps::*;
