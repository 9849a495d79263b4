//! Given/when/then steps for runner lifecycle scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use podbridge::engine::{RetryPolicy, Runner, RunnerStarterOptions, ServiceOpts, TracingNotifier};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::service::{NoStopper, ScriptedSpawner, status_check};
use super::state::RunnerLifecycleState;

pub(crate) type StepResult<T> = Result<T, String>;

const CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Returns the scenario's runtime and runner, building both on first use
/// from the scripted service configuration.
fn ensure_runner(
    runner_lifecycle_state: &RunnerLifecycleState,
) -> StepResult<(Arc<Runtime>, Arc<Runner>)> {
    if let (Some(runtime), Some(runner)) = (
        runner_lifecycle_state.runtime.get(),
        runner_lifecycle_state.runner.get(),
    ) {
        return Ok((runtime, runner));
    }

    let runtime =
        Arc::new(Runtime::new().map_err(|err| format!("failed to create tokio runtime: {err}"))?);
    let spawned = Arc::new(AtomicUsize::new(0));
    let terminations = Arc::new(AtomicUsize::new(0));
    let spawner = ScriptedSpawner {
        exit_code: runner_lifecycle_state.exit_code.get().flatten(),
        spawned: Arc::clone(&spawned),
        terminations: Arc::clone(&terminations),
    };
    let runner = Arc::new(Runner::new(
        Arc::new(NoStopper),
        Arc::new(spawner),
        Arc::new(TracingNotifier),
    ));

    runner_lifecycle_state.runtime.set(Arc::clone(&runtime));
    runner_lifecycle_state.runner.set(Arc::clone(&runner));
    runner_lifecycle_state.spawned.set(spawned);
    runner_lifecycle_state.terminations.set(terminations);
    Ok((runtime, runner))
}

fn counter(slot_value: Option<Arc<AtomicUsize>>) -> usize {
    slot_value.map_or(0, |count| count.load(Ordering::SeqCst))
}

#[given("the API answers after {checks} status checks")]
fn given_api_answers_after(runner_lifecycle_state: &RunnerLifecycleState, checks: u32) {
    runner_lifecycle_state.ready_after.set(Some(checks));
}

#[given("the API never answers")]
fn given_api_never_answers(runner_lifecycle_state: &RunnerLifecycleState) {
    runner_lifecycle_state.ready_after.set(None);
}

#[given("the retry budget is {count} checks")]
fn given_retry_budget(runner_lifecycle_state: &RunnerLifecycleState, count: u32) {
    runner_lifecycle_state.retry_count.set(count);
}

#[given("the service exits with code {code}")]
fn given_service_exits(runner_lifecycle_state: &RunnerLifecycleState, code: i32) {
    runner_lifecycle_state.exit_code.set(Some(code));
}

#[when("the API is started")]
fn when_api_started(runner_lifecycle_state: &RunnerLifecycleState) -> StepResult<()> {
    let (runtime, runner) = ensure_runner(runner_lifecycle_state)?;
    let retry = RetryPolicy::new(
        runner_lifecycle_state.retry_count.get().unwrap_or(5),
        CHECK_INTERVAL,
    );
    let opts = ServiceOpts::new(
        retry,
        status_check(runner_lifecycle_state.ready_after.get().flatten()),
    );
    let starter =
        RunnerStarterOptions::new("podman", [String::from("system"), String::from("service")]);
    let started = runtime.block_on(runner.start_api(&opts, &starter));
    runner_lifecycle_state.started.set(started);
    Ok(())
}

#[when("the API is stopped")]
fn when_api_stopped(runner_lifecycle_state: &RunnerLifecycleState) -> StepResult<()> {
    let (runtime, runner) = ensure_runner(runner_lifecycle_state)?;
    let stopped = runtime.block_on(runner.stop_api(None, None));
    runner_lifecycle_state.stopped.set(stopped);
    Ok(())
}

#[then("the start succeeds")]
fn then_start_succeeds(runner_lifecycle_state: &RunnerLifecycleState) {
    assert_eq!(runner_lifecycle_state.started.get(), Some(true));
}

#[then("the start fails")]
fn then_start_fails(runner_lifecycle_state: &RunnerLifecycleState) {
    assert_eq!(runner_lifecycle_state.started.get(), Some(false));
}

#[then("the stop succeeds")]
fn then_stop_succeeds(runner_lifecycle_state: &RunnerLifecycleState) {
    assert_eq!(runner_lifecycle_state.stopped.get(), Some(true));
}

#[then("the runner is {expected}")]
fn then_runner_is(
    runner_lifecycle_state: &RunnerLifecycleState,
    expected: String,
) -> StepResult<()> {
    let runner = runner_lifecycle_state
        .runner
        .get()
        .ok_or_else(|| String::from("runner should be built"))?;
    let actual = format!("{:?}", runner.state());
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected runner state {expected}, got {actual}"))
    }
}

#[then("{count} service was spawned")]
fn then_services_spawned(runner_lifecycle_state: &RunnerLifecycleState, count: usize) {
    assert_eq!(counter(runner_lifecycle_state.spawned.get()), count);
}

#[then("the service was terminated {count} time")]
fn then_terminated_once(runner_lifecycle_state: &RunnerLifecycleState, count: usize) {
    assert_eq!(counter(runner_lifecycle_state.terminations.get()), count);
}

#[then("the service was terminated {count} times")]
fn then_terminated_times(runner_lifecycle_state: &RunnerLifecycleState, count: usize) {
    assert_eq!(counter(runner_lifecycle_state.terminations.get()), count);
}
