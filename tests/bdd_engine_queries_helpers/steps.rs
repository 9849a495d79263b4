//! Given/when/then steps for engine query scenarios.

use podbridge::engine::{CommandResult, EngineClient, EngineKind, SemVerTriple};
use rstest_bdd_macros::{given, then, when};

use super::host::{FakeHost, client_for};
use super::state::EngineQueryState;

pub(crate) type StepResult<T> = Result<T, String>;

fn build_client(engine_query_state: &EngineQueryState) -> StepResult<EngineClient> {
    let kind = engine_query_state
        .kind
        .get()
        .ok_or_else(|| String::from("connector kind should be set"))?;
    let invocations = engine_query_state
        .invocations
        .get()
        .ok_or_else(|| String::from("invocation log should be set"))?;
    let host = FakeHost {
        found: engine_query_state.program_found.get().unwrap_or(true),
        version: engine_query_state
            .version
            .get()
            .unwrap_or_else(|| SemVerTriple::new(4, 9, 3)),
        output: engine_query_state
            .output
            .get()
            .unwrap_or_else(|| CommandResult::from_exit(0, "", "")),
        invocations,
    };
    Ok(client_for(kind, host))
}

fn run_query<F, Fut>(engine_query_state: &EngineQueryState, query: F) -> StepResult<()>
where
    F: FnOnce(EngineClient) -> Fut,
    Fut: Future<Output = Vec<serde_json::Value>>,
{
    let client = build_client(engine_query_state)?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| format!("failed to create tokio runtime: {err}"))?;
    let listed = runtime.block_on(query(client));
    engine_query_state.listed.set(listed);
    Ok(())
}

fn recorded_commands(engine_query_state: &EngineQueryState) -> StepResult<Vec<String>> {
    let invocations = engine_query_state
        .invocations
        .get()
        .ok_or_else(|| String::from("invocation log should be set"))?;
    let commands = invocations
        .lock()
        .map_err(|_| String::from("invocation log poisoned"))?
        .clone();
    Ok(commands)
}

#[given("a {key} connector")]
fn given_connector(engine_query_state: &EngineQueryState, key: String) -> StepResult<()> {
    let kind = EngineKind::from_key(&key).ok_or_else(|| format!("unknown connector {key}"))?;
    engine_query_state.kind.set(kind);
    Ok(())
}

#[given("the engine program is missing")]
fn given_program_missing(engine_query_state: &EngineQueryState) {
    engine_query_state.program_found.set(false);
}

#[given("the engine reports version {version}")]
fn given_engine_version(engine_query_state: &EngineQueryState, version: String) -> StepResult<()> {
    let parsed = SemVerTriple::parse(&version).ok_or_else(|| format!("bad version {version}"))?;
    engine_query_state.version.set(parsed);
    Ok(())
}

#[given("the engine prints a running default machine")]
fn given_running_machine(engine_query_state: &EngineQueryState) {
    engine_query_state.output.set(CommandResult::from_exit(
        0,
        r#"[{"Name":"default","Running":true}]"#,
        "",
    ));
}

#[given("the engine prints plain text")]
fn given_plain_text(engine_query_state: &EngineQueryState) {
    engine_query_state.output.set(CommandResult::from_exit(
        0,
        "Name  URI  Identity  Default\nlocal unix:///run/podman/podman.sock    true\n",
        "",
    ));
}

#[given("the engine command fails")]
fn given_command_fails(engine_query_state: &EngineQueryState) {
    engine_query_state.output.set(CommandResult::from_exit(
        125,
        "",
        "Error: cannot connect to Podman",
    ));
}

#[when("machines are listed")]
fn when_machines_listed(engine_query_state: &EngineQueryState) -> StepResult<()> {
    run_query(engine_query_state, |client| async move {
        client.get_machines(None).await
    })
}

#[when("system connections are listed")]
fn when_connections_listed(engine_query_state: &EngineQueryState) -> StepResult<()> {
    run_query(engine_query_state, |client| async move {
        client.get_system_connections(None).await
    })
}

#[when("availability is checked")]
fn when_availability_checked(engine_query_state: &EngineQueryState) -> StepResult<()> {
    let client = build_client(engine_query_state)?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| format!("failed to create tokio runtime: {err}"))?;
    let availability = runtime.block_on(client.check_availability());
    engine_query_state.availability.set(availability);
    Ok(())
}

#[then("no engine command is run")]
fn then_no_command(engine_query_state: &EngineQueryState) -> StepResult<()> {
    let commands = recorded_commands(engine_query_state)?;
    if commands.is_empty() {
        Ok(())
    } else {
        Err(format!("unexpected engine commands: {commands:?}"))
    }
}

fn expect_listed(engine_query_state: &EngineQueryState, count: usize) -> StepResult<()> {
    let listed = engine_query_state
        .listed
        .get()
        .ok_or_else(|| String::from("query result should be set"))?;
    if listed.len() == count {
        Ok(())
    } else {
        Err(format!("expected {count} entries, got {listed:?}"))
    }
}

#[then("{count} machines are returned")]
fn then_machines_returned(engine_query_state: &EngineQueryState, count: usize) -> StepResult<()> {
    expect_listed(engine_query_state, count)
}

#[then("{count} connections are returned")]
fn then_connections_returned(
    engine_query_state: &EngineQueryState,
    count: usize,
) -> StepResult<()> {
    expect_listed(engine_query_state, count)
}

#[then("the engine command was {command}")]
fn then_engine_command(engine_query_state: &EngineQueryState, command: String) -> StepResult<()> {
    let commands = recorded_commands(engine_query_state)?;
    if commands == [command.as_str()] {
        Ok(())
    } else {
        Err(format!("expected only `{command}`, got {commands:?}"))
    }
}

#[then("the connector is unavailable")]
fn then_unavailable(engine_query_state: &EngineQueryState) -> StepResult<()> {
    let availability = engine_query_state
        .availability
        .get()
        .ok_or_else(|| String::from("availability should be set"))?;
    match availability.reason {
        Some(_) if !availability.available => Ok(()),
        Some(reason) => Err(format!("available connector carries a reason: {reason}")),
        None => Err(String::from("an unavailable connector should say why")),
    }
}
