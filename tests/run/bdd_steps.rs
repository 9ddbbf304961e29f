//! BDD step definitions for the run lifecycle.

use rstest_bdd_macros::{given, then, when};
use sortie::{SessionError, SessionMode};
use tokio::runtime::Runtime;

use super::test_doubles::{Event, INSTANCE_ID, PUBLIC_IP};
use super::test_helpers::RunContext;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a provisioner whose instance boots")]
fn instance_boots(run_context: RunContext) -> RunContext {
    run_context
}

#[given("a provisioner whose instance never boots")]
fn instance_never_boots(run_context: RunContext) -> RunContext {
    run_context.provisioner.never_ready();
    run_context
}

#[given("the session exits with code \"{code}\"")]
fn session_exits(run_context: RunContext, code: i32) -> RunContext {
    run_context.sessions.exit_with(code);
    run_context
}

#[given("the session cannot connect")]
fn session_cannot_connect(run_context: RunContext) -> RunContext {
    run_context.sessions.fail_with(SessionError::ConnectionFailed {
        host: PUBLIC_IP.to_string(),
        message: String::from("connection refused"),
    });
    run_context
}

#[given("the run removes the instance afterwards")]
fn auto_remove(mut run_context: RunContext) -> RunContext {
    run_context.request.auto_remove = true;
    run_context
}

#[given("the run uses a temporary key")]
fn temporary_key(mut run_context: RunContext) -> RunContext {
    run_context.request.tmp_ssh_key = true;
    run_context
}

#[given("a timeout of \"{seconds}\" seconds")]
fn run_timeout(mut run_context: RunContext, seconds: u64) -> RunContext {
    run_context.request.timeout_seconds = seconds;
    run_context
}

#[given("removing the instance fails")]
fn removal_fails(run_context: RunContext) -> RunContext {
    run_context.provisioner.fail_on_delete();
    run_context
}

fn execute(mut run_context: RunContext) -> Result<RunContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))?;
    runtime.block_on(run_context.execute());
    Ok(run_context)
}

#[when("I run \"{command}\" on the instance")]
fn run_command(mut run_context: RunContext, command: String) -> Result<RunContext, StepError> {
    run_context.request.command = command.split_whitespace().map(str::to_owned).collect();
    execute(run_context)
}

#[when("I detach from a new instance")]
fn detach(mut run_context: RunContext) -> Result<RunContext, StepError> {
    run_context.request.command.clear();
    run_context.request.session_mode = SessionMode::Detach;
    execute(run_context)
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[then("the run exit code is \"{code}\"")]
fn exit_code(run_context: &RunContext, code: i32) -> Result<(), StepError> {
    let actual = run_context.report().exit_code;
    check(actual == code, || format!("expected exit code {code}, got {actual}"))
}

#[then("the run ends in state \"{state}\"")]
fn final_state(run_context: &RunContext, state: String) -> Result<(), StepError> {
    let actual = run_context
        .report()
        .final_state()
        .map(|reached| reached.to_string());
    check(actual.as_deref() == Some(state.as_str()), || {
        format!("expected final state {state}, got {actual:?}")
    })
}

#[then("the run error kind is \"{kind}\"")]
fn error_kind(run_context: &RunContext, kind: String) -> Result<(), StepError> {
    let actual = run_context
        .report()
        .error
        .as_ref()
        .map(|err| err.kind.to_string());
    check(actual.as_deref() == Some(kind.as_str()), || {
        format!("expected error kind {kind}, got {actual:?}")
    })
}

#[then("the instance is removed once")]
fn removed_once(run_context: &RunContext) -> Result<(), StepError> {
    let deletes = run_context.journal.count(&Event::Delete);
    check(deletes == 1, || format!("expected one delete, saw {deletes}"))
}

#[then("the instance is not removed")]
fn not_removed(run_context: &RunContext) -> Result<(), StepError> {
    let deletes = run_context.journal.count(&Event::Delete);
    check(deletes == 0, || format!("expected no delete, saw {deletes}"))
}

#[then("the temporary key is discarded once")]
fn key_discarded_once(run_context: &RunContext) -> Result<(), StepError> {
    let discards = run_context.journal.count(&Event::DiscardKey);
    check(discards == 1, || format!("expected one discard, saw {discards}"))
}

#[then("no session was opened")]
fn no_session(run_context: &RunContext) -> Result<(), StepError> {
    let opens = run_context.journal.count(&Event::Open);
    check(opens == 0, || format!("expected no session, saw {opens}"))
}

#[then("the output is the instance identifier")]
fn output_is_identifier(run_context: &RunContext) -> Result<(), StepError> {
    let output = run_context.output_text();
    check(output == format!("{INSTANCE_ID}\n"), || {
        format!("unexpected output: {output:?}")
    })
}

#[then("a cleanup failure is reported")]
fn cleanup_failure(run_context: &RunContext) -> Result<(), StepError> {
    let cleanup = run_context.report().cleanup_error.as_ref();
    check(
        cleanup.is_some_and(|err| err.message.contains("failed to remove instance")),
        || format!("unexpected cleanup error: {cleanup:?}"),
    )
}
