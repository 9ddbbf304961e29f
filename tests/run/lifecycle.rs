//! Property tests for the run lifecycle driven through scripted doubles.

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use sortie::{
    ErrorKind, Interrupt, InstanceState, RunFlags, RunState, SessionError, SessionMode, validate,
};
use tokio::time::Instant;

use super::test_doubles::{
    EPHEMERAL_IDENTITY, Event, INSTANCE_ID, PRIVATE_IP, PUBLIC_IP, ScriptedError,
};
use super::test_helpers::{RunContext, run_context};

#[rstest]
fn attach_with_command_is_rejected_before_provisioning(run_context: RunContext) {
    let flags = RunFlags {
        attach: true,
        args: vec![String::from("ubuntu_noble"), String::from("bash")],
        ..RunFlags::default()
    };

    let err = validate(&flags).expect_err("attach with a command must be rejected");

    assert_eq!(err.kind(), ErrorKind::ConflictingOptions);
    assert!(run_context.journal.events().is_empty());
}

#[rstest]
#[tokio::test]
async fn remote_exit_code_is_reported_verbatim(mut run_context: RunContext) {
    run_context.sessions.exit_with(17);

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 17);
    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::RemoteCommandFailed)
    );
    assert_eq!(
        report.states,
        vec![
            RunState::Validating,
            RunState::Provisioning,
            RunState::AwaitingBoot,
            RunState::SessionActive,
            RunState::Cleanup,
            RunState::Done,
        ]
    );
    assert_eq!(report.instance_id.as_deref(), Some(INSTANCE_ID));
}

#[rstest]
#[tokio::test]
async fn successful_run_leaves_instance_without_rm(mut run_context: RunContext) {
    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 0);
    assert!(report.error.is_none());
    assert_eq!(run_context.journal.count(&Event::Delete), 0);
    assert_eq!(report.final_state(), Some(RunState::Done));
}

#[rstest]
#[tokio::test]
async fn session_targets_public_address_with_request_options(mut run_context: RunContext) {
    run_context.request.ssh_user = String::from("admin");
    run_context.request.ssh_port = 2222;
    run_context.request.no_tty = true;

    run_context.execute().await;

    let requests = run_context.sessions.requests();
    let [session] = requests.as_slice() else {
        panic!("expected exactly one session, got {requests:?}");
    };
    assert_eq!(session.target.host, PUBLIC_IP);
    assert_eq!(session.target.port, 2222);
    assert_eq!(session.target.user, "admin");
    assert!(!session.tty);
    assert_eq!(session.command, vec!["uname", "-a"]);
    assert!(session.gateway.is_none());
    assert!(session.identity_file.is_none());
}

#[rstest]
#[tokio::test]
async fn relayed_session_targets_private_address(mut run_context: RunContext) {
    run_context.request.gateway = Some(String::from("jump@bastion.example"));

    run_context.execute().await;

    let requests = run_context.sessions.requests();
    let [session] = requests.as_slice() else {
        panic!("expected exactly one session, got {requests:?}");
    };
    assert_eq!(session.target.host, PRIVATE_IP);
    let gateway = session.gateway.as_ref().expect("gateway should be forwarded");
    assert_eq!(gateway.host, "bastion.example");
    assert_eq!(gateway.user.as_deref(), Some("jump"));
}

#[rstest]
#[tokio::test]
async fn auto_remove_deletes_after_session(mut run_context: RunContext) {
    run_context.request.auto_remove = true;
    run_context.sessions.exit_with(3);

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 3);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert!(run_context.journal.position(&Event::Open) < run_context.journal.position(&Event::Delete));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timeout_routes_through_cleanup_and_deletes_once(mut run_context: RunContext) {
    run_context.request.timeout_seconds = 5;
    run_context.request.auto_remove = true;
    run_context.provisioner.never_ready();
    let started = Instant::now();

    let report = run_context.execute().await.clone();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "gave up after {elapsed:?}");
    let err = report.error.as_ref().expect("timeout should be reported");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(report.exit_code, 124);
    assert!(report.visited(RunState::Cleanup));
    assert_eq!(report.final_state(), Some(RunState::Aborted));
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert_eq!(run_context.journal.count(&Event::Open), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timeout_covers_the_session(mut run_context: RunContext) {
    run_context.request.timeout_seconds = 30;
    run_context.sessions.hang();

    let report = run_context.execute().await.clone();

    assert_eq!(report.error.as_ref().map(|err| err.kind), Some(ErrorKind::Timeout));
    assert_eq!(run_context.journal.count(&Event::Open), 1);
}

#[rstest]
#[tokio::test]
async fn transient_poll_failures_are_retried(mut run_context: RunContext) {
    run_context.provisioner.push_poll(Err(ScriptedError::Poll));
    run_context.provisioner.push_poll(Err(ScriptedError::Poll));
    run_context.provisioner.push_poll(Ok(InstanceState::Starting));

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 0);
    assert!(run_context.journal.count(&Event::Poll) >= 4);
}

#[rstest]
#[tokio::test]
async fn create_failure_aborts_without_cleanup(mut run_context: RunContext) {
    run_context.request.auto_remove = true;
    run_context.provisioner.fail_on_create();

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 125);
    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::ProvisioningFailed)
    );
    assert!(!report.visited(RunState::Cleanup));
    assert_eq!(report.final_state(), Some(RunState::Aborted));
    assert_eq!(run_context.journal.count(&Event::Delete), 0);
    assert!(report.instance_id.is_none());
}

#[rstest]
#[tokio::test]
async fn connection_failure_still_removes_instance(mut run_context: RunContext) {
    run_context.request.auto_remove = true;
    run_context.sessions.fail_with(SessionError::ConnectionFailed {
        host: PUBLIC_IP.to_string(),
        message: String::from("connection refused"),
    });

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 255);
    let err = report.error.as_ref().expect("connection failure should be reported");
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    assert!(err.message.contains("connection refused"), "{}", err.message);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
}

#[rstest]
#[tokio::test]
async fn instance_without_address_cannot_be_reached(mut run_context: RunContext) {
    run_context.provisioner.without_addresses();

    let report = run_context.execute().await.clone();

    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::ConnectionFailed)
    );
    assert_eq!(run_context.journal.count(&Event::Open), 0);
}

#[rstest]
#[tokio::test]
async fn delete_failure_is_reported_without_changing_exit_code(mut run_context: RunContext) {
    run_context.request.auto_remove = true;
    run_context.provisioner.fail_on_delete();

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 0);
    assert!(report.error.is_none());
    let cleanup = report.cleanup_error.as_ref().expect("cleanup failure should be surfaced");
    assert_eq!(cleanup.kind, ErrorKind::CleanupFailed);
    assert_eq!(report.final_state(), Some(RunState::Done));
}

#[rstest]
#[tokio::test]
async fn detach_prints_identifier_and_skips_session(mut run_context: RunContext) {
    run_context.request.command.clear();
    run_context.request.session_mode = SessionMode::Detach;

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 0);
    assert_eq!(run_context.output_text(), format!("{INSTANCE_ID}\n"));
    assert_eq!(run_context.journal.count(&Event::Open), 0);
    assert_eq!(run_context.journal.count(&Event::Delete), 0);
    assert!(!report.visited(RunState::SessionActive));
    assert!(!report.visited(RunState::Cleanup));
    assert_eq!(report.final_state(), Some(RunState::Done));
}

#[rstest]
#[tokio::test]
async fn show_boot_streams_console_and_skips_session(mut run_context: RunContext) {
    run_context.request.command.clear();
    run_context.request.session_mode = SessionMode::ShowBoot;
    run_context.request.auto_remove = true;
    run_context.provisioner.push_poll(Ok(InstanceState::Starting));
    run_context.provisioner.push_boot_chunk("starting: allocating node\n");
    run_context.provisioner.push_boot_chunk("running\n");

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 0);
    assert_eq!(
        run_context.output_text(),
        "starting: allocating node\nrunning\n"
    );
    assert_eq!(run_context.journal.count(&Event::StreamBoot), 1);
    assert_eq!(run_context.journal.count(&Event::Open), 0);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
}

#[rstest]
#[tokio::test]
async fn show_boot_reports_console_failures(mut run_context: RunContext) {
    run_context.request.command.clear();
    run_context.request.session_mode = SessionMode::ShowBoot;
    run_context.provisioner.fail_boot_stream();

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 123);
    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::BootOutputFailed)
    );
    assert!(report.visited(RunState::Cleanup));
}

#[rstest]
#[tokio::test]
async fn interrupt_routes_through_cleanup(mut run_context: RunContext) {
    let (trigger, interrupt) = Interrupt::pair();
    run_context.interrupt = interrupt;
    run_context.request.auto_remove = true;
    run_context.request.tmp_ssh_key = true;
    run_context.sessions.interrupt_with(Arc::new(trigger));

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 130);
    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::SessionInterrupted)
    );
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert_eq!(run_context.journal.count(&Event::DiscardKey), 1);
    assert_eq!(report.final_state(), Some(RunState::Aborted));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timeout_during_creation_still_removes_instance(mut run_context: RunContext) {
    run_context.request.auto_remove = true;
    run_context.request.timeout_seconds = 5;
    run_context.provisioner.delay_create(Duration::from_secs(10));

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 124);
    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::Timeout)
    );
    assert_eq!(run_context.journal.count(&Event::Create), 1);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert_eq!(run_context.journal.count(&Event::Open), 0);
    assert_eq!(report.instance_id.as_deref(), Some(INSTANCE_ID));
    assert!(report.visited(RunState::Cleanup));
    assert_eq!(report.final_state(), Some(RunState::Aborted));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn interrupt_during_creation_still_removes_instance(mut run_context: RunContext) {
    let (trigger, interrupt) = Interrupt::pair();
    run_context.interrupt = interrupt;
    run_context.request.auto_remove = true;
    run_context.provisioner.delay_create(Duration::from_secs(3));
    trigger.fire();

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 130);
    assert_eq!(run_context.journal.count(&Event::Create), 1);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert_eq!(report.instance_id.as_deref(), Some(INSTANCE_ID));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn second_interrupt_abandons_removal(mut run_context: RunContext) {
    let (trigger, interrupt) = Interrupt::pair();
    let trigger = Arc::new(trigger);
    run_context.interrupt = interrupt;
    run_context.request.auto_remove = true;
    run_context.request.tmp_ssh_key = true;
    run_context.sessions.interrupt_with(Arc::clone(&trigger));
    run_context.provisioner.interrupt_on_delete(trigger);

    let report = run_context.execute().await.clone();

    assert_eq!(report.exit_code, 130);
    assert_eq!(run_context.journal.count(&Event::Delete), 1);
    assert_eq!(run_context.journal.count(&Event::DiscardKey), 1);
    let cleanup = report
        .cleanup_error
        .unwrap_or_else(|| panic!("abandoned removal should be reported"));
    assert_eq!(cleanup.kind, ErrorKind::CleanupFailed);
    assert!(cleanup.message.contains("abandoned"), "unexpected: {}", cleanup.message);
}

#[derive(Clone, Copy, Debug)]
enum Ending {
    Success,
    Timeout,
    ConnectionFailure,
}

#[rstest]
#[case::success(Ending::Success)]
#[case::timeout(Ending::Timeout)]
#[case::connection_failure(Ending::ConnectionFailure)]
#[tokio::test(start_paused = true)]
async fn temporary_key_is_discarded_exactly_once(
    mut run_context: RunContext,
    #[case] ending: Ending,
) {
    run_context.request.tmp_ssh_key = true;
    match ending {
        Ending::Success => {}
        Ending::Timeout => {
            run_context.request.timeout_seconds = 5;
            run_context.provisioner.never_ready();
        }
        Ending::ConnectionFailure => run_context.sessions.fail_with(SessionError::ConnectionFailed {
            host: PUBLIC_IP.to_string(),
            message: String::from("no route to host"),
        }),
    }

    run_context.execute().await;

    let journal = &run_context.journal;
    assert_eq!(journal.count(&Event::GenerateKey), 1);
    assert_eq!(journal.count(&Event::DiscardKey), 1);
    assert!(journal.position(&Event::GenerateKey) < journal.position(&Event::Create));
    assert_eq!(journal.events().last(), Some(&Event::DiscardKey));
    if let Some(opened) = journal.position(&Event::Open) {
        assert!(Some(opened) < journal.position(&Event::DiscardKey));
        let requests = run_context.sessions.requests();
        assert_eq!(
            requests
                .first()
                .and_then(|request| request.identity_file.as_ref())
                .map(|path| path.as_str()),
            Some(EPHEMERAL_IDENTITY)
        );
    }
    let spec = run_context
        .provisioner
        .last_spec()
        .expect("create should have been called");
    assert!(
        spec.tags
            .iter()
            .any(|tag| tag.starts_with("AUTHORIZED_KEY=ssh-ed25519_")),
        "{:?}",
        spec.tags
    );
}

#[rstest]
#[tokio::test]
async fn key_generation_failure_aborts_before_create(mut run_context: RunContext) {
    run_context.request.tmp_ssh_key = true;
    run_context.keys.fail_on_generate();

    let report = run_context.execute().await.clone();

    assert_eq!(
        report.error.as_ref().map(|err| err.kind),
        Some(ErrorKind::ProvisioningFailed)
    );
    assert_eq!(run_context.journal.count(&Event::Create), 0);
    assert_eq!(run_context.journal.count(&Event::DiscardKey), 0);
}
