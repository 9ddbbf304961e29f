//! Shared fixtures for run lifecycle tests.

use std::time::Duration;

use rstest::fixture;
use sortie::{Interrupt, RunOrchestrator, RunReport, RunRequest};

use super::test_doubles::{Journal, ScriptedKeys, ScriptedProvisioner, ScriptedSessions};

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type ScriptedOrchestrator = RunOrchestrator<ScriptedProvisioner, ScriptedSessions, ScriptedKeys>;

#[derive(Clone, Debug)]
pub struct RunContext {
    pub journal: Journal,
    pub provisioner: ScriptedProvisioner,
    pub sessions: ScriptedSessions,
    pub keys: ScriptedKeys,
    pub request: RunRequest,
    pub interrupt: Interrupt,
    pub report: Option<RunReport>,
    pub output: Vec<u8>,
}

impl RunContext {
    pub fn orchestrator(&self) -> ScriptedOrchestrator {
        RunOrchestrator::new(
            self.provisioner.clone(),
            self.sessions.clone(),
            self.keys.clone(),
        )
        .with_interrupt(self.interrupt.clone())
        .with_poll_interval(POLL_INTERVAL)
        .with_max_backoff(POLL_INTERVAL * 4)
    }

    /// Runs the request and stores the report and captured output.
    pub async fn execute(&mut self) -> &RunReport {
        let mut output = Vec::new();
        let report = self.orchestrator().execute(&self.request, &mut output).await;
        self.output = output;
        self.report.insert(report)
    }

    pub fn report(&self) -> &RunReport {
        self.report
            .as_ref()
            .unwrap_or_else(|| panic!("run has not been executed"))
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

pub fn request() -> RunRequest {
    let mut request = RunRequest::new("ubuntu_noble");
    request.command = vec![String::from("uname"), String::from("-a")];
    request
}

pub fn build_run_context() -> RunContext {
    let journal = Journal::default();
    RunContext {
        provisioner: ScriptedProvisioner::new(journal.clone()),
        sessions: ScriptedSessions::new(journal.clone()),
        keys: ScriptedKeys::new(journal.clone()),
        journal,
        request: request(),
        interrupt: Interrupt::never(),
        report: None,
        output: Vec::new(),
    }
}

#[fixture]
pub fn run_context() -> RunContext {
    build_run_context()
}
