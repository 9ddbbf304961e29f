//! Binary entry point for the `sortie` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::{CommandFactory, Parser};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cli::Cli;
use sortie::{
    ErrorKind, Interrupt, RunFlags, RunOrchestrator, RunReport, ScalewayBackend, ScalewayConfig,
    SessionConfig, SshKeygen, SshSessionRunner, Validated, ValidationError, validate,
};

const DEFAULT_LOG_FILTER: &str = "sortie=info";
const EXIT_SETUP_FAILED: i32 = 1;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match validate(&into_flags(cli)) {
        Ok(Validated::Help) => {
            write_help(io::stdout());
            0
        }
        Ok(Validated::Run(request)) => {
            init_tracing();
            match run(&request).await {
                Ok(report) => {
                    write_report(io::stderr(), &report);
                    report.exit_code
                }
                Err(err) => {
                    writeln!(io::stderr(), "sortie: {err}").ok();
                    EXIT_SETUP_FAILED
                }
            }
        }
        Err(err) => {
            write_usage_error(io::stderr(), &err);
            sortie::RunError::from(err).exit_code()
        }
    };

    process::exit(exit_code);
}

async fn run(request: &sortie::RunRequest) -> Result<RunReport, CliError> {
    let scaleway_config =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let session_config =
        SessionConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    session_config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let backend =
        ScalewayBackend::new(scaleway_config).map_err(|err| CliError::Backend(err.to_string()))?;
    let keys = SshKeygen::new(session_config.ssh_keygen_bin.clone());
    let sessions = SshSessionRunner::new(session_config);

    let orchestrator =
        RunOrchestrator::new(backend, sessions, keys).with_interrupt(Interrupt::from_ctrl_c());
    Ok(orchestrator.execute(request, &mut io::stdout()).await)
}

fn into_flags(cli: Cli) -> RunFlags {
    RunFlags {
        help: cli.help,
        args: cli.args,
        name: cli.name,
        bootscript: cli.bootscript,
        env: cli.env,
        volume: cli.volume,
        timeout: cli.timeout,
        ip_address: cli.ip_address,
        attach: cli.attach,
        detach: cli.detach,
        gateway: cli.gateway,
        userdata: cli.userdata,
        commercial_type: cli.commercial_type,
        boot_type: cli.boot_type,
        ssh_user: cli.ssh_user,
        auto_remove: cli.auto_remove,
        ipv6: cli.ipv6,
        tmp_ssh_key: cli.tmp_ssh_key,
        show_boot: cli.show_boot,
        ssh_port: cli.ssh_port,
        no_tty: cli.no_tty,
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        writeln!(io::stderr(), "sortie: failed to install logger: {err}").ok();
    }
}

fn write_help(mut target: impl Write) {
    writeln!(target, "{}", Cli::command().render_long_help()).ok();
}

fn write_usage_error(mut target: impl Write, err: &ValidationError) {
    writeln!(target, "sortie: {err}").ok();
    if err.kind() == ErrorKind::MissingArgument {
        writeln!(target, "{}", Cli::command().render_usage()).ok();
    } else {
        writeln!(target, "Try 'sortie --help' for more information.").ok();
    }
}

fn write_report(mut target: impl Write, report: &RunReport) {
    if let Some(err) = &report.cleanup_error {
        writeln!(target, "sortie: warning: {err}").ok();
    }
    match &report.error {
        Some(err) if err.kind == ErrorKind::RemoteCommandFailed => {}
        Some(err) => {
            writeln!(target, "sortie: {err}").ok();
        }
        None => {}
    }
}
