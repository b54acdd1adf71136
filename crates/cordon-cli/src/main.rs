//! cordon CLI - Run an executable under kernel-enforced confinement
//!
//! Exit codes: the target's own exit status when it exits normally,
//! 128+signal when it is killed (including SIGSYS policy violations),
//! and 1 for argument errors or a fatal setup failure.

use clap::{Parser, ValueEnum};
use cordon_core::policy::{PolicyBuilder, ViolationMode};
use cordon_core::supervisor::{Sandbox, TerminationOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cordon")]
#[command(
    author,
    version,
    about = "Run an executable under Landlock filesystem rules and a seccomp syscall allow-list"
)]
#[command(after_help = "Example:\n  \
    cordon --read=/usr/lib --read=/etc --write=/tmp --exec=/usr/bin python3 script.py")]
struct Cli {
    /// Allow read access beneath PATH (repeatable)
    #[arg(long = "read", value_name = "PATH")]
    read: Vec<PathBuf>,

    /// Allow write access beneath PATH (repeatable)
    #[arg(long = "write", value_name = "PATH")]
    write: Vec<PathBuf>,

    /// Allow execution beneath PATH (repeatable)
    #[arg(long = "exec", value_name = "PATH")]
    exec: Vec<PathBuf>,

    /// Append sandbox lifecycle events to PATH
    #[arg(long, value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Action for a syscall outside the allow-list
    #[arg(long = "seccomp-block", value_enum, default_value = "kill")]
    seccomp_block: BlockMode,

    /// Target executable and its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true
    )]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BlockMode {
    /// Kill the process on the first violation (default)
    Kill,
    /// Log violations but allow them (NOT a security boundary)
    Log,
    /// Denied syscalls return EPERM
    Errno,
}

impl From<BlockMode> for ViolationMode {
    fn from(mode: BlockMode) -> Self {
        match mode {
            BlockMode::Kill => Self::Kill,
            BlockMode::Log => Self::LogOnly,
            BlockMode::Errno => Self::ReturnError,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders its own usage/error text; the exit code is ours.
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "sandbox setup failed");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cordon=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> cordon_core::Result<ExitCode> {
    let mut builder = PolicyBuilder::new().violation_mode(cli.seccomp_block.into());
    for path in cli.read {
        builder = builder.read(path);
    }
    for path in cli.write {
        builder = builder.write(path);
    }
    for path in cli.exec {
        builder = builder.exec(path);
    }
    if let Some(path) = cli.logfile {
        builder = builder.audit_log(path);
    }

    let mut command = cli.command.into_iter();
    let program = command.next().unwrap_or_default();
    let policy = builder.command(program, command).build()?.with_essential_paths();

    tracing::info!(
        program = %policy.request.program,
        rules = policy.rules().len(),
        mode = ?policy.violation_mode,
        "starting confined execution"
    );

    let outcome = Sandbox::new(policy)?.run()?;
    match outcome {
        TerminationOutcome::Exited(code) => tracing::info!(code, "child exited"),
        TerminationOutcome::PolicyViolation => {
            tracing::warn!("child killed by seccomp policy violation");
        }
        TerminationOutcome::Signaled(signal) => tracing::warn!(%signal, "child killed by signal"),
    }

    let code = u8::try_from(outcome.exit_code() & 0xff).unwrap_or(1);
    Ok(ExitCode::from(code))
}
