//! Confined process orchestration
//!
//! One fork, two actors. The child applies the filesystem layer, then
//! the syscall filter, then execs the target; any failure along the way
//! exits with a distinguished status rather than running the target
//! unconfined. The parent blocks in `waitpid` (no timeout; bounded waits
//! are the caller's concern) and classifies the termination.

use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

use crate::audit::AuditLog;
use crate::isolation::{FilesystemPolicy, LayerStatus, SyscallFilter};
use crate::policy::SandboxPolicy;
use crate::{CordonError, Result};

/// Exit status the child reports when a confinement layer could not be
/// applied.
pub const SETUP_FAILURE_STATUS: i32 = 125;

/// Exit status the child reports when the target could not be executed.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// How the confined child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The target exited on its own with this status.
    Exited(i32),
    /// The child was killed by a signal unrelated to the syscall filter.
    Signaled(Signal),
    /// The child was killed by the syscall filter (SIGSYS). This is the
    /// one reliable observation that the filter layer actually fired.
    PolicyViolation,
}

impl TerminationOutcome {
    /// Process exit code conveying this outcome to a shell: the target's
    /// own status for a normal exit, 128+signal for a kill.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(sig) => 128 + *sig as i32,
            Self::PolicyViolation => 128 + Signal::SIGSYS as i32,
        }
    }

    /// Refines a wait status; `None` for state changes that are not a
    /// termination (the supervisor keeps waiting on those).
    pub(crate) fn classify(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, Signal::SIGSYS, _) => Some(Self::PolicyViolation),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }
}

/// A single confined execution: fork, restrict, exec, wait, classify.
pub struct Sandbox {
    policy: SandboxPolicy,
    audit: Option<AuditLog>,
}

impl Sandbox {
    /// Binds a policy to a sandbox, opening the audit log if one is
    /// configured.
    ///
    /// # Errors
    ///
    /// Fails when the audit log cannot be opened for append.
    pub fn new(policy: SandboxPolicy) -> Result<Self> {
        let audit = match &policy.audit_log {
            Some(path) => Some(AuditLog::open(path)?),
            None => None,
        };
        Ok(Self { policy, audit })
    }

    /// Runs the target under confinement. At most one attempt per call;
    /// the parent never retries.
    ///
    /// # Errors
    ///
    /// Fails when the fork or the wait itself fails. Confinement or exec
    /// failures inside the child surface as a [`TerminationOutcome`] with
    /// the distinguished statuses, not as an error here.
    pub fn run(self) -> Result<TerminationOutcome> {
        if let Some(audit) = &self.audit {
            audit.record(&format!(
                "starting sandboxed execution of {}",
                self.policy.request.program
            ));
        }

        // SAFETY: the child touches no shared state after the fork; it
        // only performs confinement setup and exec before its image is
        // replaced or it _exits.
        match unsafe { fork() }
            .map_err(|e| CordonError::Spawn(format!("fork failed: {e}")))?
        {
            ForkResult::Child => {
                let status = confine_and_exec(&self.policy);
                // SAFETY: terminating the child without running parent
                // atexit handlers or flushing shared stdio buffers twice.
                unsafe { libc::_exit(status) }
            }
            ForkResult::Parent { child } => self.supervise(child),
        }
    }

    fn supervise(&self, child: Pid) -> Result<TerminationOutcome> {
        tracing::debug!(pid = %child, "waiting for confined child");

        let outcome = loop {
            match waitpid(child, None) {
                Ok(status) => {
                    if let Some(outcome) = TerminationOutcome::classify(status) {
                        break outcome;
                    }
                }
                Err(nix::errno::Errno::EINTR) => {}
                Err(e) => return Err(e.into()),
            }
        };

        match outcome {
            TerminationOutcome::Exited(code) => {
                tracing::debug!(code, "child exited");
                if let Some(audit) = &self.audit {
                    audit.record(&format!("child exited with status {code}"));
                }
            }
            TerminationOutcome::PolicyViolation => {
                tracing::warn!("child killed by seccomp: syscall violation");
                if let Some(audit) = &self.audit {
                    audit.record("process killed by seccomp - syscall violation detected");
                }
            }
            TerminationOutcome::Signaled(signal) => {
                tracing::warn!(%signal, "child killed by signal");
                if let Some(audit) = &self.audit {
                    audit.record(&format!("child killed by signal {signal}"));
                }
            }
        }

        Ok(outcome)
    }
}

/// Applies both confinement layers in their required order.
///
/// The filesystem layer must complete before the syscall filter is
/// installed: the filter would deny the syscalls rule installation
/// itself needs. Generic over the layers so the sequencing is testable
/// without restricting the test process.
pub(crate) fn apply_confinement<Fs, Sc>(
    policy: &SandboxPolicy,
    fs_layer: Fs,
    syscall_layer: Sc,
) -> Result<()>
where
    Fs: FnOnce(&SandboxPolicy) -> Result<LayerStatus>,
    Sc: FnOnce(&SandboxPolicy) -> Result<LayerStatus>,
{
    if fs_layer(policy)? == LayerStatus::Unsupported {
        tracing::warn!("continuing without filesystem confinement");
    }
    if syscall_layer(policy)? == LayerStatus::Unsupported {
        tracing::warn!("continuing without syscall filtering");
    }
    Ok(())
}

/// Child-side setup: restrict, then exec. Returns the exit status to
/// report instead of returning control; the caller `_exit`s with it.
fn confine_and_exec(policy: &SandboxPolicy) -> i32 {
    let confined = apply_confinement(
        policy,
        |p| FilesystemPolicy::from_policy(p).apply(),
        |p| SyscallFilter::new(p.violation_mode).apply(),
    );
    if let Err(e) = confined {
        tracing::error!(error = %e, "failed to confine child; refusing to run target");
        return SETUP_FAILURE_STATUS;
    }

    let (program, argv) = match policy.request.to_cstrings() {
        Ok(converted) => converted,
        Err(e) => {
            tracing::error!(error = %e, "invalid exec request");
            return EXEC_FAILURE_STATUS;
        }
    };

    // execvp resolves a bare program name against PATH; it only returns
    // on failure (including a denial by the layers just installed).
    let err = match nix::unistd::execvp(&program, &argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    tracing::error!(
        program = %policy.request.program,
        error = %err,
        "failed to execute target"
    );
    EXEC_FAILURE_STATUS
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> SandboxPolicy {
        PolicyBuilder::new()
            .read("/usr")
            .command("/bin/true", Vec::<String>::new())
            .build()
            .expect("valid policy")
    }

    #[test]
    fn filesystem_layer_applies_before_syscall_layer() {
        let order = RefCell::new(Vec::new());

        apply_confinement(
            &policy(),
            |_| {
                order.borrow_mut().push("filesystem");
                Ok(LayerStatus::Enforced)
            },
            |_| {
                order.borrow_mut().push("seccomp");
                Ok(LayerStatus::Enforced)
            },
        )
        .expect("both layers succeed");

        assert_eq!(*order.borrow(), ["filesystem", "seccomp"]);
    }

    #[test]
    fn unsupported_filesystem_layer_still_reaches_syscall_layer() {
        let order = RefCell::new(Vec::new());

        apply_confinement(
            &policy(),
            |_| {
                order.borrow_mut().push("filesystem");
                Ok(LayerStatus::Unsupported)
            },
            |_| {
                order.borrow_mut().push("seccomp");
                Ok(LayerStatus::Enforced)
            },
        )
        .expect("degraded filesystem layer is not an error");

        assert_eq!(*order.borrow(), ["filesystem", "seccomp"]);
    }

    #[test]
    fn failed_filesystem_layer_stops_before_syscall_layer() {
        let reached = RefCell::new(false);

        let result = apply_confinement(
            &policy(),
            |_| Err(CordonError::Landlock("refused".into())),
            |_| {
                *reached.borrow_mut() = true;
                Ok(LayerStatus::Enforced)
            },
        );

        assert!(result.is_err());
        assert!(!*reached.borrow(), "syscall layer ran after a fatal failure");
    }

    #[test]
    fn classification_distinguishes_policy_violation() {
        let pid = Pid::from_raw(42);

        assert_eq!(
            TerminationOutcome::classify(WaitStatus::Exited(pid, 0)),
            Some(TerminationOutcome::Exited(0))
        );
        assert_eq!(
            TerminationOutcome::classify(WaitStatus::Exited(pid, 3)),
            Some(TerminationOutcome::Exited(3))
        );
        assert_eq!(
            TerminationOutcome::classify(WaitStatus::Signaled(pid, Signal::SIGSYS, false)),
            Some(TerminationOutcome::PolicyViolation)
        );
        assert_eq!(
            TerminationOutcome::classify(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(TerminationOutcome::Signaled(Signal::SIGKILL))
        );
    }

    #[test]
    fn exit_codes_distinguish_kills_from_normal_exits() {
        assert_eq!(TerminationOutcome::Exited(7).exit_code(), 7);
        assert_eq!(
            TerminationOutcome::Signaled(Signal::SIGKILL).exit_code(),
            128 + Signal::SIGKILL as i32
        );
        assert_eq!(
            TerminationOutcome::PolicyViolation.exit_code(),
            128 + Signal::SIGSYS as i32
        );
    }
}
