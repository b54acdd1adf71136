//! Seccomp-BPF syscall filtering
//!
//! Compiles a default-deny allow-list into BPF and installs it for the
//! remaining lifetime of the process and its descendants, across exec.
//! The allow-list is a closed catalog: anything not enumerated in
//! [`ALLOWED_SYSCALLS`] gets the action derived from the policy's
//! [`ViolationMode`].
//!
//! Two stacked programs are installed:
//!
//! 1. A shim matching only `clone3`, returning ENOSYS. Callers fall back
//!    to the always-allowed plain `clone` path instead of crashing on
//!    kernels with inconsistent `clone3` support.
//! 2. The allow-list program, which also allows `clone3` so that the
//!    shim's ERRNO outranks it under kernel action precedence (ERRNO
//!    beats ALLOW; KILL from the allow-list would otherwise beat the
//!    shim's ERRNO).
//!
//! Every generated program starts with seccompiler's architecture check,
//! killing on an instruction-set mismatch to rule out 32-bit/64-bit
//! syscall-number confusion.

use std::collections::BTreeMap;

use seccompiler::{
    BpfProgram, SeccompAction, SeccompFilter as BpfFilter, SeccompRule, TargetArch, apply_filter,
};

use super::{LayerStatus, support};
use crate::policy::ViolationMode;
use crate::{CordonError, Result};

/// Syscalls the confined process may always invoke.
///
/// Curated for process/file/memory/signal/threading lifecycle, I/O, and
/// metadata queries on x86_64. One line per syscall; the table is the
/// unit of test coverage. Deliberately absent: mode/ownership changes
/// (`chmod`, `chown` families), the socket family, `mount`, `ptrace`,
/// and `clone3` (shimmed to ENOSYS above).
pub const ALLOWED_SYSCALLS: &[(&str, libc::c_long)] = &[
    // File I/O and metadata
    ("read", libc::SYS_read),
    ("write", libc::SYS_write),
    ("open", libc::SYS_open),
    ("openat", libc::SYS_openat),
    ("close", libc::SYS_close),
    ("stat", libc::SYS_stat),
    ("fstat", libc::SYS_fstat),
    ("lstat", libc::SYS_lstat),
    ("newfstatat", libc::SYS_newfstatat),
    ("statx", libc::SYS_statx),
    ("lseek", libc::SYS_lseek),
    ("pread64", libc::SYS_pread64),
    ("pwrite64", libc::SYS_pwrite64),
    ("readv", libc::SYS_readv),
    ("writev", libc::SYS_writev),
    ("access", libc::SYS_access),
    ("faccessat", libc::SYS_faccessat),
    ("faccessat2", libc::SYS_faccessat2),
    ("pipe", libc::SYS_pipe),
    ("pipe2", libc::SYS_pipe2),
    ("dup", libc::SYS_dup),
    ("dup2", libc::SYS_dup2),
    ("dup3", libc::SYS_dup3),
    ("fcntl", libc::SYS_fcntl),
    ("ioctl", libc::SYS_ioctl),
    ("getcwd", libc::SYS_getcwd),
    ("chdir", libc::SYS_chdir),
    ("readlink", libc::SYS_readlink),
    ("readlinkat", libc::SYS_readlinkat),
    ("getdents64", libc::SYS_getdents64),
    ("poll", libc::SYS_poll),
    ("ppoll", libc::SYS_ppoll),
    // Memory management
    ("mmap", libc::SYS_mmap),
    ("mprotect", libc::SYS_mprotect),
    ("munmap", libc::SYS_munmap),
    ("mremap", libc::SYS_mremap),
    ("brk", libc::SYS_brk),
    ("madvise", libc::SYS_madvise),
    // Signals
    ("rt_sigaction", libc::SYS_rt_sigaction),
    ("rt_sigprocmask", libc::SYS_rt_sigprocmask),
    ("rt_sigreturn", libc::SYS_rt_sigreturn),
    ("sigaltstack", libc::SYS_sigaltstack),
    ("kill", libc::SYS_kill),
    ("tgkill", libc::SYS_tgkill),
    // Process lifecycle and identity
    ("clone", libc::SYS_clone),
    ("fork", libc::SYS_fork),
    ("vfork", libc::SYS_vfork),
    ("execve", libc::SYS_execve),
    ("exit", libc::SYS_exit),
    ("exit_group", libc::SYS_exit_group),
    ("wait4", libc::SYS_wait4),
    ("getpid", libc::SYS_getpid),
    ("gettid", libc::SYS_gettid),
    ("getppid", libc::SYS_getppid),
    ("getpgrp", libc::SYS_getpgrp),
    ("setsid", libc::SYS_setsid),
    ("setpgid", libc::SYS_setpgid),
    ("getpgid", libc::SYS_getpgid),
    ("umask", libc::SYS_umask),
    ("getuid", libc::SYS_getuid),
    ("getgid", libc::SYS_getgid),
    ("geteuid", libc::SYS_geteuid),
    ("getegid", libc::SYS_getegid),
    // Resource and system queries
    ("uname", libc::SYS_uname),
    ("sysinfo", libc::SYS_sysinfo),
    ("getrlimit", libc::SYS_getrlimit),
    ("prlimit64", libc::SYS_prlimit64),
    ("getrusage", libc::SYS_getrusage),
    ("times", libc::SYS_times),
    ("sched_getaffinity", libc::SYS_sched_getaffinity),
    ("sched_yield", libc::SYS_sched_yield),
    // Clocks
    ("clock_gettime", libc::SYS_clock_gettime),
    ("clock_getres", libc::SYS_clock_getres),
    ("clock_nanosleep", libc::SYS_clock_nanosleep),
    ("nanosleep", libc::SYS_nanosleep),
    ("gettimeofday", libc::SYS_gettimeofday),
    // Threading runtime
    ("arch_prctl", libc::SYS_arch_prctl),
    ("futex", libc::SYS_futex),
    ("set_tid_address", libc::SYS_set_tid_address),
    ("set_robust_list", libc::SYS_set_robust_list),
    ("rseq", libc::SYS_rseq),
    ("getrandom", libc::SYS_getrandom),
];

/// The syscall filter for one confined execution.
#[derive(Debug, Clone, Copy)]
pub struct SyscallFilter {
    mode: ViolationMode,
}

/// Kernel-loadable BPF, compiled but not yet installed. Consumed exactly
/// once by [`CompiledFilter::install`].
pub(crate) struct CompiledFilter {
    clone3_shim: BpfProgram,
    allow_list: BpfProgram,
}

impl CompiledFilter {
    /// Installs both programs; irrevocable for this process and all
    /// descendants.
    pub(crate) fn install(self) -> Result<()> {
        support::set_no_new_privs()?;

        apply_filter(&self.clone3_shim)
            .map_err(|e| CordonError::Seccomp(format!("failed to install clone3 shim: {e}")))?;
        apply_filter(&self.allow_list)
            .map_err(|e| CordonError::Seccomp(format!("failed to install allow-list: {e}")))?;

        Ok(())
    }
}

impl SyscallFilter {
    #[must_use]
    pub fn new(mode: ViolationMode) -> Self {
        Self { mode }
    }

    /// Action applied to any syscall outside the allow-list.
    pub(crate) fn default_action(mode: ViolationMode) -> SeccompAction {
        match mode {
            ViolationMode::Kill => SeccompAction::KillProcess,
            ViolationMode::LogOnly => SeccompAction::Log,
            ViolationMode::ReturnError => SeccompAction::Errno(libc::EPERM as u32),
        }
    }

    /// Assembles both BPF programs without touching the kernel.
    ///
    /// # Errors
    ///
    /// Fails only if filter construction itself is rejected (an internal
    /// invariant breach, e.g. an empty rule map).
    pub(crate) fn compile(&self) -> Result<CompiledFilter> {
        let mut shim_rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
        shim_rules.insert(libc::SYS_clone3 as i64, vec![]);

        let shim = BpfFilter::new(
            shim_rules,
            SeccompAction::Allow,
            SeccompAction::Errno(libc::ENOSYS as u32),
            TargetArch::x86_64,
        )
        .map_err(|e| CordonError::Seccomp(format!("failed to build clone3 shim: {e}")))?;

        let mut allow_rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
        for (_, nr) in ALLOWED_SYSCALLS {
            allow_rules.insert(i64::from(*nr), vec![]);
        }
        // Allowed here so the shim's ERRNO wins for clone3; see module docs.
        allow_rules.insert(libc::SYS_clone3 as i64, vec![]);

        let allow_list = BpfFilter::new(
            allow_rules,
            Self::default_action(self.mode),
            SeccompAction::Allow,
            TargetArch::x86_64,
        )
        .map_err(|e| CordonError::Seccomp(format!("failed to build allow-list: {e}")))?;

        Ok(CompiledFilter {
            clone3_shim: shim
                .try_into()
                .map_err(|e: seccompiler::BackendError| {
                    CordonError::Seccomp(format!("failed to compile clone3 shim: {e}"))
                })?,
            allow_list: allow_list
                .try_into()
                .map_err(|e: seccompiler::BackendError| {
                    CordonError::Seccomp(format!("failed to compile allow-list: {e}"))
                })?,
        })
    }

    /// Compiles and installs the filter on the calling process.
    ///
    /// Returns [`LayerStatus::Unsupported`] when the kernel lacks seccomp
    /// entirely (log and continue; the filesystem layer still stands).
    ///
    /// # Errors
    ///
    /// Any other build or installation failure is fatal.
    pub fn apply(&self) -> Result<LayerStatus> {
        if !support::seccomp_supported() {
            tracing::warn!("seccomp unavailable on this kernel; syscall filter disabled");
            return Ok(LayerStatus::Unsupported);
        }

        let compiled = self.compile()?;
        compiled.install()?;

        tracing::debug!(
            allowed = ALLOWED_SYSCALLS.len(),
            mode = ?self.mode,
            "seccomp filter installed"
        );
        Ok(LayerStatus::Enforced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> Option<libc::c_long> {
        ALLOWED_SYSCALLS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, nr)| *nr)
    }

    #[test]
    fn table_has_no_duplicate_numbers() {
        let mut numbers: Vec<libc::c_long> =
            ALLOWED_SYSCALLS.iter().map(|(_, nr)| *nr).collect();
        numbers.sort_unstable();
        let before = numbers.len();
        numbers.dedup();
        assert_eq!(before, numbers.len(), "duplicate syscall number in table");
    }

    #[test]
    fn table_has_no_duplicate_names() {
        let mut names: Vec<&str> = ALLOWED_SYSCALLS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len(), "duplicate syscall name in table");
    }

    #[test]
    fn table_covers_exec_and_exit_lifecycle() {
        for name in ["execve", "exit", "exit_group", "wait4", "clone", "read", "write"] {
            assert!(find(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn table_omits_denied_families() {
        for name in ["chmod", "fchmodat", "socket", "connect", "mount", "ptrace", "clone3"] {
            assert!(find(name).is_none(), "{name} must not be allow-listed");
        }
        let denied = [
            libc::SYS_chmod,
            libc::SYS_fchmodat,
            libc::SYS_socket,
            libc::SYS_connect,
            libc::SYS_mount,
            libc::SYS_ptrace,
            libc::SYS_clone3,
        ];
        for nr in denied {
            assert!(
                !ALLOWED_SYSCALLS.iter().any(|(_, n)| *n == nr),
                "denied syscall number {nr} found in table"
            );
        }
    }

    #[test]
    fn violation_modes_map_to_filter_actions() {
        assert!(matches!(
            SyscallFilter::default_action(ViolationMode::Kill),
            SeccompAction::KillProcess
        ));
        assert!(matches!(
            SyscallFilter::default_action(ViolationMode::LogOnly),
            SeccompAction::Log
        ));
        let errno = libc::EPERM as u32;
        assert!(matches!(
            SyscallFilter::default_action(ViolationMode::ReturnError),
            SeccompAction::Errno(e) if e == errno
        ));
    }

    #[test]
    fn compile_produces_programs_for_every_mode() {
        for mode in [
            ViolationMode::Kill,
            ViolationMode::LogOnly,
            ViolationMode::ReturnError,
        ] {
            let compiled = SyscallFilter::new(mode).compile().expect("compiles");
            assert!(!compiled.clone3_shim.is_empty());
            assert!(!compiled.allow_list.is_empty());
            // The allow-list evaluates one comparison per table entry, so
            // it must be strictly larger than the single-syscall shim.
            assert!(compiled.allow_list.len() > compiled.clone3_shim.len());
        }
    }
}
