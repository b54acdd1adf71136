//! Kernel facility probing and process attributes
//!
//! All platform-specific constants and raw `prctl` invocations live here
//! so the confinement layers can ask "supported or not" as a typed
//! question instead of interpreting errno values inline.

use crate::{CordonError, Result};

/// Reports whether the running kernel can create a Landlock ruleset.
///
/// Probes with a hard compatibility requirement; the actual filesystem
/// layer uses best-effort mode and degrades on its own, so this is for
/// diagnostics and test gating.
#[must_use]
pub fn landlock_supported() -> bool {
    use landlock::{ABI, Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr};

    Ruleset::default()
        .set_compatibility(CompatLevel::HardRequirement)
        .handle_access(AccessFs::from_all(ABI::V1))
        .and_then(|ruleset| ruleset.create())
        .is_ok()
}

/// Reports whether the running kernel was built with seccomp.
///
/// `prctl(PR_GET_SECCOMP)` fails with EINVAL exactly when CONFIG_SECCOMP
/// is absent.
#[must_use]
pub fn seccomp_supported() -> bool {
    // SAFETY: PR_GET_SECCOMP reads process state; no pointers are passed.
    let ret = unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) };
    ret >= 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::EINVAL)
}

/// Sets the no-new-privileges attribute on the calling process.
///
/// Idempotent; both confinement layers may call it, and it must be in
/// force before the first self-restriction. Required for unprivileged
/// seccomp filter installation.
pub fn set_no_new_privs() -> Result<()> {
    // SAFETY: PR_SET_NO_NEW_PRIVS takes literal arguments; no pointers.
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret == 0 {
        Ok(())
    } else {
        Err(CordonError::Seccomp(format!(
            "prctl(PR_SET_NO_NEW_PRIVS) failed: {}",
            std::io::Error::last_os_error()
        )))
    }
}
