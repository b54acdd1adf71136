//! Landlock filesystem confinement
//!
//! Compiles the policy's path rules into a kernel ruleset and applies it
//! as an irrevocable self-restriction. Must run in the process that will
//! exec the target: the restriction is inherited across exec and by every
//! descendant.
//!
//! This layer must be applied before the seccomp filter. A conservative
//! filter installed first could deny the very syscalls rule installation
//! needs (opening path anchors, the landlock syscalls themselves).

use landlock::{
    ABI, Access, AccessFs, BitFlags, CompatLevel, Compatible, PathBeneath, PathFd, Ruleset,
    RulesetAttr, RulesetCreatedAttr, RulesetStatus,
};

use super::LayerStatus;
use crate::policy::{AccessKind, PathRule, SandboxPolicy};
use crate::{CordonError, Result};

/// ABI this layer targets: the 13 base filesystem access rights.
const LANDLOCK_ABI: ABI = ABI::V1;

/// The policy's path rules, ready to compile into a kernel ruleset.
#[derive(Debug, Clone)]
pub struct FilesystemPolicy {
    rules: Vec<PathRule>,
}

impl FilesystemPolicy {
    #[must_use]
    pub fn from_policy(policy: &SandboxPolicy) -> Self {
        Self {
            rules: policy.rules().to_vec(),
        }
    }

    /// Every access right this layer ever grants. The ruleset must handle
    /// the full mask so that anything not explicitly granted on a path is
    /// denied.
    pub(crate) fn handled_access() -> BitFlags<AccessFs> {
        AccessFs::from_all(LANDLOCK_ABI)
    }

    /// Access rights granted beneath a path for a capability tag.
    pub(crate) fn allowed_access(kind: AccessKind) -> BitFlags<AccessFs> {
        let read = AccessFs::ReadFile | AccessFs::ReadDir;
        match kind {
            AccessKind::Read => read,
            AccessKind::Write => {
                read | AccessFs::WriteFile
                    | AccessFs::RemoveFile
                    | AccessFs::RemoveDir
                    | AccessFs::MakeChar
                    | AccessFs::MakeDir
                    | AccessFs::MakeReg
                    | AccessFs::MakeSock
                    | AccessFs::MakeFifo
                    | AccessFs::MakeBlock
                    | AccessFs::MakeSym
            }
            AccessKind::Execute => read | AccessFs::Execute,
        }
    }

    /// Compiles the rules and restricts the calling process.
    ///
    /// Rules whose paths cannot be opened are skipped with a warning; one
    /// bad path must not abort the whole policy. Returns
    /// [`LayerStatus::Unsupported`] when the kernel has no Landlock at
    /// all: weaker confinement, not a crash.
    ///
    /// # Errors
    ///
    /// Any failure to build or attach an available ruleset is fatal: a
    /// layer that claims success without confirmed enforcement would
    /// defeat the sandbox.
    pub fn apply(&self) -> Result<LayerStatus> {
        let mut ruleset = Ruleset::default()
            .set_compatibility(CompatLevel::BestEffort)
            .handle_access(Self::handled_access())
            .map_err(|e| CordonError::Landlock(format!("failed to declare access mask: {e}")))?
            .create()
            .map_err(|e| CordonError::Landlock(format!("failed to create ruleset: {e}")))?;

        for rule in &self.rules {
            // Path-only descriptor anchoring the rule; the kernel keeps
            // its own reference, ours is dropped with the rule object.
            let anchor = match PathFd::new(&rule.path) {
                Ok(fd) => fd,
                Err(e) => {
                    tracing::warn!(
                        path = %rule.path.display(),
                        error = %e,
                        "skipping unresolvable path rule"
                    );
                    continue;
                }
            };

            let mut access = Self::allowed_access(rule.access);
            if !rule.path.is_dir() {
                // Directory-only rights on a file anchor are rejected by
                // the kernel.
                access &= AccessFs::from_file(LANDLOCK_ABI);
            }

            tracing::debug!(path = %rule.path.display(), access = ?rule.access, "adding path rule");
            ruleset = ruleset
                .add_rule(PathBeneath::new(anchor, access))
                .map_err(|e| {
                    CordonError::Landlock(format!(
                        "failed to add rule for {}: {e}",
                        rule.path.display()
                    ))
                })?;
        }

        let status = ruleset
            .set_no_new_privs(true)
            .restrict_self()
            .map_err(|e| CordonError::Landlock(format!("failed to restrict process: {e}")))?;

        match status.ruleset {
            RulesetStatus::NotEnforced => {
                tracing::warn!("landlock unavailable on this kernel; filesystem layer disabled");
                Ok(LayerStatus::Unsupported)
            }
            RulesetStatus::PartiallyEnforced => {
                tracing::debug!("landlock ruleset partially enforced (older ABI)");
                Ok(LayerStatus::Enforced)
            }
            RulesetStatus::FullyEnforced => {
                tracing::debug!(rules = self.rules.len(), "landlock ruleset enforced");
                Ok(LayerStatus::Enforced)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_access_implies_read_access() {
        let read = FilesystemPolicy::allowed_access(AccessKind::Read);
        let write = FilesystemPolicy::allowed_access(AccessKind::Write);

        assert!(write.contains(read), "write must grant everything read does");
        assert!(write.contains(AccessFs::WriteFile));
        assert!(write.contains(AccessFs::RemoveFile));
        assert!(write.contains(AccessFs::MakeDir));
    }

    #[test]
    fn execute_access_implies_read_access() {
        let exec = FilesystemPolicy::allowed_access(AccessKind::Execute);

        assert!(exec.contains(AccessFs::Execute));
        assert!(exec.contains(AccessFs::ReadFile));
        assert!(exec.contains(AccessFs::ReadDir));
        assert!(!exec.contains(AccessFs::WriteFile));
    }

    #[test]
    fn read_access_grants_no_mutation() {
        let read = FilesystemPolicy::allowed_access(AccessKind::Read);

        assert!(read.contains(AccessFs::ReadFile));
        assert!(read.contains(AccessFs::ReadDir));
        assert!(!read.contains(AccessFs::WriteFile));
        assert!(!read.contains(AccessFs::Execute));
        assert!(!read.contains(AccessFs::MakeReg));
    }

    #[test]
    fn handled_mask_covers_every_grantable_right() {
        let handled = FilesystemPolicy::handled_access();

        for kind in [AccessKind::Read, AccessKind::Write, AccessKind::Execute] {
            assert!(
                handled.contains(FilesystemPolicy::allowed_access(kind)),
                "handled mask must cover {kind:?}"
            );
        }
    }
}
