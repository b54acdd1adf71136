//! Essential system path augmentation
//!
//! Dynamically linked programs need the loader, shared libraries, and a
//! handful of runtime configuration files long before their own code
//! runs. Rather than forcing every caller to enumerate those locations,
//! [`SandboxPolicy::with_essential_paths`] grafts a fixed catalog of
//! standard directories onto a policy, skipping entries the running
//! system does not have (minimal and container root filesystems routinely
//! lack `/lib32` or `/lib64`).

use std::path::Path;

use crate::policy::{AccessKind, SandboxPolicy};

/// Loader and shared-library directories, granted `Execute` (which
/// implies the read access the loader needs).
const ESSENTIAL_EXEC_DIRS: &[&str] = &[
    "/lib",
    "/lib32",
    "/lib64",
    "/usr/lib",
    "/usr/lib32",
    "/usr/lib64",
];

/// Runtime configuration read by libc and most programs at startup
/// (ld.so.cache, locale data, nsswitch).
const ESSENTIAL_READ_DIRS: &[&str] = &["/etc", "/usr/share"];

impl SandboxPolicy {
    /// Returns the policy enriched with the essential-path catalog.
    ///
    /// Idempotent and monotonic: only adds rules, never removes or
    /// narrows one, and never duplicates a (path, access) pair. Catalog
    /// entries that are absent or not directories are skipped silently.
    #[must_use]
    pub fn with_essential_paths(mut self) -> Self {
        let mut added = 0usize;

        for (dirs, access) in [
            (ESSENTIAL_EXEC_DIRS, AccessKind::Execute),
            (ESSENTIAL_READ_DIRS, AccessKind::Read),
        ] {
            for dir in dirs.iter().copied() {
                let path = Path::new(dir);
                if !path.is_dir() {
                    continue;
                }
                if self.push_rule(path.to_path_buf(), access) {
                    tracing::debug!(path = dir, ?access, "added essential path");
                    added += 1;
                }
            }
        }

        tracing::debug!(added, total = self.rules.len(), "essential path augmentation done");
        self
    }
}
