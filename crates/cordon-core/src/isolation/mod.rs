//! Linux confinement layers
//!
//! This module contains the two kernel-enforced layers:
//! - `landlock` - filesystem access control (path-beneath rules)
//! - `seccomp` - syscall filtering (default-deny allow-list)
//! - `support` - kernel facility probing and process attributes

pub mod landlock;
pub mod seccomp;
pub mod support;

pub use self::landlock::FilesystemPolicy;
pub use self::seccomp::SyscallFilter;

/// Outcome of applying one confinement layer to the calling process.
///
/// `Unsupported` is the predictable degrade for a kernel that lacks the
/// facility entirely: the layer becomes a no-op and the run continues
/// under whatever the other layer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStatus {
    /// The restriction is active for this process and its descendants.
    Enforced,
    /// The kernel has no support for this facility; nothing was applied.
    Unsupported,
}
