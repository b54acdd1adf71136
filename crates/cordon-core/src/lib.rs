//! # cordon-core
//!
//! Linux confinement primitives for running untrusted executables.
//!
//! Two kernel-enforced layers, applied inside a forked child before it
//! execs the target:
//! - Landlock filesystem rules (path-beneath access control)
//! - seccomp-BPF syscall filtering (default-deny allow-list)
//!
//! plus the supervisor that forks, applies both layers in order, execs,
//! and classifies the child's termination for the parent.
//!
//! Targets Linux on x86_64. Kernels without Landlock or seccomp degrade
//! that single layer to a no-op instead of failing the run.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod error;
pub mod essential;
pub mod isolation;
pub mod policy;
pub mod supervisor;

pub use error::{CordonError, PolicyError};
pub use policy::{AccessKind, PathRule, PolicyBuilder, SandboxPolicy, ViolationMode};
pub use supervisor::{Sandbox, TerminationOutcome};

/// Crate-level result type
pub type Result<T> = std::result::Result<T, CordonError>;
