//! Error types for cordon-core

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CordonError {
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("landlock error: {0}")]
    Landlock(String),

    #[error("seccomp error: {0}")]
    Seccomp(String),

    #[error("spawn error: {0}")]
    Spawn(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}

/// Rejections raised while assembling a [`crate::SandboxPolicy`].
///
/// Oversized input is always an explicit error, never a silent truncation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("too many path rules ({count} exceeds limit {limit})")]
    TooManyRules { count: usize, limit: usize },

    #[error("path exceeds {limit} bytes: {path}")]
    PathTooLong { path: PathBuf, limit: usize },

    #[error("no target executable specified")]
    MissingCommand,

    #[error("command or argument contains an interior NUL byte")]
    NulInArgument,
}
