//! Sandbox policy model
//!
//! A [`SandboxPolicy`] is the single input to both confinement layers and
//! to the supervisor: a deduplicated set of path rules, the syscall-filter
//! violation mode, an optional audit-log path, and the target command.
//! It is assembled once through [`PolicyBuilder`] and immutable afterwards.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Maximum number of path rules a policy may carry.
pub const MAX_PATH_RULES: usize = 256;

/// Maximum length of a single rule path, in bytes.
pub const MAX_PATH_BYTES: usize = 4096;

/// Capability granted on a filesystem subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// Read files and list directories.
    Read,
    /// Everything `Read` grants, plus writing files and creating or
    /// removing entries of any type beneath the path.
    Write,
    /// Everything `Read` grants, plus execution. Read access rides along
    /// because the dynamic loader must read the binary and its shared
    /// objects.
    Execute,
}

/// A filesystem path paired with the capability granted beneath it.
///
/// A rule whose path cannot be opened at policy-application time is
/// dropped with a warning, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathRule {
    pub path: PathBuf,
    pub access: AccessKind,
}

/// Default action the syscall filter takes for a syscall outside the
/// allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViolationMode {
    /// Kill the whole process on the first violation (fail-closed).
    #[default]
    Kill,
    /// Record the violation, then let the syscall proceed.
    ///
    /// This is an audit aid, NOT a security boundary: every filtered
    /// syscall is still executed.
    LogOnly,
    /// Make the denied syscall return EPERM to the caller instead of
    /// terminating the process.
    ReturnError,
}

/// The program to execute inside the sandbox and its full argument
/// vector (`argv[0]` is the program itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub program: String,
    pub argv: Vec<String>,
}

impl ExecRequest {
    /// Converts program and argv for the exec call.
    ///
    /// The builder already rejects interior NUL bytes, so this only fails
    /// on a policy constructed by hand around the builder.
    pub(crate) fn to_cstrings(&self) -> Result<(CString, Vec<CString>), PolicyError> {
        let program =
            CString::new(self.program.as_str()).map_err(|_| PolicyError::NulInArgument)?;
        let argv = self
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| PolicyError::NulInArgument))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((program, argv))
    }
}

/// Immutable description of one confined execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub(crate) rules: Vec<PathRule>,
    pub violation_mode: ViolationMode,
    pub audit_log: Option<PathBuf>,
    pub request: ExecRequest,
}

impl SandboxPolicy {
    /// All path rules, deduplicated on (path, access).
    #[must_use]
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Adds a rule unless an identical (path, access) pair is present.
    ///
    /// Returns whether the rule was inserted.
    pub(crate) fn push_rule(&mut self, path: PathBuf, access: AccessKind) -> bool {
        if self.rules.iter().any(|r| r.path == path && r.access == access) {
            return false;
        }
        self.rules.push(PathRule { path, access });
        true
    }
}

/// Builder for [`SandboxPolicy`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    rules: Vec<PathRule>,
    violation_mode: ViolationMode,
    audit_log: Option<PathBuf>,
    program: Option<String>,
    args: Vec<String>,
}

impl PolicyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant read access beneath `path`.
    #[must_use]
    pub fn read(self, path: impl Into<PathBuf>) -> Self {
        self.rule(path.into(), AccessKind::Read)
    }

    /// Grant write access beneath `path`.
    #[must_use]
    pub fn write(self, path: impl Into<PathBuf>) -> Self {
        self.rule(path.into(), AccessKind::Write)
    }

    /// Grant execute access beneath `path`.
    #[must_use]
    pub fn exec(self, path: impl Into<PathBuf>) -> Self {
        self.rule(path.into(), AccessKind::Execute)
    }

    #[must_use]
    fn rule(mut self, path: PathBuf, access: AccessKind) -> Self {
        if !self.rules.iter().any(|r| r.path == path && r.access == access) {
            self.rules.push(PathRule { path, access });
        }
        self
    }

    /// Set the syscall-filter violation mode (default: [`ViolationMode::Kill`]).
    #[must_use]
    pub fn violation_mode(mut self, mode: ViolationMode) -> Self {
        self.violation_mode = mode;
        self
    }

    /// Append lifecycle events to `path`.
    #[must_use]
    pub fn audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    /// Set the target program and its arguments.
    #[must_use]
    pub fn command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = Some(program.into());
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the accumulated request and freezes it into a policy.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] when the rule count or a path length
    /// exceeds its limit, when no target program was given, or when the
    /// command carries an interior NUL byte.
    pub fn build(self) -> Result<SandboxPolicy, PolicyError> {
        if self.rules.len() > MAX_PATH_RULES {
            return Err(PolicyError::TooManyRules {
                count: self.rules.len(),
                limit: MAX_PATH_RULES,
            });
        }
        for rule in &self.rules {
            if rule.path.as_os_str().as_bytes().len() > MAX_PATH_BYTES {
                return Err(PolicyError::PathTooLong {
                    path: rule.path.clone(),
                    limit: MAX_PATH_BYTES,
                });
            }
        }

        let program = self.program.filter(|p| !p.is_empty());
        let Some(program) = program else {
            return Err(PolicyError::MissingCommand);
        };
        if program.contains('\0') || self.args.iter().any(|a| a.contains('\0')) {
            return Err(PolicyError::NulInArgument);
        }

        let mut argv = Vec::with_capacity(1 + self.args.len());
        argv.push(program.clone());
        argv.extend(self.args);

        Ok(SandboxPolicy {
            rules: self.rules,
            violation_mode: self.violation_mode,
            audit_log: self.audit_log,
            request: ExecRequest { program, argv },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_command() -> PolicyBuilder {
        PolicyBuilder::new().command("/bin/true", Vec::<String>::new())
    }

    #[test]
    fn builder_deduplicates_path_access_pairs() {
        let policy = builder_with_command()
            .read("/usr")
            .read("/usr")
            .write("/usr")
            .build()
            .expect("valid policy");

        assert_eq!(policy.rules().len(), 2);
    }

    #[test]
    fn builder_rejects_too_many_rules() {
        let mut builder = builder_with_command();
        for i in 0..=MAX_PATH_RULES {
            builder = builder.read(format!("/path/{i}"));
        }

        let err = builder.build().expect_err("should exceed rule limit");
        assert!(matches!(err, PolicyError::TooManyRules { .. }));
    }

    #[test]
    fn builder_rejects_oversized_path() {
        let long = format!("/{}", "x".repeat(MAX_PATH_BYTES));
        let err = builder_with_command()
            .read(long)
            .build()
            .expect_err("should reject long path");
        assert!(matches!(err, PolicyError::PathTooLong { .. }));
    }

    #[test]
    fn builder_rejects_missing_command() {
        let err = PolicyBuilder::new()
            .read("/usr")
            .build()
            .expect_err("no command given");
        assert_eq!(err, PolicyError::MissingCommand);

        let err = PolicyBuilder::new()
            .command("", Vec::<String>::new())
            .build()
            .expect_err("empty command");
        assert_eq!(err, PolicyError::MissingCommand);
    }

    #[test]
    fn builder_rejects_interior_nul() {
        let err = PolicyBuilder::new()
            .command("/bin/echo", ["a\0b".to_string()])
            .build()
            .expect_err("NUL in argument");
        assert_eq!(err, PolicyError::NulInArgument);
    }

    #[test]
    fn argv_starts_with_program() {
        let policy = PolicyBuilder::new()
            .command("/bin/echo", ["hello", "world"])
            .build()
            .expect("valid policy");

        assert_eq!(policy.request.program, "/bin/echo");
        assert_eq!(policy.request.argv, ["/bin/echo", "hello", "world"]);
    }

    #[test]
    fn violation_mode_defaults_to_kill() {
        let policy = builder_with_command().build().expect("valid policy");
        assert_eq!(policy.violation_mode, ViolationMode::Kill);
    }

    #[test]
    fn exec_request_converts_to_cstrings() {
        let policy = PolicyBuilder::new()
            .command("/bin/echo", ["hi"])
            .build()
            .expect("valid policy");

        let (program, argv) = policy.request.to_cstrings().expect("no NUL bytes");
        assert_eq!(program.to_bytes(), b"/bin/echo");
        assert_eq!(argv.len(), 2);
        assert_eq!(argv[1].to_bytes(), b"hi");
    }
}
