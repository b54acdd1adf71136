//! Append-only lifecycle audit log
//!
//! One line per event, prefixed with a bracketed human-readable
//! timestamp. Separate from `tracing`: this is the durable record a
//! caller asked for with an explicit log path, emitted for session
//! start, policy-violation kills, and the final child status.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;

use crate::{CordonError, Result};

#[derive(Debug)]
pub struct AuditLog {
    file: File,
}

impl AuditLog {
    /// Opens (creating if needed) the log for appending.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened for append.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|file| Self { file })
            .map_err(|source| CordonError::Audit {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Appends one timestamped line. Losing an audit line must not kill a
    /// running sandbox, so write failures are logged and swallowed.
    pub fn record(&self, message: &str) {
        let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
        if let Err(e) = writeln!(&self.file, "[{stamp}] {message}") {
            tracing::warn!(error = %e, "failed to append audit log entry");
        }
    }
}
