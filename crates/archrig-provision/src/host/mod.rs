//! External collaborators the orchestrator drives
//!
//! The orchestrator never touches the system directly. It goes through three
//! seams, each with a real implementation in this module and recording fakes
//! in the test suites:
//!
//! - [`PackageClient`]: query and install native packages ([`Pacman`])
//! - [`PrivilegedExecutor`]: run commands as the target user or as root, and
//!   hand out [`ScopedGrant`]s ([`SystemExecutor`])
//! - [`ConfigEditor`]: idempotent text-block insertion ([`FileConfigEditor`])

mod editor;
mod pacman;
mod system;

pub use editor::FileConfigEditor;
pub use pacman::Pacman;
pub use system::{GRANT_PREFIX, SystemExecutor};

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::context::TargetUser;
use crate::error::ExecError;

/// Path of the package installer the target user is temporarily allowed to run
pub const PACMAN_BIN: &str = "/usr/bin/pacman";

/// Captured result of a finished child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into an error naming `command`
    pub fn into_result(self, command: impl Into<String>) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::Failed {
                command: command.into(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// System package database
pub trait PackageClient {
    /// Whether `name` is present in the local package database
    fn is_installed(&self, name: &str) -> Result<bool, ExecError>;

    /// Install all `names` in one transaction
    fn install_batch(&self, names: &[String]) -> Result<(), ExecError>;

    /// Upgrade the whole system
    fn update_all(&self) -> Result<(), ExecError>;

    /// Install locally built package files
    fn install_artifacts(&self, artifacts: &[PathBuf]) -> Result<(), ExecError>;
}

/// Runs commands with a chosen privilege level
pub trait PrivilegedExecutor {
    /// Run a shell command as `user`, in the user's login environment
    fn run_as(&self, user: &TargetUser, command: &str) -> Result<CommandOutput, ExecError>;

    /// Run a program as root
    fn run_root(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError>;

    /// Allow `user` to run exactly `binary` as root without a password
    /// until the returned grant is dropped
    fn grant_temporary(&self, user: &TargetUser, binary: &Path) -> Result<ScopedGrant, ExecError>;
}

/// Idempotent text-block insertion into configuration files
pub trait ConfigEditor {
    /// Whether `marker` already appears in the file at `path`
    fn is_block_present(&self, path: &Path, marker: &str) -> std::io::Result<bool>;

    /// Append `block` to `path` unless `marker` is already present.
    ///
    /// Missing parent directories and the file itself are created and, when
    /// `owner` is given, handed to that user. Returns whether the file changed.
    fn ensure_block_present(
        &self,
        path: &Path,
        marker: &str,
        block: &str,
        owner: Option<&TargetUser>,
    ) -> std::io::Result<bool>;
}

/// The collaborators a run needs, bundled
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub packages: &'a dyn PackageClient,
    pub executor: &'a dyn PrivilegedExecutor,
    pub editor: &'a dyn ConfigEditor,
}

type Revoke = Box<dyn FnOnce() -> std::io::Result<()>>;

/// A time-boxed privilege elevation.
///
/// Revoked when dropped, so every exit path of the action holding it
/// (early return, `?`, unwinding panic) removes the grant.
pub struct ScopedGrant {
    label: String,
    revoke: Option<Revoke>,
}

impl ScopedGrant {
    /// Wrap a revocation callback
    pub fn new(label: impl Into<String>, revoke: impl FnOnce() -> std::io::Result<()> + 'static) -> Self {
        Self {
            label: label.into(),
            revoke: Some(Box::new(revoke)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Revoke now and report the outcome instead of logging it
    pub fn revoke(mut self) -> std::io::Result<()> {
        match self.revoke.take() {
            Some(revoke) => revoke(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedGrant {
    fn drop(&mut self) {
        if let Some(revoke) = self.revoke.take()
            && let Err(e) = revoke()
        {
            warn!(grant = %self.label, error = %e, "failed to revoke privilege grant");
        }
    }
}

impl fmt::Debug for ScopedGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedGrant")
            .field("label", &self.label)
            .field("active", &self.revoke.is_some())
            .finish()
    }
}

/// Quote a single word for `sh`
pub fn quote(word: &str) -> Result<Cow<'_, str>, ExecError> {
    shlex::try_quote(word).map_err(|_| ExecError::Quote(word.to_string()))
}

/// Quote and join words for `sh`
pub fn quote_all<S: AsRef<str>>(words: &[S]) -> Result<String, ExecError> {
    let quoted = words
        .iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(" "))
}
