//! Execution context shared by every component in a run

use std::path::{Path, PathBuf};

use nix::unistd::User;

use crate::error::UserError;

/// Whether decision points may ask the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Ask before optional components and before restarting
    #[default]
    Interactive,
    /// Take the default answer at every decision point
    Automatic,
}

impl Mode {
    pub fn is_automatic(self) -> bool {
        self == Self::Automatic
    }
}

/// The unprivileged account being provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    /// Login name
    pub name: String,
    /// Numeric user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// Home directory
    pub home: PathBuf,
    /// Login shell
    pub shell: PathBuf,
}

impl TargetUser {
    /// Resolve an account from the passwd database.
    ///
    /// Root is rejected: the whole point of the target user is to run tools
    /// that refuse to run as root.
    pub fn lookup(name: &str) -> Result<Self, UserError> {
        let user = User::from_name(name)
            .map_err(|source| UserError::Lookup {
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| UserError::NotFound(name.to_string()))?;

        if user.uid.is_root() {
            return Err(UserError::Root);
        }

        Ok(Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
            shell: user.shell,
        })
    }

    /// Shell that reads the user's own profile; bash when none is set
    pub fn login_shell(&self) -> &Path {
        if self.shell.as_os_str().is_empty() {
            Path::new("/bin/bash")
        } else {
            &self.shell
        }
    }

    /// Resolve `~/`-relative paths against the home directory
    pub fn expand(&self, path: &str) -> PathBuf {
        if path == "~" {
            self.home.clone()
        } else if let Some(rest) = path.strip_prefix("~/") {
            self.home.join(rest)
        } else {
            PathBuf::from(path)
        }
    }
}

/// Process-wide state for one run.
///
/// Built once from parsed arguments and passed explicitly; nothing in it
/// changes after construction.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Account that owns the provisioned configuration
    pub user: TargetUser,
    /// Interactive or automatic
    pub mode: Mode,
    /// Audit log for this run
    pub log_path: PathBuf,
}

impl ExecutionContext {
    /// Create a new context builder
    pub fn builder(user: TargetUser) -> ExecutionContextBuilder {
        ExecutionContextBuilder {
            context: Self {
                user,
                mode: Mode::default(),
                log_path: PathBuf::new(),
            },
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Create a context for unit tests, targeting the current account
    #[cfg(test)]
    pub fn test_context(home: &Path) -> Self {
        let user = TargetUser {
            name: "testuser".into(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            home: home.to_path_buf(),
            shell: "/bin/bash".into(),
        };
        Self::builder(user)
            .mode(Mode::Automatic)
            .log_path(home.join("archrig-test.log"))
            .build()
    }
}

/// Builder for `ExecutionContext`
#[derive(Debug, Clone)]
pub struct ExecutionContextBuilder {
    context: ExecutionContext,
}

impl ExecutionContextBuilder {
    /// Set the prompt mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.context.mode = mode;
        self
    }

    /// Set the audit log path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.context.log_path = path.into();
        self
    }

    /// Build the context
    pub fn build(self) -> ExecutionContext {
        self.context
    }
}
