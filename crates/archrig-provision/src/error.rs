//! Error types for catalog loading, command execution and component actions

use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or ordering a catalog.
///
/// All of these are detected before any component runs.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("component `{0}` is defined more than once")]
    Duplicate(String),

    #[error("component `{component}` depends on unknown component `{dependency}`")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("component `{component}`: {reason}")]
    Invalid { component: String, reason: String },
}

/// Failure to run an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cannot quote `{0}` for the shell")]
    Quote(String),

    #[error("privilege grant for {user} failed: {reason}")]
    Grant { user: String, reason: String },
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}

/// Failure of a component's install action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed items: {}", .0.join(", "))]
    Partial(Vec<String>),

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("build of {package} produced no installable artifact")]
    NoArtifact { package: String },
}

impl ActionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to resolve the target user account.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user `{0}` does not exist")]
    NotFound(String),

    #[error("refusing to provision for root; pass a regular user")]
    Root,

    #[error("failed to look up user `{name}`: {source}")]
    Lookup {
        name: String,
        #[source]
        source: nix::errno::Errno,
    },
}
