//! Remote installer scripts run as the target user

use std::fs;

use nix::unistd::{Gid, Uid, chown};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::{Host, quote, quote_all};

fn default_interpreter() -> String {
    "sh".into()
}

/// Download and run an installer script (rustup, uv, bun, ...)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptInstall {
    /// Binary the installer provides; its presence means "installed"
    pub binary: String,
    pub url: String,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Arguments passed to the script
    #[serde(default)]
    pub args: Vec<String>,
    /// Pinned SHA-256 of the script; when set the script is downloaded,
    /// checked, and only then executed
    #[serde(default)]
    pub sha256: Option<String>,
}

impl ScriptInstall {
    pub fn new(binary: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            url: url.into(),
            interpreter: default_interpreter(),
            args: vec![],
            sha256: None,
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    fn piped(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let mut command = format!(
            "set -o pipefail; curl -fsSL {} | {}",
            quote(&self.url)?,
            quote(&self.interpreter)?
        );
        if !self.args.is_empty() {
            command.push_str(" -s -- ");
            command.push_str(&quote_all(&self.args)?);
        }

        info!(url = %self.url, "running installer script");
        host.executor
            .run_as(&ctx.user, &command)?
            .into_result(command)?;
        Ok(())
    }

    fn pinned(
        &self,
        expected: &str,
        host: &Host<'_>,
        ctx: &ExecutionContext,
    ) -> Result<(), ActionError> {
        let dir = tempfile::Builder::new()
            .prefix("archrig-script-")
            .tempdir()
            .map_err(|e| ActionError::io(std::env::temp_dir(), e))?;
        chown(
            dir.path(),
            Some(Uid::from_raw(ctx.user.uid)),
            Some(Gid::from_raw(ctx.user.gid)),
        )
        .map_err(|e| ActionError::io(dir.path(), e.into()))?;

        let script = dir.path().join("installer");
        let script_arg = script.to_string_lossy().into_owned();

        let download = format!("curl -fsSL -o {} {}", quote(&script_arg)?, quote(&self.url)?);
        host.executor
            .run_as(&ctx.user, &download)?
            .into_result(download)?;

        let body = fs::read(&script).map_err(|e| ActionError::io(&script, e))?;
        let actual = hex::encode(Sha256::digest(&body));
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(ActionError::ChecksumMismatch {
                url: self.url.clone(),
                expected: expected.to_string(),
                actual,
            });
        }

        let mut command = format!("{} {}", quote(&self.interpreter)?, quote(&script_arg)?);
        if !self.args.is_empty() {
            command.push(' ');
            command.push_str(&quote_all(&self.args)?);
        }

        info!(url = %self.url, sha256 = %actual, "running verified installer script");
        host.executor
            .run_as(&ctx.user, &command)?
            .into_result(command)?;
        Ok(())
    }
}

impl Step for ScriptInstall {
    fn description(&self) -> String {
        format!("Install {} from {}", self.binary, self.url)
    }

    fn default_check(&self) -> Probe {
        Probe::Binary {
            binary: self.binary.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.binary.is_empty() || self.url.is_empty() {
            return Err("binary and url are required".into());
        }
        if let Some(digest) = &self.sha256
            && (digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(format!("sha256 `{digest}` is not a hex SHA-256 digest"));
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        match &self.sha256 {
            Some(expected) => self.pinned(expected, host, ctx),
            None => self.piped(host, ctx),
        }
    }
}
