//! Per-user Flatpak application installs

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{info, warn};

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::{ActionError, ExecError};
use crate::host::{Host, quote};

const LIST_COMMAND: &str = "flatpak list --user --app --columns=application";

fn default_remote() -> String {
    "flathub".into()
}

fn default_remote_url() -> String {
    "https://dl.flathub.org/repo/flathub.flatpakrepo".into()
}

/// App ids in the target user's Flatpak installation.
///
/// A listing that fails (for example because flatpak itself is missing)
/// counts as an empty installation.
pub(crate) fn list_installed(
    host: &Host<'_>,
    ctx: &ExecutionContext,
) -> Result<HashSet<String>, ExecError> {
    let output = host.executor.run_as(&ctx.user, LIST_COMMAND)?;
    if !output.success() {
        return Ok(HashSet::new());
    }
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Install Flatpak apps for the target user, one app at a time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlatpakApps {
    pub apps: Vec<String>,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
}

impl FlatpakApps {
    pub fn new(apps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            apps: apps.into_iter().map(Into::into).collect(),
            remote: default_remote(),
            remote_url: default_remote_url(),
        }
    }

    fn ensure_remote(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ExecError> {
        let command = format!(
            "flatpak remote-add --user --if-not-exists {} {}",
            quote(&self.remote)?,
            quote(&self.remote_url)?
        );
        host.executor
            .run_as(&ctx.user, &command)?
            .into_result(command)?;
        Ok(())
    }
}

impl Step for FlatpakApps {
    fn description(&self) -> String {
        format!("Install {} (Flatpak)", self.apps.join(", "))
    }

    fn default_check(&self) -> Probe {
        Probe::Flatpak {
            apps: self.apps.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.apps.is_empty() {
            return Err("no apps listed".into());
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        self.ensure_remote(host, ctx)?;
        let installed = list_installed(host, ctx)?;

        let mut failed = vec![];
        for app in self.apps.iter().filter(|a| !installed.contains(*a)) {
            let command = format!(
                "flatpak install --user --noninteractive {} {}",
                quote(&self.remote)?,
                quote(app)?
            );
            info!(app = %app, "installing flatpak");
            let result = host
                .executor
                .run_as(&ctx.user, &command)
                .and_then(|out| out.into_result(command));
            if let Err(e) = result {
                warn!(app = %app, error = %e, "flatpak install failed");
                failed.push(app.clone());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ActionError::Partial(failed))
        }
    }
}
