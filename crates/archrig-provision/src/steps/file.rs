//! Configuration file steps

use serde::Deserialize;
use tracing::{debug, info};

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::Host;

/// Who owns files and directories the step creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    /// The target user (dotfiles under the home directory)
    #[default]
    User,
    /// Root (system files under /etc)
    Root,
}

/// Append a marked block to a configuration file unless the marker is present
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigAppend {
    /// Target file; `~/` resolves against the target user's home
    pub path: String,
    /// Substring whose presence means the block is already there
    pub marker: String,
    /// Text to append; must contain the marker
    pub block: String,
    #[serde(default)]
    pub owner: Owner,
}

impl ConfigAppend {
    pub fn new(path: impl Into<String>, marker: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            marker: marker.into(),
            block: block.into(),
            owner: Owner::default(),
        }
    }

    /// Set the owner of created files
    pub fn owned_by(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }
}

impl Step for ConfigAppend {
    fn description(&self) -> String {
        format!("Configure {}", self.path)
    }

    fn default_check(&self) -> Probe {
        Probe::FileContains {
            path: self.path.clone(),
            marker: self.marker.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.marker.trim().is_empty() {
            return Err("marker must not be empty".into());
        }
        // Otherwise the check would never pass after appending
        if !self.block.contains(&self.marker) {
            return Err(format!("block does not contain marker `{}`", self.marker));
        }
        Ok(())
    }

    fn default_fatal(&self) -> bool {
        true
    }

    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let path = ctx.user.expand(&self.path);
        let owner = match self.owner {
            Owner::User => Some(&ctx.user),
            Owner::Root => None,
        };

        let changed = host
            .editor
            .ensure_block_present(&path, &self.marker, &self.block, owner)
            .map_err(|e| ActionError::io(&path, e))?;

        if changed {
            info!(path = %path.display(), marker = %self.marker, "appended block");
        } else {
            debug!(path = %path.display(), "block already present");
        }
        Ok(())
    }
}
