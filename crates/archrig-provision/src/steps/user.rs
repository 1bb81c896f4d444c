//! User account steps

use serde::Deserialize;
use tracing::info;

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::Host;

/// Add the target user to a supplementary group
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMembership {
    pub group: String,
}

impl GroupMembership {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
        }
    }
}

impl Step for GroupMembership {
    fn description(&self) -> String {
        format!("Add user to group {}", self.group)
    }

    fn default_check(&self) -> Probe {
        Probe::InGroup {
            group: self.group.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.group.is_empty() {
            return Err("group name is empty".into());
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        info!(group = %self.group, user = %ctx.user.name, "adding user to group");
        host.executor
            .run_root(
                "usermod",
                &["-aG", self.group.as_str(), ctx.user.name.as_str()],
            )?
            .into_result(format!("usermod -aG {} {}", self.group, ctx.user.name))?;
        Ok(())
    }

    fn deferred_notice(&self, ctx: &ExecutionContext) -> Option<String> {
        Some(format!(
            "{} joins group {} at the next login; log out and back in",
            ctx.user.name, self.group
        ))
    }
}
