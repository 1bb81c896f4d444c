//! Systemd service management steps

use serde::Deserialize;
use tracing::info;

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::Host;

/// Ensure a systemd service is enabled and started
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEnable {
    /// Unit name
    pub service: String,
}

impl ServiceEnable {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Step for ServiceEnable {
    fn description(&self) -> String {
        format!("Enable service {}", self.service)
    }

    fn default_check(&self) -> Probe {
        Probe::ServiceActive {
            service: self.service.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.service.is_empty() {
            return Err("service name is empty".into());
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, _ctx: &ExecutionContext) -> Result<(), ActionError> {
        info!(service = %self.service, "enabling service");
        host.executor
            .run_root("systemctl", &["enable", "--now", self.service.as_str()])?
            .into_result(format!("systemctl enable --now {}", self.service))?;
        Ok(())
    }
}
