//! State predicates used for checks and verification

use std::fmt;

use serde::Deserialize;

use super::flatpak::list_installed;
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::{Host, quote};

/// How to detect that a component's desired state is already present
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Probe {
    /// Every package is in the package database
    Package { packages: Vec<String> },
    /// A binary resolves on the target user's login-shell PATH
    Binary { binary: String },
    /// A file contains a marker string
    FileContains { path: String, marker: String },
    /// A file or directory exists
    FileExists { path: String },
    /// A system service is running
    ServiceActive { service: String },
    /// The target user belongs to a group
    InGroup { group: String },
    /// Every app id is in the target user's Flatpak installation
    Flatpak { apps: Vec<String> },
}

impl Probe {
    /// Reject probes that could never mean "not yet installed"
    pub fn validate(&self) -> Result<(), String> {
        let empty = match self {
            Self::Package { packages } => packages.is_empty() || packages.iter().any(String::is_empty),
            Self::Flatpak { apps } => apps.is_empty() || apps.iter().any(String::is_empty),
            Self::Binary { binary } => binary.is_empty(),
            Self::FileContains { path, marker } => path.is_empty() || marker.is_empty(),
            Self::FileExists { path } => path.is_empty(),
            Self::ServiceActive { service } => service.is_empty(),
            Self::InGroup { group } => group.is_empty(),
        };
        if empty {
            Err(format!("probe `{self}` has nothing to look for"))
        } else {
            Ok(())
        }
    }

    /// Evaluate against the live system.
    ///
    /// A query command that runs but exits non-zero means "not satisfied";
    /// only a failure to run the query at all is an error.
    pub fn evaluate(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<bool, ActionError> {
        match self {
            Self::Package { packages } => {
                for package in packages {
                    if !host.packages.is_installed(package)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Binary { binary } => {
                let lookup = format!("command -v {}", quote(binary)?);
                let shell = ctx.user.login_shell().to_string_lossy();
                let command = format!("{} -lc {}", quote(&shell)?, quote(&lookup)?);
                Ok(host.executor.run_as(&ctx.user, &command)?.success())
            }
            Self::FileContains { path, marker } => {
                let path = ctx.user.expand(path);
                host.editor
                    .is_block_present(&path, marker)
                    .map_err(|e| ActionError::io(path, e))
            }
            Self::FileExists { path } => Ok(ctx.user.expand(path).exists()),
            Self::ServiceActive { service } => Ok(host
                .executor
                .run_root("systemctl", &["is-active", "--quiet", service.as_str()])?
                .success()),
            Self::InGroup { group } => {
                let output = host.executor.run_root("id", &["-nG", ctx.user.name.as_str()])?;
                Ok(output.success() && output.stdout.split_whitespace().any(|g| g == group))
            }
            Self::Flatpak { apps } => {
                let installed = list_installed(host, ctx)?;
                Ok(apps.iter().all(|app| installed.contains(app)))
            }
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package { packages } => write!(f, "packages installed: {}", packages.join(" ")),
            Self::Binary { binary } => write!(f, "`{binary}` on PATH"),
            Self::FileContains { path, marker } => write!(f, "{path} contains `{marker}`"),
            Self::FileExists { path } => write!(f, "{path} exists"),
            Self::ServiceActive { service } => write!(f, "service {service} active"),
            Self::InGroup { group } => write!(f, "member of {group}"),
            Self::Flatpak { apps } => write!(f, "flatpaks installed: {}", apps.join(" ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CommandOutput;
    use crate::testing::FakeHost;
    use tempfile::tempdir;

    #[test]
    fn test_package_probe_requires_all() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new().with_installed(["git"]);

        let probe = Probe::Package {
            packages: vec!["git".into(), "curl".into()],
        };
        assert!(!probe.evaluate(&fake.host(), &ctx).unwrap());

        fake.packages.install(["curl"]);
        assert!(probe.evaluate(&fake.host(), &ctx).unwrap());
    }

    #[test]
    fn test_group_probe_parses_id_output() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor
            .respond_root("id -nG", CommandOutput::ok("testuser wheel docker\n"));

        let host = fake.host();
        assert!(
            Probe::InGroup {
                group: "docker".into()
            }
            .evaluate(&host, &ctx)
            .unwrap()
        );
        assert!(
            !Probe::InGroup {
                group: "dock".into()
            }
            .evaluate(&host, &ctx)
            .unwrap()
        );
    }

    #[test]
    fn test_file_probes_expand_home() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        std::fs::write(dir.path().join(".bashrc"), "# archrig:aliases\n").unwrap();
        let fake = FakeHost::new();
        let host = fake.host();

        assert!(
            Probe::FileExists {
                path: "~/.bashrc".into()
            }
            .evaluate(&host, &ctx)
            .unwrap()
        );
        assert!(
            Probe::FileContains {
                path: "~/.bashrc".into(),
                marker: "archrig:aliases".into()
            }
            .evaluate(&host, &ctx)
            .unwrap()
        );
    }

    #[test]
    fn test_binary_check_uses_login_shell() {
        let dir = tempdir().unwrap();
        let mut ctx = ExecutionContext::test_context(dir.path());
        ctx.user.shell = "/usr/bin/fish".into();
        let fake = FakeHost::new();
        fake.executor
            .respond_as("command -v uv", CommandOutput::ok("/home/testuser/.local/bin/uv\n"));

        let probe = Probe::Binary {
            binary: "uv".into(),
        };
        assert!(probe.evaluate(&fake.host(), &ctx).unwrap());
        assert_eq!(
            fake.executor.calls_matching("command -v"),
            vec!["as testuser: /usr/bin/fish -lc 'command -v uv'"]
        );

        ctx.user.shell = "".into();
        probe.evaluate(&fake.host(), &ctx).unwrap();
        assert_eq!(fake.executor.calls_matching("/bin/bash -lc").len(), 1);
    }

    #[test]
    fn test_deserialize_probe() {
        let probe: Probe = toml::from_str(
            r#"
kind = "file-exists"
path = "~/.config/fish/functions/fisher.fish"
"#,
        )
        .unwrap();
        assert_eq!(
            probe.to_string(),
            "~/.config/fish/functions/fisher.fish exists"
        );
    }
}
