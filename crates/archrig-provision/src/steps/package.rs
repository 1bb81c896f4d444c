//! Package installation steps

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid, chown};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Probe, Step};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::{Host, PACMAN_BIN, quote, quote_all};

/// Base URL of the user repository used for source builds
pub const AUR_URL: &str = "https://aur.archlinux.org";

fn default_helper() -> String {
    "paru".into()
}

fn default_helper_args() -> Vec<String> {
    ["-S", "--needed", "--noconfirm", "--skipreview"]
        .map(String::from)
        .to_vec()
}

/// Install repository packages in a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NativePackages {
    pub packages: Vec<String>,
}

impl NativePackages {
    pub fn new(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }
}

impl Step for NativePackages {
    fn description(&self) -> String {
        format!("Install {}", self.packages.join(", "))
    }

    fn default_check(&self) -> Probe {
        Probe::Package {
            packages: self.packages.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.packages.is_empty() {
            return Err("no packages listed".into());
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, _ctx: &ExecutionContext) -> Result<(), ActionError> {
        let mut missing = vec![];
        for package in &self.packages {
            match host.packages.is_installed(package) {
                Ok(true) => {}
                Ok(false) => missing.push(package.clone()),
                Err(e) => {
                    warn!(package = %package, error = %e, "package query failed; treating as missing");
                    missing.push(package.clone());
                }
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        info!(packages = %missing.join(" "), "installing missing packages in one batch");
        host.packages.install_batch(&missing)?;
        Ok(())
    }
}

/// Install packages from the user repository, one at a time.
///
/// Each package first goes through the helper program. If that fails, the
/// package is built from its AUR snapshot as the target user and the result
/// installed as root. A package failing both is reported, and the remaining
/// packages are still attempted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThirdPartyPackages {
    pub packages: Vec<String>,
    /// Helper program run as the target user
    #[serde(default = "default_helper")]
    pub helper: String,
    /// Arguments placed before the package name
    #[serde(default = "default_helper_args")]
    pub helper_args: Vec<String>,
}

impl ThirdPartyPackages {
    pub fn new(packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            helper: default_helper(),
            helper_args: default_helper_args(),
        }
    }

    /// Use a different helper program
    pub fn with_helper(
        mut self,
        helper: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.helper = helper.into();
        self.helper_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn install_one(
        &self,
        package: &str,
        host: &Host<'_>,
        ctx: &ExecutionContext,
    ) -> Result<(), ActionError> {
        // The helper and makepkg both call `sudo pacman`; the grant lives
        // exactly as long as this package's attempts.
        let _grant = host
            .executor
            .grant_temporary(&ctx.user, Path::new(PACMAN_BIN))?;

        match self.install_with_helper(package, host, ctx) {
            Ok(()) => return Ok(()),
            Err(e) => warn!(
                package,
                helper = %self.helper,
                error = %e,
                "helper install failed; building from source"
            ),
        }

        build_and_install(package, host, ctx)
    }

    fn install_with_helper(
        &self,
        package: &str,
        host: &Host<'_>,
        ctx: &ExecutionContext,
    ) -> Result<(), ActionError> {
        let command = format!(
            "{} {} {}",
            quote(&self.helper)?,
            quote_all(&self.helper_args)?,
            quote(package)?
        );
        info!(package, command = %command, "installing via helper");
        host.executor
            .run_as(&ctx.user, &command)?
            .into_result(command)?;
        Ok(())
    }
}

impl Step for ThirdPartyPackages {
    fn description(&self) -> String {
        format!("Install {} (AUR)", self.packages.join(", "))
    }

    fn default_check(&self) -> Probe {
        Probe::Package {
            packages: self.packages.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.packages.is_empty() {
            return Err("no packages listed".into());
        }
        if self.helper.is_empty() {
            return Err("helper program is empty".into());
        }
        Ok(())
    }

    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let mut failed = vec![];

        for package in &self.packages {
            match host.packages.is_installed(package) {
                Ok(true) => {
                    debug!(package = %package, "already installed");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(package = %package, error = %e, "package query failed; treating as missing");
                }
            }
            if let Err(e) = self.install_one(package, host, ctx) {
                warn!(package = %package, error = %e, "third-party package failed");
                failed.push(package.clone());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ActionError::Partial(failed))
        }
    }
}

/// Build `package` from its AUR snapshot as the target user, then install
/// the produced package files as root
fn build_and_install(
    package: &str,
    host: &Host<'_>,
    ctx: &ExecutionContext,
) -> Result<(), ActionError> {
    let build_dir = tempfile::Builder::new()
        .prefix("archrig-build-")
        .tempdir()
        .map_err(|e| ActionError::io(std::env::temp_dir(), e))?;

    chown(
        build_dir.path(),
        Some(Uid::from_raw(ctx.user.uid)),
        Some(Gid::from_raw(ctx.user.gid)),
    )
    .map_err(|e| ActionError::io(build_dir.path(), e.into()))?;

    let dir = build_dir.path().to_string_lossy().into_owned();
    let url = format!("{AUR_URL}/{package}.git");
    let command = format!(
        "cd {} && git clone --depth 1 {} {pkg} && cd {pkg} && makepkg -s --noconfirm",
        quote(&dir)?,
        quote(&url)?,
        pkg = quote(package)?,
    );

    info!(package, dir = %dir, "building from source");
    host.executor
        .run_as(&ctx.user, &command)?
        .into_result(format!("makepkg {package}"))?;

    let artifacts = find_artifacts(&build_dir.path().join(package))?;
    if artifacts.is_empty() {
        return Err(ActionError::NoArtifact {
            package: package.to_string(),
        });
    }

    host.packages.install_artifacts(&artifacts)?;
    Ok(())
}

/// Package files produced by makepkg, without split-off debug packages
fn find_artifacts(dir: &Path) -> Result<Vec<PathBuf>, ActionError> {
    let entries = fs::read_dir(dir).map_err(|e| ActionError::io(dir, e))?;

    let mut artifacts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.contains(".pkg.tar") && !n.contains("-debug-"))
        })
        .collect();
    artifacts.sort();
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CommandOutput;
    use crate::testing::FakeHost;
    use tempfile::tempdir;

    /// Pull the build directory out of `cd <dir> && ...`
    fn build_dir(command: &str) -> PathBuf {
        let rest = command.strip_prefix("cd ").unwrap();
        PathBuf::from(rest.split(" && ").next().unwrap().trim_matches('\''))
    }

    #[test]
    fn test_native_batches_only_missing() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new().with_installed(["git"]);

        NativePackages::new(["git", "curl", "wget"])
            .apply(&fake.host(), &ctx)
            .unwrap();

        assert_eq!(*fake.packages.mutations.borrow(), vec!["install curl wget"]);
    }

    #[test]
    fn test_native_batch_failure_is_error() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.packages.break_package("nope");

        let err = NativePackages::new(["curl", "nope"])
            .apply(&fake.host(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ActionError::Exec(_)));
        // One transaction: nothing from the batch landed
        assert!(!fake.packages.is_present("curl"));
    }

    #[test]
    fn test_third_party_helper_success() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor.respond_as("paru -S", CommandOutput::ok(""));

        ThirdPartyPackages::new(["visual-studio-code-bin"])
            .apply(&fake.host(), &ctx)
            .unwrap();

        assert_eq!(fake.executor.calls_matching("makepkg").len(), 0);
        assert_eq!(fake.executor.calls_matching("grant").len(), 1);
        assert_eq!(fake.executor.active_grants(), 0);
    }

    #[test]
    fn test_third_party_falls_back_to_source_build() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor
            .respond_as("paru -S", CommandOutput::failed(127, "paru: command not found"));
        fake.executor.respond_as_with("makepkg", |command| {
            let pkg_dir = build_dir(command).join("paru-bin");
            fs::create_dir_all(&pkg_dir).unwrap();
            fs::write(pkg_dir.join("paru-bin-2.0.4-1-x86_64.pkg.tar.zst"), "").unwrap();
            fs::write(pkg_dir.join("paru-bin-debug-2.0.4-1-x86_64.pkg.tar.zst"), "").unwrap();
            fs::write(pkg_dir.join("PKGBUILD"), "").unwrap();
            CommandOutput::ok("")
        });

        ThirdPartyPackages::new(["paru-bin"])
            .apply(&fake.host(), &ctx)
            .unwrap();

        assert!(fake.packages.is_present("paru-bin"));
        assert_eq!(
            *fake.packages.mutations.borrow(),
            vec!["install-file paru-bin-2.0.4-1-x86_64.pkg.tar.zst"]
        );
        assert_eq!(fake.executor.active_grants(), 0);
    }

    #[test]
    fn test_third_party_isolates_failures() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor.respond_as("paru -S --needed --noconfirm --skipreview good", CommandOutput::ok(""));
        fake.executor.respond_as("makepkg", CommandOutput::failed(1, "==> ERROR"));

        let err = ThirdPartyPackages::new(["bad", "good"])
            .apply(&fake.host(), &ctx)
            .unwrap_err();

        match err {
            ActionError::Partial(failed) => assert_eq!(failed, vec!["bad"]),
            other => panic!("unexpected error: {other}"),
        }
        // Both packages were attempted, each under its own grant
        assert_eq!(fake.executor.calls_matching("grant").len(), 2);
        assert_eq!(fake.executor.active_grants(), 0);
    }

    #[test]
    fn test_third_party_grant_failure_skips_attempts() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor.fail_grants();
        fake.executor.respond_as("paru", CommandOutput::ok(""));

        let err = ThirdPartyPackages::new(["spotify", "slack-desktop"])
            .apply(&fake.host(), &ctx)
            .unwrap_err();

        match err {
            ActionError::Partial(failed) => assert_eq!(failed, vec!["spotify", "slack-desktop"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fake.executor.calls_matching("grant").len(), 2);
        assert!(fake.executor.calls_matching("paru").is_empty());
        assert!(fake.executor.calls_matching("makepkg").is_empty());
        assert_eq!(fake.executor.active_grants(), 0);
    }

    #[test]
    fn test_third_party_query_failure_treated_as_missing() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.packages.fail_queries();
        fake.executor.respond_as("paru", CommandOutput::ok(""));

        ThirdPartyPackages::new(["spotify"])
            .apply(&fake.host(), &ctx)
            .unwrap();

        assert_eq!(
            fake.executor.calls_matching("paru"),
            vec!["as testuser: paru -S --needed --noconfirm --skipreview spotify"]
        );
    }

    #[test]
    fn test_third_party_build_without_artifact_fails() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor.respond_as_with("makepkg", |command| {
            fs::create_dir_all(build_dir(command).join("empty")).unwrap();
            CommandOutput::ok("")
        });

        let err = ThirdPartyPackages::new(["empty"])
            .apply(&fake.host(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ActionError::Partial(_)));
        assert_eq!(fake.executor.active_grants(), 0);
    }

    #[test]
    fn test_third_party_skips_installed() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new().with_installed(["yay"]);

        ThirdPartyPackages::new(["yay"])
            .apply(&fake.host(), &ctx)
            .unwrap();
        assert!(fake.executor.calls.borrow().is_empty());
    }

    #[test]
    fn test_custom_helper_args() {
        let dir = tempdir().unwrap();
        let ctx = ExecutionContext::test_context(dir.path());
        let fake = FakeHost::new();
        fake.executor.respond_as("yay -S --noconfirm spotify", CommandOutput::ok(""));

        ThirdPartyPackages::new(["spotify"])
            .with_helper("yay", ["-S", "--noconfirm"])
            .apply(&fake.host(), &ctx)
            .unwrap();
        assert_eq!(fake.executor.calls_matching("yay -S").len(), 1);
    }

    #[test]
    fn test_empty_package_list_invalid() {
        assert!(NativePackages::new(Vec::<String>::new()).validate().is_err());
        assert!(ThirdPartyPackages::new(["x"]).validate().is_ok());
    }
}
