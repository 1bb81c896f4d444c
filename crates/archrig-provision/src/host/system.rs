//! Command execution as root or as the target user

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use super::{CommandOutput, PrivilegedExecutor, ScopedGrant};
use crate::context::TargetUser;
use crate::error::ExecError;

/// File name prefix of sudoers drop-ins written for scoped grants
pub const GRANT_PREFIX: &str = "90-archrig-";

/// Run a prepared command and capture its output.
///
/// Output is logged at debug level so the run log keeps a full transcript.
pub(crate) fn capture(command: &mut Command, label: &str) -> Result<CommandOutput, ExecError> {
    debug!(command = %label, "spawning");
    let output = command.output().map_err(|source| ExecError::Spawn {
        program: command.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(
        command = %label,
        code = ?result.code,
        stdout = %result.stdout.trim_end(),
        stderr = %result.stderr.trim_end(),
        "finished"
    );
    Ok(result)
}

/// Executes through `runuser` and manages sudoers drop-ins
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    sudoers_dir: PathBuf,
    validator: Option<String>,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self {
            sudoers_dir: PathBuf::from("/etc/sudoers.d"),
            validator: Some("visudo".into()),
        }
    }

    /// Write grants somewhere other than `/etc/sudoers.d`
    pub fn with_sudoers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sudoers_dir = dir.into();
        self
    }

    /// Skip the `visudo -cf` syntax check of new grants
    pub fn without_validation(mut self) -> Self {
        self.validator = None;
        self
    }

    fn grant_path(&self, user: &TargetUser) -> PathBuf {
        // sudo ignores drop-ins whose names contain a dot
        let name = user.name.replace('.', "_");
        self.sudoers_dir.join(format!("{GRANT_PREFIX}{name}"))
    }

    /// Remove grants left behind by a process that never reached its cleanup.
    ///
    /// Returns the removed paths.
    pub fn revoke_stale(&self) -> std::io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.sudoers_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e),
        };

        let mut removed = vec![];
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(GRANT_PREFIX) {
                let path = entry.path();
                fs::remove_file(&path)?;
                warn!(path = %path.display(), "removed stale privilege grant");
                removed.push(path);
            }
        }
        Ok(removed)
    }

    fn validate(&self, path: &Path, user: &TargetUser) -> Result<(), ExecError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let label = format!("{validator} -cf {}", path.display());
        let output = capture(Command::new(validator).arg("-cf").arg(path), &label)?;
        if output.success() {
            Ok(())
        } else {
            Err(ExecError::Grant {
                user: user.name.clone(),
                reason: format!("rejected by {validator}: {}", output.stderr.trim()),
            })
        }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegedExecutor for SystemExecutor {
    fn run_as(&self, user: &TargetUser, command: &str) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new("runuser");
        cmd.args(["-u", &user.name, "--", "bash", "-lc", command])
            .env("HOME", &user.home)
            .env("USER", &user.name)
            .env("LOGNAME", &user.name)
            .env("SHELL", &user.shell)
            .env_remove("SUDO_USER")
            .env_remove("SUDO_UID")
            .env_remove("SUDO_GID")
            .env_remove("SUDO_COMMAND");

        if user.home.is_dir() {
            cmd.current_dir(&user.home);
        }

        // Per-user tools (flatpak --user, systemctl --user) look for the session bus here
        let runtime = PathBuf::from(format!("/run/user/{}", user.uid));
        if runtime.is_dir() {
            cmd.env(
                "DBUS_SESSION_BUS_ADDRESS",
                format!("unix:path={}/bus", runtime.display()),
            )
            .env("XDG_RUNTIME_DIR", runtime);
        }

        capture(&mut cmd, &format!("[{}] {command}", user.name))
    }

    fn run_root(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        capture(
            Command::new(program).args(args),
            &format!("{program} {}", args.join(" ")),
        )
    }

    fn grant_temporary(&self, user: &TargetUser, binary: &Path) -> Result<ScopedGrant, ExecError> {
        let path = self.grant_path(user);
        let rule = format!("{} ALL=(root) NOPASSWD: {}\n", user.name, binary.display());

        let grant_error = |e: std::io::Error| ExecError::Grant {
            user: user.name.clone(),
            reason: format!("{}: {e}", path.display()),
        };

        fs::write(&path, rule).map_err(grant_error)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o440)).map_err(grant_error)?;

        if let Err(e) = self.validate(&path, user) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        info!(user = %user.name, binary = %binary.display(), "granted temporary elevation");

        let label = format!("{} -> {}", user.name, binary.display());
        let user_name = user.name.clone();
        Ok(ScopedGrant::new(label, move || {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            info!(user = %user_name, "revoked temporary elevation");
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn user(name: &str) -> TargetUser {
        TargetUser {
            name: name.into(),
            uid: 1000,
            gid: 1000,
            home: "/nonexistent".into(),
            shell: "/bin/bash".into(),
        }
    }

    #[test]
    fn test_grant_written_and_revoked() {
        let dir = tempdir().unwrap();
        let exec = SystemExecutor::new()
            .with_sudoers_dir(dir.path())
            .without_validation();

        let grant = exec
            .grant_temporary(&user("alice"), Path::new("/usr/bin/pacman"))
            .unwrap();

        let path = dir.path().join("90-archrig-alice");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "alice ALL=(root) NOPASSWD: /usr/bin/pacman\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o440);

        drop(grant);
        assert!(!path.exists());
    }

    #[test]
    fn test_grant_name_without_dots() {
        let dir = tempdir().unwrap();
        let exec = SystemExecutor::new()
            .with_sudoers_dir(dir.path())
            .without_validation();

        let _grant = exec
            .grant_temporary(&user("j.doe"), Path::new("/usr/bin/pacman"))
            .unwrap();
        assert!(dir.path().join("90-archrig-j_doe").exists());
    }

    #[test]
    fn test_failed_validation_leaves_no_grant() {
        let dir = tempdir().unwrap();
        let mut exec = SystemExecutor::new().with_sudoers_dir(dir.path());
        exec.validator = Some("false".into());

        let err = exec
            .grant_temporary(&user("alice"), Path::new("/usr/bin/pacman"))
            .unwrap_err();
        assert!(matches!(err, ExecError::Grant { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_revoke_stale_only_touches_grants() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("90-archrig-alice"), "x").unwrap();
        fs::write(dir.path().join("10-wheel"), "x").unwrap();

        let exec = SystemExecutor::new().with_sudoers_dir(dir.path());
        let removed = exec.revoke_stale().unwrap();

        assert_eq!(removed, vec![dir.path().join("90-archrig-alice")]);
        assert!(dir.path().join("10-wheel").exists());
    }

    #[test]
    fn test_revoke_stale_missing_dir() {
        let exec = SystemExecutor::new().with_sudoers_dir("/nonexistent/sudoers.d");
        assert!(exec.revoke_stale().unwrap().is_empty());
    }

    #[test]
    fn test_run_root_captures_output() {
        let exec = SystemExecutor::new();
        let out = exec.run_root("sh", &["-c", "echo hi; exit 3"]).unwrap();
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.code, Some(3));
    }
}
