//! Recording fakes of the host collaborators for unit tests

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::context::TargetUser;
use crate::error::ExecError;
use crate::host::{
    CommandOutput, FileConfigEditor, Host, PackageClient, PrivilegedExecutor, ScopedGrant,
};

/// In-memory package database
#[derive(Default)]
pub struct FakePackages {
    installed: RefCell<BTreeSet<String>>,
    broken: RefCell<HashSet<String>>,
    upgrade_fails: Cell<bool>,
    query_fails: Cell<bool>,
    /// Every mutating call, in order
    pub mutations: RefCell<Vec<String>>,
}

impl FakePackages {
    pub fn install<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installed
            .borrow_mut()
            .extend(names.into_iter().map(Into::into));
    }

    /// Make any batch containing `name` fail
    pub fn break_package(&self, name: &str) {
        self.broken.borrow_mut().insert(name.to_string());
    }

    pub fn fail_upgrade(&self) {
        self.upgrade_fails.set(true);
    }

    /// Make every package-database query error out
    pub fn fail_queries(&self) {
        self.query_fails.set(true);
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.installed.borrow().contains(name)
    }
}

impl PackageClient for FakePackages {
    fn is_installed(&self, name: &str) -> Result<bool, ExecError> {
        if self.query_fails.get() {
            return Err(ExecError::Failed {
                command: format!("pacman -Q {name}"),
                code: Some(1),
                stderr: "error: could not lock database".into(),
            });
        }
        Ok(self.is_present(name))
    }

    fn install_batch(&self, names: &[String]) -> Result<(), ExecError> {
        let command = format!("install {}", names.join(" "));
        self.mutations.borrow_mut().push(command.clone());
        if names.iter().any(|n| self.broken.borrow().contains(n)) {
            return Err(ExecError::Failed {
                command,
                code: Some(1),
                stderr: "error: target not found".into(),
            });
        }
        self.install(names.iter().cloned());
        Ok(())
    }

    fn update_all(&self) -> Result<(), ExecError> {
        self.mutations.borrow_mut().push("upgrade".into());
        if self.upgrade_fails.get() {
            return Err(ExecError::Failed {
                command: "pacman -Syu".into(),
                code: Some(1),
                stderr: "failed to synchronize all databases".into(),
            });
        }
        Ok(())
    }

    fn install_artifacts(&self, artifacts: &[PathBuf]) -> Result<(), ExecError> {
        for artifact in artifacts {
            let file = artifact
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.mutations.borrow_mut().push(format!("install-file {file}"));
            // name-version-release-arch.pkg.tar.zst
            if let Some(name) = file.rsplitn(4, '-').last() {
                self.install([name]);
            }
        }
        Ok(())
    }
}

type Responder = Box<dyn Fn(&str) -> CommandOutput>;

/// Executor answering commands from a table of substring matches
#[derive(Default)]
pub struct FakeExecutor {
    as_user: RefCell<Vec<(String, Responder)>>,
    as_root: RefCell<Vec<(String, Responder)>>,
    grant_fails: Cell<bool>,
    active_grants: Rc<Cell<usize>>,
    /// Every command and grant event, in order
    pub calls: RefCell<Vec<String>>,
}

impl FakeExecutor {
    /// Answer user commands containing `pattern`
    pub fn respond_as(&self, pattern: &str, output: CommandOutput) {
        self.respond_as_with(pattern, move |_| output.clone());
    }

    pub fn respond_as_with(&self, pattern: &str, f: impl Fn(&str) -> CommandOutput + 'static) {
        self.as_user
            .borrow_mut()
            .push((pattern.to_string(), Box::new(f)));
    }

    /// Answer root commands whose `program args...` line contains `pattern`
    pub fn respond_root(&self, pattern: &str, output: CommandOutput) {
        self.as_root
            .borrow_mut()
            .push((pattern.to_string(), Box::new(move |_| output.clone())));
    }

    pub fn fail_grants(&self) {
        self.grant_fails.set(true);
    }

    pub fn active_grants(&self) -> usize {
        self.active_grants.get()
    }

    /// Calls whose text contains `pattern`
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(pattern))
            .cloned()
            .collect()
    }

    fn answer(table: &RefCell<Vec<(String, Responder)>>, line: &str) -> CommandOutput {
        table
            .borrow()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map_or_else(
                || CommandOutput::failed(1, "no scripted response"),
                |(_, respond)| respond(line),
            )
    }
}

impl PrivilegedExecutor for FakeExecutor {
    fn run_as(&self, user: &TargetUser, command: &str) -> Result<CommandOutput, ExecError> {
        self.calls
            .borrow_mut()
            .push(format!("as {}: {command}", user.name));
        Ok(Self::answer(&self.as_user, command))
    }

    fn run_root(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        let line = format!("{program} {}", args.join(" "));
        self.calls.borrow_mut().push(format!("root: {line}"));
        Ok(Self::answer(&self.as_root, &line))
    }

    fn grant_temporary(&self, user: &TargetUser, binary: &Path) -> Result<ScopedGrant, ExecError> {
        self.calls
            .borrow_mut()
            .push(format!("grant {} {}", user.name, binary.display()));
        if self.grant_fails.get() {
            return Err(ExecError::Grant {
                user: user.name.clone(),
                reason: "sudoers rejected".into(),
            });
        }
        let active = Rc::clone(&self.active_grants);
        active.set(active.get() + 1);
        Ok(ScopedGrant::new("fake", move || {
            active.set(active.get() - 1);
            Ok(())
        }))
    }
}

/// All three collaborators, with a real editor for temp-dir files
#[derive(Default)]
pub struct FakeHost {
    pub packages: FakePackages,
    pub executor: FakeExecutor,
    pub editor: FileConfigEditor,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.install(names);
        self
    }

    pub fn host(&self) -> Host<'_> {
        Host {
            packages: &self.packages,
            executor: &self.executor,
            editor: &self.editor,
        }
    }
}
