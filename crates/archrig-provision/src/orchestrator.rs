//! The convergence loop: check, apply, verify, record

use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::host::Host;
use crate::steps::{ComponentSpec, Probe, Question};

/// What happened to one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Already satisfied, declined, or waiting on a declined dependency
    Skipped,
    Installed,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::Installed => "installed",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub name: String,
    pub status: Status,
    pub message: String,
    /// Verification mismatch after a successful action
    pub caveat: Option<String>,
    /// Reminder for effects that need a new login session
    pub deferred: Option<String>,
}

impl RunResult {
    fn new(name: &str, status: Status, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            caveat: None,
            deferred: None,
        }
    }
}

/// Results of a whole run, in execution order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<RunResult>,
    /// The mandatory component whose failure stopped the run
    pub aborted_by: Option<String>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.aborted_by.is_some()
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> u8 {
        u8::from(self.is_aborted())
    }

    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.status == Status::Failed)
    }

    /// Deferred-effect reminders of installed components
    pub fn deferred(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| r.deferred.as_deref())
            .collect()
    }

    pub fn caveats(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.caveat.is_some())
    }
}

/// Answers yes/no questions in interactive mode
pub trait Prompter {
    fn confirm(&self, question: &Question) -> bool;
}

/// Follows a run as it happens
pub trait Observer {
    fn started(&self, spec: &ComponentSpec);
    fn finished(&self, result: &RunResult);
}

/// Drives a catalog to convergence.
///
/// ```ignore
/// let report = Orchestrator::new(&ctx, host)
///     .with_observer(&reporter)
///     .with_prompter(&reporter)
///     .run(&catalog);
/// ```
pub struct Orchestrator<'a> {
    ctx: &'a ExecutionContext,
    host: Host<'a>,
    prompter: Option<&'a dyn Prompter>,
    observer: Option<&'a dyn Observer>,
}

/// Components that did not converge, by reason
#[derive(Default)]
struct Unmet {
    failed: HashSet<String>,
    declined: HashSet<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a ExecutionContext, host: Host<'a>) -> Self {
        Self {
            ctx,
            host,
            prompter: None,
            observer: None,
        }
    }

    /// Ask questions through `prompter` in interactive mode
    pub fn with_prompter(mut self, prompter: &'a dyn Prompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Upgrade every installed package before the catalog runs
    pub fn upgrade_system(&self) -> Result<(), ExecError> {
        info!("upgrading system packages");
        self.host.packages.update_all()?;
        info!("system upgrade complete");
        Ok(())
    }

    /// Converge every component in catalog order.
    ///
    /// Stops after the first failed component marked fatal; that component's
    /// result is the last one in the report.
    pub fn run(&self, catalog: &Catalog) -> RunReport {
        let mut report = RunReport::default();
        let mut unmet = Unmet::default();

        info!(components = catalog.len(), user = %self.ctx.user.name, "starting run");
        for spec in catalog {
            if let Some(observer) = self.observer {
                observer.started(spec);
            }

            let blocked = spec.depends_on.iter().any(|d| unmet.failed.contains(d));
            let result = self.converge(spec, &mut unmet);
            match result.status {
                Status::Installed => {
                    info!(component = %spec.name, message = %result.message, "installed");
                }
                Status::Skipped => {
                    info!(component = %spec.name, reason = %result.message, "skipped");
                }
                Status::Failed => {
                    warn!(component = %spec.name, error = %result.message, "failed");
                    unmet.failed.insert(spec.name.clone());
                }
            }

            if let Some(observer) = self.observer {
                observer.finished(&result);
            }
            // A blocked component only aborts when marked fatal explicitly
            let fatal = result.status == Status::Failed
                && if blocked {
                    spec.fatal_on_failure == Some(true)
                } else {
                    spec.is_fatal()
                };
            report.results.push(result);

            if fatal {
                warn!(component = %spec.name, "mandatory component failed, aborting run");
                report.aborted_by = Some(spec.name.clone());
                break;
            }
        }

        info!(
            installed = report.count(Status::Installed),
            skipped = report.count(Status::Skipped),
            failed = report.count(Status::Failed),
            "run finished"
        );
        report
    }

    fn converge(&self, spec: &ComponentSpec, unmet: &mut Unmet) -> RunResult {
        let name = spec.name.as_str();

        let check = spec.effective_check();
        info!(component = %name, check = %check, "checking");
        if self.holds(name, &check) {
            return RunResult::new(name, Status::Skipped, "already satisfied");
        }

        if let Some(dep) = spec.depends_on.iter().find(|d| unmet.failed.contains(*d)) {
            return RunResult::new(name, Status::Failed, format!("blocked by {dep}"));
        }
        if let Some(dep) = spec.depends_on.iter().find(|d| unmet.declined.contains(*d)) {
            unmet.declined.insert(name.to_string());
            return RunResult::new(name, Status::Skipped, format!("{dep} was declined"));
        }

        if let Some(question) = &spec.ask
            && !self.answer(question)
        {
            unmet.declined.insert(name.to_string());
            return RunResult::new(name, Status::Skipped, "declined");
        }

        info!(component = %name, action = %spec.step().description(), "applying");
        if let Err(e) = spec.step().apply(&self.host, self.ctx) {
            return RunResult::new(name, Status::Failed, e.to_string());
        }

        let mut result = RunResult::new(name, Status::Installed, spec.label());
        let verify = spec.effective_verify();
        if !self.holds(name, &verify) {
            warn!(component = %name, verify = %verify, "verification did not pass after install");
            result.caveat = Some(format!("not verified: {verify}"));
        }
        result.deferred = spec.deferred_notice(self.ctx);
        result
    }

    /// Evaluate a probe; an error counts as "not satisfied"
    fn holds(&self, name: &str, probe: &Probe) -> bool {
        match probe.evaluate(&self.host, self.ctx) {
            Ok(satisfied) => satisfied,
            Err(e) => {
                warn!(component = %name, probe = %probe, error = %e, "probe failed, treating as unsatisfied");
                false
            }
        }
    }

    fn answer(&self, question: &Question) -> bool {
        let answer = match self.prompter {
            Some(prompter) if !self.ctx.mode.is_automatic() => prompter.confirm(question),
            _ => question.default,
        };
        info!(question = %question.prompt, answer, "decision");
        answer
    }
}
