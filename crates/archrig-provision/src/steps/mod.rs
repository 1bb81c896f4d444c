//! Component definitions
//!
//! A [`ComponentSpec`] names one unit of desired state. Its [`Action`] is one
//! of a closed set of installation mechanisms; each mechanism implements
//! [`Step`], which knows how to detect that the state is already reached and
//! how to converge to it.

mod file;
mod flatpak;
mod package;
mod probe;
mod script;
mod service;
mod user;

pub use file::{ConfigAppend, Owner};
pub use flatpak::FlatpakApps;
pub use package::{NativePackages, ThirdPartyPackages};
pub use probe::Probe;
pub use script::ScriptInstall;
pub use service::ServiceEnable;
pub use user::GroupMembership;

use serde::Deserialize;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::host::Host;

/// One installation mechanism
///
/// Steps must be:
/// - **Idempotent**: applying an already satisfied step changes nothing
/// - **Checkable**: expose a predicate that detects the satisfied state
pub trait Step {
    /// Human-readable description of what this step does
    fn description(&self) -> String;

    /// Predicate used when the component does not supply its own
    fn default_check(&self) -> Probe;

    /// Converge the system towards this step's desired state
    fn apply(&self, host: &Host<'_>, ctx: &ExecutionContext) -> Result<(), ActionError>;

    /// Reject definitions that can never converge
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Whether a failure aborts the run when the component does not say
    fn default_fatal(&self) -> bool {
        false
    }

    /// Effect that only shows up in a new login session
    fn deferred_notice(&self, _ctx: &ExecutionContext) -> Option<String> {
        None
    }
}

/// The closed set of installation mechanisms
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    NativePackage(NativePackages),
    ThirdPartyPackage(ThirdPartyPackages),
    Flatpak(FlatpakApps),
    Script(ScriptInstall),
    ConfigAppend(ConfigAppend),
    Service(ServiceEnable),
    Group(GroupMembership),
}

impl Action {
    pub fn as_step(&self) -> &dyn Step {
        match self {
            Self::NativePackage(s) => s,
            Self::ThirdPartyPackage(s) => s,
            Self::Flatpak(s) => s,
            Self::Script(s) => s,
            Self::ConfigAppend(s) => s,
            Self::Service(s) => s,
            Self::Group(s) => s,
        }
    }
}

macro_rules! impl_from_step {
    ($($step:ident => $variant:ident),* $(,)?) => {
        $(impl From<$step> for Action {
            fn from(step: $step) -> Self {
                Self::$variant(step)
            }
        })*
    };
}

impl_from_step! {
    NativePackages => NativePackage,
    ThirdPartyPackages => ThirdPartyPackage,
    FlatpakApps => Flatpak,
    ScriptInstall => Script,
    ConfigAppend => ConfigAppend,
    ServiceEnable => Service,
    GroupMembership => Group,
}

/// A yes/no question asked before an optional component is installed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    pub prompt: String,
    /// Answer taken in automatic mode
    #[serde(default)]
    pub default: bool,
}

/// A declarative description of one installable or configurable unit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    /// Unique name within the catalog
    pub name: String,
    /// Label for output; derived from the action when absent
    #[serde(default)]
    pub description: Option<String>,
    /// Components that must converge first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// How to converge
    pub install: Action,
    /// Override of the action's satisfied-state predicate
    #[serde(default)]
    pub check: Option<Probe>,
    /// Post-install predicate; the effective check when absent
    #[serde(default)]
    pub verify: Option<Probe>,
    /// Abort the run when this component fails
    #[serde(default, rename = "fatal")]
    pub fatal_on_failure: Option<bool>,
    /// Ask before installing
    #[serde(default)]
    pub ask: Option<Question>,
    /// Reminder shown in the summary once installed
    #[serde(default)]
    pub notice: Option<String>,
}

impl ComponentSpec {
    /// Create a component with the action's defaults
    pub fn new(name: impl Into<String>, install: impl Into<Action>) -> Self {
        Self {
            name: name.into(),
            description: None,
            depends_on: vec![],
            install: install.into(),
            check: None,
            verify: None,
            fatal_on_failure: None,
            ask: None,
            notice: None,
        }
    }

    /// Components that must converge first
    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set whether a failure aborts the run
    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal_on_failure = Some(fatal);
        self
    }

    /// Replace the default check
    pub fn with_check(mut self, probe: Probe) -> Self {
        self.check = Some(probe);
        self
    }

    /// Replace the default verification
    pub fn with_verify(mut self, probe: Probe) -> Self {
        self.verify = Some(probe);
        self
    }

    /// Set the output label
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Ask before installing, with `default` as the automatic answer
    pub fn ask(mut self, prompt: impl Into<String>, default: bool) -> Self {
        self.ask = Some(Question {
            prompt: prompt.into(),
            default,
        });
        self
    }

    /// Reminder shown in the summary once installed
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn step(&self) -> &dyn Step {
        self.install.as_step()
    }

    pub fn label(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.step().description())
    }

    /// The predicate that decides whether to skip the component
    pub fn effective_check(&self) -> Probe {
        self.check
            .clone()
            .unwrap_or_else(|| self.step().default_check())
    }

    /// The predicate that confirms an install
    pub fn effective_verify(&self) -> Probe {
        self.verify.clone().unwrap_or_else(|| self.effective_check())
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_on_failure
            .unwrap_or_else(|| self.step().default_fatal())
    }

    /// Summary reminder after a successful install
    pub fn deferred_notice(&self, ctx: &ExecutionContext) -> Option<String> {
        self.notice
            .clone()
            .or_else(|| self.step().deferred_notice(ctx))
    }
}
