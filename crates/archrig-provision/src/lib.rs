//! Archrig Provision - Idempotent Workstation Convergence
//!
//! This crate provides the data model and the engine behind `archrig`: a
//! declarative catalog of components (packages, desktop apps, installer
//! scripts, config snippets, services, group memberships) that is driven to
//! its desired state on an Arch Linux machine, one component at a time.
//!
//! # Architecture
//!
//! - [`ComponentSpec`]: one unit of desired state with its check, action and verification
//! - [`steps`] module: the closed set of actions, each implementing [`Step`]
//! - [`Catalog`]: validated, dependency-ordered components loaded from TOML
//! - [`Orchestrator`]: check → apply → verify → record, for every component
//! - [`host`] module: package client, privileged executor and config editor
//!   seams with their system implementations
//!
//! # Example
//!
//! ```ignore
//! use archrig_provision::{Catalog, ExecutionContext, Orchestrator, TargetUser};
//! use archrig_provision::host::{FileConfigEditor, Host, Pacman, SystemExecutor};
//!
//! let user = TargetUser::lookup("chi")?;
//! let ctx = ExecutionContext::builder(user).build();
//! let catalog = Catalog::from_toml(&std::fs::read_to_string("catalog.toml")?)?;
//!
//! let (packages, executor, editor) = (Pacman::new(), SystemExecutor::new(), FileConfigEditor::new());
//! let host = Host { packages: &packages, executor: &executor, editor: &editor };
//!
//! let report = Orchestrator::new(&ctx, host).run(&catalog);
//! std::process::exit(i32::from(report.exit_code()));
//! ```

pub mod catalog;
pub mod context;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod steps;

#[cfg(test)]
mod testing;

pub use catalog::Catalog;
pub use context::{ExecutionContext, Mode, TargetUser};
pub use error::{ActionError, CatalogError, ExecError, UserError};
pub use orchestrator::{Observer, Orchestrator, Prompter, RunReport, RunResult, Status};
pub use steps::{Action, ComponentSpec, Probe, Question, Step};
