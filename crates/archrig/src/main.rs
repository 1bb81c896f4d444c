//! Archrig - Arch Linux Workstation Provisioning
//!
//! Converges a machine to a catalog of packages, desktop apps, developer
//! toolchains and configuration for one user.
//! - Every component is checked first and skipped when already in place
//! - Optional failures are reported; mandatory ones stop the run

mod catalog;
mod interrupt;
mod logging;
mod restart;
mod ui;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use archrig_provision::host::{FileConfigEditor, Host, Pacman, SystemExecutor};
use archrig_provision::{ExecutionContext, Mode, Orchestrator, TargetUser};
use chrono::Local;
use clap::Parser;
use console::style;
use dialoguer::Input;
use nix::unistd::geteuid;
use tracing::{info, warn};

use interrupt::Interrupt;

#[derive(Parser, Debug)]
#[command(
    name = "archrig",
    version,
    about = "Provision an Arch Linux workstation for one user"
)]
struct Args {
    /// Never prompt; take the default answer at every decision point
    #[arg(short, long)]
    auto: bool,

    /// User to provision (default: the user who invoked sudo)
    #[arg(short, long)]
    user: Option<String>,

    /// Catalog file (env: ARCHRIG_CATALOG; default: built-in catalog)
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Directory for run logs (env: ARCHRIG_LOG_DIR; default: /var/log/archrig)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not upgrade the system before installing
    #[arg(long)]
    skip_upgrade: bool,

    /// Never offer to restart at the end
    #[arg(long)]
    no_reboot: bool,

    /// Print the execution order and exit
    #[arg(long)]
    show_catalog: bool,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.auto {
            Mode::Automatic
        } else {
            Mode::Interactive
        }
    }

    fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog
            .clone()
            .or_else(|| env::var_os("ARCHRIG_CATALOG").map(PathBuf::from))
    }

    fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .or_else(|| env::var_os("ARCHRIG_LOG_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(logging::DEFAULT_LOG_DIR))
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version go to stdout and succeed; usage errors fail with 1
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal");
            eprintln!("{}{}", ui::CROSS, style(format!("{e:#}")).red());
            ExitCode::FAILURE
        }
    }
}

/// Resolve the account to provision.
///
/// Priority: --user > SUDO_USER > interactive prompt
fn resolve_user(args: &Args, mode: Mode) -> Result<TargetUser> {
    let name = args.user.clone().or_else(|| {
        env::var("SUDO_USER")
            .ok()
            .filter(|u| !u.is_empty() && u != "root")
    });

    let name = match name {
        Some(name) => name,
        None if mode.is_automatic() => {
            bail!("No target user: pass --user or run archrig through sudo")
        }
        None => Input::<String>::new()
            .with_prompt("User to provision")
            .interact_text()
            .context("Failed to read user name")?,
    };

    TargetUser::lookup(&name).with_context(|| format!("Cannot provision for `{name}`"))
}

fn run(args: &Args) -> Result<ExitCode> {
    if !geteuid().is_root() {
        bail!("archrig must run as root (try: sudo archrig)");
    }

    let mode = args.mode();
    let user = resolve_user(args, mode)?;
    let catalog = catalog::load(args.catalog_path().as_deref(), &user)?;

    if args.show_catalog {
        ui::print_catalog(&catalog);
        return Ok(ExitCode::SUCCESS);
    }

    let log_path = logging::log_path(&args.log_dir(), Local::now());
    logging::init(&log_path)?;
    info!(
        user = %user.name,
        mode = ?mode,
        version = env!("CARGO_PKG_VERSION"),
        "archrig starting"
    );

    let ctx = ExecutionContext::builder(user)
        .mode(mode)
        .log_path(log_path)
        .build();

    let executor = SystemExecutor::new();
    for path in executor
        .revoke_stale()
        .context("Failed to clean up stale privilege grants")?
    {
        println!(
            "{} Removed stale grant {}",
            style("!").yellow(),
            path.display()
        );
    }
    let interrupt = Interrupt::install(executor.clone())?;

    let packages = Pacman::new();
    let editor = FileConfigEditor::new();
    let host = Host {
        packages: &packages,
        executor: &executor,
        editor: &editor,
    };

    ui::print_banner();
    ui::print_context_table(&ctx, &catalog, !args.skip_upgrade);

    let reporter = ui::Reporter::new(catalog.len());
    let orchestrator = Orchestrator::new(&ctx, host)
        .with_observer(&reporter)
        .with_prompter(&reporter);

    if args.skip_upgrade {
        info!("system upgrade skipped");
    } else {
        println!("\n{}Upgrading system...", ui::GEAR);
        let spinner = ui::spinner("pacman -Syu");
        let upgraded = orchestrator.upgrade_system();
        spinner.finish_and_clear();
        upgraded.context("System upgrade failed")?;
        println!("  {}System up to date", ui::CHECK);
    }

    println!("\n{}Converging {} components\n", ui::ROCKET, catalog.len());
    let report = orchestrator.run(&catalog);

    ui::print_summary(&report);
    println!(
        "\n{}Log: {}",
        ui::FOLDER,
        style(ctx.log_path().display()).cyan()
    );

    if let Some(name) = &report.aborted_by {
        warn!(component = %name, "run aborted");
        eprintln!(
            "\n{}Mandatory component {} failed; remaining components were not run",
            ui::CROSS,
            style(name).red()
        );
        return Ok(ExitCode::from(report.exit_code()));
    }

    println!("\n{}Provisioning complete", ui::SPARKLE);
    if args.no_reboot {
        info!("restart disabled");
    } else {
        restart::offer(mode, &interrupt)?;
    }

    Ok(ExitCode::SUCCESS)
}
