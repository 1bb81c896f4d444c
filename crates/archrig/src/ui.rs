//! Terminal output: banner, progress, tables and prompts

use std::cell::{Cell as StdCell, RefCell};
use std::time::Duration;

use archrig_provision::{
    Catalog, ComponentSpec, ExecutionContext, Observer, Prompter, Question, RunReport, RunResult,
    Status,
};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use console::{Emoji, style};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn print_banner() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════╗")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("║     ARCHRIG WORKSTATION PROVISIONING  ║")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════╝")
            .cyan()
            .bold()
    );
}

pub fn print_context_table(ctx: &ExecutionContext, catalog: &Catalog, upgrade: bool) {
    println!("\n{} Configuration\n", style("▸").blue().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Setting").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Cyan),
    ]);
    table.add_row(vec![
        "User",
        &format!("{} ({})", ctx.user.name, ctx.user.home.display()),
    ]);
    table.add_row(vec![
        "Mode",
        if ctx.mode.is_automatic() {
            "automatic"
        } else {
            "interactive"
        },
    ]);
    table.add_row(vec!["Components", &catalog.len().to_string()]);
    table.add_row(vec!["System upgrade", if upgrade { "yes" } else { "skipped" }]);
    table.add_row(vec!["Log", &ctx.log_path().display().to_string()]);
    println!("{table}");
}

/// Execution order, for `--show-catalog`
pub fn print_catalog(catalog: &Catalog) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("#").fg(Color::Cyan),
        Cell::new("Component").fg(Color::Cyan),
        Cell::new("Action").fg(Color::Cyan),
        Cell::new("Depends on").fg(Color::Cyan),
        Cell::new("Fatal").fg(Color::Cyan),
    ]);
    for (i, spec) in catalog.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&spec.name),
            Cell::new(spec.label()),
            Cell::new(spec.depends_on.join(", ")),
            Cell::new(if spec.is_fatal() { "yes" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn status_cell(status: Status) -> Cell {
    match status {
        Status::Installed => Cell::new("installed").fg(Color::Green),
        Status::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
        Status::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub fn print_summary(report: &RunReport) {
    println!("\n{} Summary\n", style("▸").blue().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Component").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Details").fg(Color::Cyan),
    ]);
    for result in &report.results {
        let details = match &result.caveat {
            Some(caveat) => format!("{} ({caveat})", result.message),
            None => result.message.clone(),
        };
        table.add_row(vec![
            Cell::new(&result.name),
            status_cell(result.status),
            Cell::new(details),
        ]);
    }
    println!("{table}");

    println!(
        "\n  {} installed, {} skipped, {} failed",
        style(report.count(Status::Installed)).green(),
        style(report.count(Status::Skipped)).dim(),
        style(report.count(Status::Failed)).red()
    );

    let deferred = report.deferred();
    if !deferred.is_empty() {
        println!("\n{} Before you carry on:\n", style("▸").yellow().bold());
        for notice in deferred {
            println!("  {} {notice}", style("•").yellow());
        }
    }
}

/// Live progress for a run, and the operator's side of the questions
pub struct Reporter {
    total: usize,
    position: StdCell<usize>,
    spinner: RefCell<Option<ProgressBar>>,
}

impl Reporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            position: StdCell::new(0),
            spinner: RefCell::new(None),
        }
    }

    fn line(&self, result: &RunResult) -> String {
        let (icon, name) = match result.status {
            Status::Installed if result.caveat.is_some() => (WARN, style(&result.name).yellow()),
            Status::Installed => (CHECK, style(&result.name).green()),
            Status::Skipped => (SKIP, style(&result.name).dim()),
            Status::Failed => (CROSS, style(&result.name).red()),
        };
        format!(
            "{icon}{name} {}",
            style(format!("({})", result.message)).dim()
        )
    }
}

impl Observer for Reporter {
    fn started(&self, spec: &ComponentSpec) {
        let position = self.position.get() + 1;
        self.position.set(position);
        let message = format!(
            "{} {}",
            style(format!("[{position}/{}]", self.total)).dim(),
            spec.label()
        );
        *self.spinner.borrow_mut() = Some(spinner(message));
    }

    fn finished(&self, result: &RunResult) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
        println!("  {}", self.line(result));
    }
}

impl Prompter for Reporter {
    fn confirm(&self, question: &Question) -> bool {
        let ask = || {
            Confirm::new()
                .with_prompt(&question.prompt)
                .default(question.default)
                .interact()
                .unwrap_or(question.default)
        };
        match self.spinner.borrow().as_ref() {
            Some(spinner) => spinner.suspend(ask),
            None => ask(),
        }
    }
}
