//! Restart offer at the end of a run

use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use archrig_provision::Mode;
use console::style;
use dialoguer::Confirm;
use tracing::info;

use crate::interrupt::Interrupt;
use crate::ui;

/// Seconds before a scheduled restart
pub const COUNTDOWN: Duration = Duration::from_secs(10);

/// Whether to restart: automatic mode always schedules one, interactive mode asks
fn wanted(mode: Mode) -> bool {
    if mode.is_automatic() {
        return true;
    }
    Confirm::new()
        .with_prompt("Restart now so group and shell changes take effect?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

/// Count down, returning `false` if Ctrl-C cancelled it
fn countdown(interrupt: &Interrupt, total: Duration) -> bool {
    let _armed = interrupt.arm();
    let spinner = ui::spinner("");
    let start = Instant::now();

    while let Some(left) = total.checked_sub(start.elapsed()) {
        if interrupt.is_cancelled() {
            spinner.finish_and_clear();
            return false;
        }
        spinner.set_message(format!(
            "Restarting in {}s {}",
            left.as_secs() + 1,
            style("(Ctrl-C to cancel)").dim()
        ));
        thread::sleep(Duration::from_millis(100));
    }

    spinner.finish_and_clear();
    !interrupt.is_cancelled()
}

/// Offer, count down and restart
pub fn offer(mode: Mode, interrupt: &Interrupt) -> Result<()> {
    if !wanted(mode) {
        info!("restart declined");
        println!("\n{} Restart later to finish applying changes", style("i").cyan());
        return Ok(());
    }

    println!();
    if !countdown(interrupt, COUNTDOWN) {
        info!("restart cancelled");
        println!("{} Restart cancelled", style("!").yellow());
        return Ok(());
    }

    info!("restarting");
    println!("{}Restarting...", ui::ROCKET);
    let status = Command::new("systemctl")
        .arg("reboot")
        .status()
        .context("Failed to run systemctl reboot")?;
    if !status.success() {
        bail!("systemctl reboot exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_runs_out() {
        let interrupt = Interrupt::default();
        assert!(countdown(&interrupt, Duration::from_millis(250)));
    }

    #[test]
    fn test_cancelled_countdown() {
        let interrupt = Interrupt::default();
        let remote = interrupt.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            remote.cancel();
        });

        assert!(!countdown(&interrupt, Duration::from_secs(5)));
        canceller.join().unwrap();
    }
}
