//! Ctrl-C handling

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use archrig_provision::host::SystemExecutor;
use tracing::warn;

/// Exit status after an interrupt
pub const INTERRUPTED: i32 = 130;

/// Shared interrupt state.
///
/// While a countdown is armed, Ctrl-C only cancels it. At any other time the
/// handler removes live privilege grants and exits.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    armed: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl Interrupt {
    /// Install the process-wide handler
    pub fn install(executor: SystemExecutor) -> Result<Self> {
        let interrupt = Self::default();
        let handler = interrupt.clone();
        ctrlc::set_handler(move || {
            if !handler.on_signal(&executor) {
                std::process::exit(INTERRUPTED);
            }
        })
        .context("Failed to set interrupt handler")?;
        Ok(interrupt)
    }

    /// Handle one Ctrl-C; returns whether the process should keep running
    fn on_signal(&self, executor: &SystemExecutor) -> bool {
        if self.armed.load(Ordering::SeqCst) {
            self.cancel();
            return true;
        }

        eprintln!("\nInterrupted");
        match executor.revoke_stale() {
            Ok(removed) => {
                for path in removed {
                    warn!(path = %path.display(), "revoked grant on interrupt");
                }
            }
            Err(e) => warn!(error = %e, "failed to revoke grants on interrupt"),
        }
        warn!("run interrupted");
        false
    }

    /// Route Ctrl-C to the countdown until the guard is dropped
    pub fn arm(&self) -> Armed<'_> {
        self.cancelled.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
        Armed(self)
    }

    /// Cancel the armed countdown
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Countdown guard from [`Interrupt::arm`]
pub struct Armed<'a>(&'a Interrupt);

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.0.armed.store(false, Ordering::SeqCst);
    }
}
