//! Cooperative cancellation between ingestion batches

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag set by the SIGINT/SIGTERM handlers
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Install SIGINT/SIGTERM handlers.
///
/// The first signal asks the current run to stop after the batch in flight
/// commits; a second one exits immediately.
pub fn install_signal_handlers() -> Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // SAFETY: the handler only touches an atomic and calls _exit,
        // both async-signal-safe.
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(130);
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {}", signal))?;
    }
    Ok(())
}
