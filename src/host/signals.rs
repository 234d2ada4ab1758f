//! SIGINT/SIGTERM handling (spec.md §6 "Cancellation").
//!
//! Both signals set a process-wide flag checked between single-thread
//! steps; the host loop winds down cleanly instead of stopping mid-step,
//! so a dump-on-exit or shared-memory driver never observes torn state.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SigHandler, Signal};

static QUIT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_quit_signal(_signal: libc::c_int) {
    QUIT.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGINT and SIGTERM. Safety: the handler only
/// performs an atomic store, which is async-signal-safe.
pub fn install() -> crate::error::Result<()> {
    let handler = SigHandler::Handler(handle_quit_signal);
    unsafe {
        signal::signal(Signal::SIGINT, handler)
            .map_err(|e| crate::error::EmulatorError::Terminal(e.to_string()))?;
        signal::signal(Signal::SIGTERM, handler)
            .map_err(|e| crate::error::EmulatorError::Terminal(e.to_string()))?;
    }
    Ok(())
}

pub fn quit_requested() -> bool {
    QUIT.load(Ordering::Relaxed)
}
