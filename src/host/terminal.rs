//! Raw-mode terminal control for the normal driver (spec.md §6).
//!
//! Disables canonical-mode line buffering and echo so guest UART output
//! and keystrokes pass through a byte at a time, while leaving `ISIG` and
//! `TOSTOP` set so `Ctrl-C`/`Ctrl-Z` still reach the process normally.
//! Original attributes are restored on drop so a crash or clean exit never
//! leaves the user's shell in raw mode.

use std::io;

use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn enable() -> crate::error::Result<Self> {
        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin)
            .map_err(|e| crate::error::EmulatorError::Terminal(e.to_string()))?;
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.local_flags.insert(LocalFlags::ISIG | LocalFlags::TOSTOP);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)
            .map_err(|e| crate::error::EmulatorError::Terminal(e.to_string()))?;
        Ok(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let stdin = io::stdin();
        let _ = termios::tcsetattr(&stdin, SetArg::TCSANOW, &self.original);
    }
}
