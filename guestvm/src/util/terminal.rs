//! Raw-mode switching for the host terminal.
//!
//! The guest serial console is bound to our stdin/stdout. For keystrokes to
//! reach the guest one at a time and without a local echo, the host tty must
//! leave canonical mode, stop echoing, and stop translating CR to NL.

use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg, Termios};
use std::io::IsTerminal;

/// RAII guard holding stdin in raw mode.
///
/// The attributes captured on entry are restored on drop.
pub struct RawTerminal {
    saved: Termios,
}

impl RawTerminal {
    /// Put stdin into raw mode.
    ///
    /// Returns `Ok(None)` when stdin is not a terminal (pipes, test harnesses).
    pub fn enter() -> GuestVmResult<Option<Self>> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            tracing::debug!("stdin is not a terminal, leaving line discipline alone");
            return Ok(None);
        }

        let saved = termios::tcgetattr(&stdin)
            .map_err(|e| GuestVmError::Io(format!("tcgetattr on stdin: {}", e)))?;

        let mut raw = saved.clone();
        make_raw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)
            .map_err(|e| GuestVmError::Io(format!("tcsetattr on stdin: {}", e)))?;

        tracing::debug!("stdin switched to raw mode");
        Ok(Some(Self { saved }))
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        if let Err(e) = termios::tcsetattr(&stdin, SetArg::TCSANOW, &self.saved) {
            tracing::warn!(error = %e, "Failed to restore terminal attributes");
        } else {
            tracing::debug!("stdin attributes restored");
        }
    }
}

fn make_raw(attrs: &mut Termios) {
    attrs.input_flags.remove(InputFlags::ICRNL);
    attrs
        .local_flags
        .remove(LocalFlags::ICANON | LocalFlags::ECHO);
}
