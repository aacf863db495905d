//! Signal helpers for backend child processes.

/// Ask a process to exit with SIGTERM.
///
/// # Returns
/// * `true` - Signal delivered
/// * `false` - Process does not exist or permission denied
pub fn terminate_process(pid: u32) -> bool {
    signal(pid, libc::SIGTERM)
}

/// Kill a process with SIGKILL.
///
/// # Returns
/// * `true` - Signal delivered
/// * `false` - Process does not exist or permission denied
pub fn kill_process(pid: u32) -> bool {
    signal(pid, libc::SIGKILL)
}

fn signal(pid: u32, signal: libc::c_int) -> bool {
    // pid 0 and values that wrap to negative address process groups.
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, signal) == 0 }
}
