//! Runtime handle for a guest running inside a vfkit child process.

use crate::platform::VirtualMachine;
use crate::util::{kill_process, terminate_process};
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};

/// Observed state of the vfkit process.
#[derive(Debug, Clone)]
enum ProcessState {
    Running,
    Exited(ExitStatus),
    Lost(String),
}

#[derive(Default)]
struct HaltState {
    listener: Option<oneshot::Sender<()>>,
    /// The process exited without a stop request.
    halted: bool,
}

/// A booted vfkit guest.
///
/// A monitor task owns the child process and publishes its exit. An exit
/// that was not requested through [`VirtualMachine::stop`] is reported to
/// the halt subscriber as a guest-initiated shutdown.
pub struct VfkitMachine {
    pid: u32,
    stop_timeout: Duration,
    stop_requested: Arc<AtomicBool>,
    halt: Arc<Mutex<HaltState>>,
    process: watch::Receiver<ProcessState>,
}

impl VfkitMachine {
    /// Take ownership of a running child and start monitoring it.
    pub(crate) fn monitor(child: Child, pid: u32, stop_timeout: Duration) -> Self {
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let halt = Arc::new(Mutex::new(HaltState::default()));

        tokio::spawn(watch_child(
            child,
            pid,
            state_tx,
            Arc::clone(&stop_requested),
            Arc::clone(&halt),
        ));

        Self {
            pid,
            stop_timeout,
            stop_requested,
            halt,
            process: state_rx,
        }
    }

    fn is_running(&self) -> bool {
        matches!(*self.process.borrow(), ProcessState::Running)
    }

    async fn wait_for_exit(&self) -> GuestVmResult<ProcessState> {
        let mut rx = self.process.clone();
        let state = rx
            .wait_for(|state| !matches!(state, ProcessState::Running))
            .await
            .map_err(|_| GuestVmError::Stop("vfkit monitor went away".into()))?;
        Ok(state.clone())
    }
}

async fn watch_child(
    mut child: Child,
    pid: u32,
    state_tx: watch::Sender<ProcessState>,
    stop_requested: Arc<AtomicBool>,
    halt: Arc<Mutex<HaltState>>,
) {
    let state = match child.wait().await {
        Ok(status) => {
            tracing::info!(pid, exit_status = %status, "vfkit process exited");
            ProcessState::Exited(status)
        }
        Err(e) => {
            tracing::error!(pid, error = %e, "Failed to wait for vfkit process");
            ProcessState::Lost(e.to_string())
        }
    };

    if !stop_requested.load(Ordering::SeqCst) {
        let mut halt = halt.lock();
        halt.halted = true;
        if let Some(listener) = halt.listener.take() {
            let _ = listener.send(());
        }
    }

    state_tx.send_replace(state);
}

#[async_trait::async_trait]
impl VirtualMachine for VfkitMachine {
    fn subscribe_guest_halt(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut halt = self.halt.lock();
        if halt.halted {
            let _ = tx.send(());
        } else {
            halt.listener = Some(tx);
        }
        rx
    }

    async fn stop(&self) -> GuestVmResult<()> {
        self.stop_requested.store(true, Ordering::SeqCst);

        if self.is_running() && !terminate_process(self.pid) {
            tracing::warn!(pid = self.pid, "SIGTERM not delivered to vfkit");
        }

        let state = match tokio::time::timeout(self.stop_timeout, self.wait_for_exit()).await {
            Ok(state) => state?,
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    timeout_secs = self.stop_timeout.as_secs(),
                    "vfkit did not exit in time, killing"
                );
                kill_process(self.pid);
                self.wait_for_exit().await?
            }
        };

        match state {
            ProcessState::Exited(status) => {
                tracing::debug!(pid = self.pid, exit_status = %status, "vfkit stopped");
                Ok(())
            }
            ProcessState::Lost(reason) => Err(GuestVmError::Stop(reason)),
            ProcessState::Running => Err(GuestVmError::Internal(
                "vfkit reported running after exit".into(),
            )),
        }
    }
}

impl Drop for VfkitMachine {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!(pid = self.pid, "VfkitMachine dropped while running, terminating");
            self.stop_requested.store(true, Ordering::SeqCst);
            terminate_process(self.pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    fn spawn(cmd: &str, args: &[&str]) -> (Child, u32) {
        let child = Command::new(cmd).args(args).spawn().unwrap();
        let pid = child.id().unwrap();
        (child, pid)
    }

    #[tokio::test]
    async fn test_unrequested_exit_fires_halt() {
        let (child, pid) = spawn("sleep", &["0.1"]);
        let machine = VfkitMachine::monitor(child, pid, Duration::from_secs(5));
        let halted = machine.subscribe_guest_halt();

        tokio::time::timeout(Duration::from_secs(5), halted)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_after_exit_still_fires() {
        let (child, pid) = spawn("true", &[]);
        let machine = VfkitMachine::monitor(child, pid, Duration::from_secs(5));
        machine.wait_for_exit().await.unwrap();

        let halted = machine.subscribe_guest_halt();
        tokio::time::timeout(Duration::from_secs(1), halted)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_terminates_without_halt() {
        let (child, pid) = spawn("sleep", &["30"]);
        let machine = VfkitMachine::monitor(child, pid, Duration::from_secs(5));
        let halted = machine.subscribe_guest_halt();

        machine.stop().await.unwrap();
        assert!(!machine.is_running());

        drop(machine);
        // Sender dropped with the machine, never fired.
        assert!(halted.await.is_err());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        // Ignores SIGTERM, so only SIGKILL ends it.
        let (child, pid) = spawn("sh", &["-c", "trap '' TERM; sleep 30"]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let machine = VfkitMachine::monitor(child, pid, Duration::from_millis(300));

        machine.stop().await.unwrap();
        assert!(!machine.is_running());
    }
}
