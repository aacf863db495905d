//! The lifecycle state machine.

use super::LifecycleStatus;
use crate::config::ConfigurationBuilder;
use crate::options::GuestVmOptions;
use crate::platform::{RenderTarget, VirtualMachine, VirtualizationPlatform};
use crate::profile::{Profile, ProfileLoader};
use crate::status::StatusReporter;
use crate::util::RawTerminal;
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Sequences load, start and stop of a single guest.
///
/// **Locking Strategy**: every mutation of controller state, and every
/// status or log write, happens under one `parking_lot::Mutex`. Platform
/// start and stop run as spawned tasks that take the lock only to apply
/// their completion; the lock is never held across an `.await`.
///
/// **Operations**: `load_profile`, `start` and `stop` return the immediate
/// outcome only. What happens asynchronously afterwards is observable through
/// [`StatusReporter`].
///
/// **Cloning**: cheap; all clones drive the same guest.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<ControllerInner>,
}

impl LifecycleController {
    /// Create a controller in `Unloaded`.
    ///
    /// Must be called from within a tokio runtime; completions are spawned
    /// onto it.
    pub fn new(
        platform: Arc<dyn VirtualizationPlatform>,
        options: GuestVmOptions,
    ) -> GuestVmResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            GuestVmError::Config(format!(
                "lifecycle controller needs a tokio runtime: {}",
                e
            ))
        })?;

        tracing::debug!(platform = platform.name(), "Created lifecycle controller");

        Ok(Self {
            inner: Arc::new(ControllerInner {
                platform,
                options,
                reporter: StatusReporter::new(),
                runtime,
                state: Mutex::new(ControllerState::default()),
            }),
        })
    }

    /// Load the profile at `path` and make it current.
    ///
    /// On success the status becomes `Loaded`, even over a running guest.
    /// On failure the held profile and the status are left untouched.
    pub fn load_profile(&self, path: &Path) -> GuestVmResult<()> {
        self.inner.load_profile(path)
    }

    /// Boot the current profile onto `target`.
    ///
    /// Returns once the start is submitted. `Started` or `Error` follows
    /// when the platform answers.
    pub fn start(&self, target: Option<RenderTarget>) -> GuestVmResult<()> {
        ControllerInner::start(&self.inner, target)
    }

    /// Stop the running guest.
    ///
    /// Returns once the stop is submitted. The status returns to `Loaded`
    /// when the platform answers, whatever the outcome. While a start is
    /// still pending the stop is queued: the guest is stopped as soon as it
    /// boots and never reports `Started`.
    pub fn stop(&self) -> GuestVmResult<()> {
        ControllerInner::stop(&self.inner)
    }

    pub fn status(&self) -> LifecycleStatus {
        self.inner.reporter.status()
    }

    pub fn log(&self) -> String {
        self.inner.reporter.log()
    }

    /// The profile adopted by the last successful load.
    pub fn profile(&self) -> Option<Arc<Profile>> {
        self.inner.state.lock().profile.clone()
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.inner.reporter
    }

    /// Whether a guest handle is currently held.
    pub fn has_vm(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }
}

// ============================================================================
// INTERNALS
// ============================================================================

struct ControllerInner {
    platform: Arc<dyn VirtualizationPlatform>,
    options: GuestVmOptions,
    reporter: StatusReporter,
    runtime: Handle,
    state: Mutex<ControllerState>,
}

#[derive(Default)]
struct ControllerState {
    profile: Option<Arc<Profile>>,
    /// Start submitted to the platform, not yet answered.
    pending: Option<StartAttempt>,
    /// The running guest.
    session: Option<VmSession>,
    /// Session id with a stop in flight.
    stopping: Option<u64>,
    next_id: u64,
}

struct StartAttempt {
    id: u64,
    terminal: Option<RawTerminal>,
    /// `stop()` arrived before the platform answered.
    stop_requested: bool,
}

/// A running guest and what is bound to its lifetime.
struct VmSession {
    id: u64,
    machine: Arc<dyn VirtualMachine>,
    _terminal: Option<RawTerminal>,
}

impl ControllerInner {
    fn load_profile(&self, path: &Path) -> GuestVmResult<()> {
        let profile = ProfileLoader::load(path).map_err(|e| {
            self.reporter.error(format!("cannot load profile: {}", e));
            e
        })?;

        // Held across the directory change so a concurrent start builds and
        // validates against one working directory.
        let mut state = self.state.lock();
        if self.options.follow_profile_directory {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::env::set_current_dir(parent).map_err(|e| {
                    let message = format!(
                        "cannot enter profile directory {}: {}",
                        parent.display(),
                        e
                    );
                    self.reporter.error(&message);
                    GuestVmError::Io(message)
                })?;
                tracing::debug!(dir = %parent.display(), "Changed working directory");
            }
        }

        if state.session.is_some() || state.pending.is_some() {
            tracing::warn!(
                status = %self.reporter.status(),
                "Profile reloaded while a guest is active, status reset to loaded"
            );
        }
        state.profile = Some(Arc::new(profile));
        self.reporter
            .info(format!("loaded profile {}", path.display()));
        self.reporter.set_status(LifecycleStatus::Loaded);
        Ok(())
    }

    fn start(this: &Arc<Self>, target: Option<RenderTarget>) -> GuestVmResult<()> {
        let mut state = this.state.lock();
        let status = this.reporter.status();

        if status != LifecycleStatus::Loaded || state.session.is_some() || state.pending.is_some()
        {
            return Err(this.reject(format!("cannot start while {}", status)));
        }

        let profile = state
            .profile
            .clone()
            .ok_or_else(|| GuestVmError::Internal("loaded without a profile".into()))?;

        let target = match target {
            Some(target) if target.is_available() => target,
            Some(_) => {
                return Err(this.fail(GuestVmError::Capability(
                    "render target is not available".into(),
                )));
            }
            None => {
                return Err(this.fail(GuestVmError::Capability(
                    "no render target to draw the guest display on".into(),
                )));
            }
        };

        let config = match ConfigurationBuilder::new(this.platform.as_ref()).build(&profile) {
            Ok(config) => config,
            Err(e) => {
                let e = this.fail(e);
                this.reporter.set_status(LifecycleStatus::Error);
                return Err(e);
            }
        };

        let terminal = if this.options.raw_terminal && config.requests_raw_terminal() {
            RawTerminal::enter().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Console stays in line mode");
                None
            })
        } else {
            None
        };

        let id = state.next_id;
        state.next_id += 1;
        state.pending = Some(StartAttempt {
            id,
            terminal,
            stop_requested: false,
        });
        this.reporter.info("starting virtual machine");
        this.reporter.set_status(LifecycleStatus::Starting);
        drop(state);

        tracing::debug!(session = id, platform = this.platform.name(), "Submitting start");
        let weak = Arc::downgrade(this);
        let platform = Arc::clone(&this.platform);
        this.runtime.spawn(async move {
            let result = platform.start(config, target).await;
            if let Some(inner) = weak.upgrade() {
                ControllerInner::complete_start(&inner, id, result);
            }
        });

        Ok(())
    }

    fn complete_start(
        this: &Arc<Self>,
        id: u64,
        result: GuestVmResult<Arc<dyn VirtualMachine>>,
    ) {
        let mut state = this.state.lock();
        let Some(attempt) = state.pending.take_if(|attempt| attempt.id == id) else {
            tracing::debug!(session = id, "Ignoring start completion for a stale attempt");
            return;
        };

        match result {
            Ok(machine) => {
                let halted = machine.subscribe_guest_halt();
                state.session = Some(VmSession {
                    id,
                    machine: Arc::clone(&machine),
                    _terminal: attempt.terminal,
                });
                let weak = Arc::downgrade(this);
                this.runtime.spawn(watch_guest_halt(weak, id, halted));

                if attempt.stop_requested {
                    // Still Halting: the guest never shows up as Started.
                    tracing::debug!(session = id, "Guest booted with a stop queued");
                    state.stopping = Some(id);
                    drop(state);
                    ControllerInner::submit_stop(this, id, machine);
                } else {
                    this.reporter.info("virtual machine started");
                    this.reporter.set_status(LifecycleStatus::Started);
                }
            }
            Err(e) if attempt.stop_requested => {
                this.reporter.error(e.to_string());
                this.reporter.set_status(LifecycleStatus::Loaded);
            }
            Err(e) => {
                this.reporter.error(e.to_string());
                // A reload while starting already moved on to Loaded.
                if this.reporter.status() == LifecycleStatus::Starting {
                    this.reporter.set_status(LifecycleStatus::Error);
                }
            }
        }
    }

    fn stop(this: &Arc<Self>) -> GuestVmResult<()> {
        let mut state = this.state.lock();

        let session = state
            .session
            .as_ref()
            .map(|session| (session.id, Arc::clone(&session.machine)));
        let (id, machine) = match (session, state.stopping) {
            (Some(session), None) => session,
            (Some(_), Some(_)) => {
                return Err(this.reject("a stop is already in progress".into()));
            }
            (None, _) => {
                // A start still in flight: queue the stop for its completion.
                if let Some(attempt) = state.pending.as_mut() {
                    if attempt.stop_requested {
                        return Err(this.reject("a stop is already in progress".into()));
                    }
                    attempt.stop_requested = true;
                    tracing::debug!(session = attempt.id, "Stop queued behind pending start");
                    this.reporter.info("stopping virtual machine once it has booted");
                    this.reporter.set_status(LifecycleStatus::Halting);
                    return Ok(());
                }
                let status = this.reporter.status();
                return Err(this.reject(format!("cannot stop while {}", status)));
            }
        };

        state.stopping = Some(id);
        this.reporter.info("stopping virtual machine");
        this.reporter.set_status(LifecycleStatus::Halting);
        drop(state);

        ControllerInner::submit_stop(this, id, machine);
        Ok(())
    }

    fn submit_stop(this: &Arc<Self>, id: u64, machine: Arc<dyn VirtualMachine>) {
        tracing::debug!(session = id, "Submitting stop");
        let weak = Arc::downgrade(this);
        this.runtime.spawn(async move {
            let result = machine.stop().await;
            drop(machine);
            if let Some(inner) = weak.upgrade() {
                inner.complete_stop(id, result);
            }
        });
    }

    fn complete_stop(&self, id: u64, result: GuestVmResult<()>) {
        let mut state = self.state.lock();
        if state.stopping == Some(id) {
            state.stopping = None;
        }
        if !state.session.as_ref().is_some_and(|s| s.id == id) {
            tracing::debug!(session = id, "Ignoring stop completion for a released guest");
            return;
        }

        state.session = None;
        match result {
            Ok(()) => self.reporter.info("virtual machine stopped"),
            Err(e) => self.reporter.error(e.to_string()),
        }
        self.reporter.set_status(LifecycleStatus::Loaded);
    }

    fn on_guest_halted(&self, id: u64) {
        let mut state = self.state.lock();
        if !state.session.as_ref().is_some_and(|s| s.id == id) {
            tracing::debug!(session = id, "Ignoring halt from a released guest");
            return;
        }

        if state.stopping == Some(id) {
            state.stopping = None;
        }
        state.session = None;
        self.reporter.info("guest shut down");
        self.reporter.set_status(LifecycleStatus::Loaded);
    }

    /// Log a rejected request and turn it into an `InvalidState` error.
    fn reject(&self, message: String) -> GuestVmError {
        self.reporter.error(&message);
        GuestVmError::InvalidState(message)
    }

    fn fail(&self, error: GuestVmError) -> GuestVmError {
        self.reporter.error(error.to_string());
        error
    }
}

async fn watch_guest_halt(
    controller: Weak<ControllerInner>,
    id: u64,
    halted: tokio::sync::oneshot::Receiver<()>,
) {
    // Err means the machine went away without a guest shutdown.
    if halted.await.is_err() {
        return;
    }
    tracing::info!(session = id, "Guest initiated shutdown");
    if let Some(inner) = controller.upgrade() {
        inner.on_guest_halted(id);
    }
}
