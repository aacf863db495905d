//! Shared fixtures: a scripted in-memory platform and profile helpers.
//!
//! The platform never answers on its own. Each `start` or `stop` shows up as
//! a request the test pulls with [`ScriptedPlatform::next_start`] or
//! [`ScriptedPlatform::next_stop`] and then answers explicitly, so every
//! interleaving is under the test's control.

#![allow(dead_code)]

use guestvm::config::EfiVariableStore;
use guestvm::{
    GuestVmError, GuestVmOptions, GuestVmResult, LifecycleController, LifecycleStatus,
    PlatformConfiguration, RenderSurface, RenderTarget, VirtualMachine, VirtualizationPlatform,
};
use parking_lot::Mutex;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// RENDER TARGETS
// ============================================================================

#[derive(Debug)]
pub struct TestSurface {
    pub available: bool,
}

impl RenderSurface for TestSurface {
    fn is_available(&self) -> bool {
        self.available
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn surface() -> Option<RenderTarget> {
    Some(Arc::new(TestSurface { available: true }))
}

// ============================================================================
// SCRIPTED PLATFORM
// ============================================================================

pub struct StartRequest {
    pub config: PlatformConfiguration,
    reply: oneshot::Sender<GuestVmResult<Arc<ScriptedMachine>>>,
    stops: mpsc::UnboundedSender<StopRequest>,
}

impl StartRequest {
    /// Report a booted guest and hand back its machine.
    pub fn succeed(self) -> Arc<ScriptedMachine> {
        let machine = Arc::new(ScriptedMachine {
            halt: Mutex::new(None),
            stops: self.stops,
        });
        let _ = self.reply.send(Ok(Arc::clone(&machine)));
        machine
    }

    pub fn fail(self, reason: &str) {
        let _ = self
            .reply
            .send(Err(GuestVmError::Start(reason.to_string())));
    }
}

pub struct StopRequest {
    reply: oneshot::Sender<GuestVmResult<()>>,
}

impl StopRequest {
    pub fn succeed(self) {
        let _ = self.reply.send(Ok(()));
    }

    pub fn fail(self, reason: &str) {
        let _ = self.reply.send(Err(GuestVmError::Stop(reason.to_string())));
    }
}

pub struct ScriptedPlatform {
    starts_tx: mpsc::UnboundedSender<StartRequest>,
    starts_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StartRequest>>,
    stops_tx: mpsc::UnboundedSender<StopRequest>,
    stops_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StopRequest>>,
    start_calls: AtomicUsize,
    reject_with: Mutex<Option<String>>,
}

impl ScriptedPlatform {
    pub fn new() -> Arc<Self> {
        let (starts_tx, starts_rx) = mpsc::unbounded_channel();
        let (stops_tx, stops_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            starts_tx,
            starts_rx: tokio::sync::Mutex::new(starts_rx),
            stops_tx,
            stops_rx: tokio::sync::Mutex::new(stops_rx),
            start_calls: AtomicUsize::new(0),
            reject_with: Mutex::new(None),
        })
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Make `validate` fail with `reason` from now on.
    pub fn reject(&self, reason: &str) {
        *self.reject_with.lock() = Some(reason.to_string());
    }

    pub async fn next_start(&self) -> StartRequest {
        let mut rx = self.starts_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("no start request arrived")
            .expect("start channel closed")
    }

    pub async fn next_stop(&self) -> StopRequest {
        let mut rx = self.stops_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("no stop request arrived")
            .expect("stop channel closed")
    }
}

#[async_trait::async_trait]
impl VirtualizationPlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_efi_variable_store(
        &self,
        path: &Path,
        _allow_overwrite: bool,
    ) -> GuestVmResult<EfiVariableStore> {
        Ok(EfiVariableStore::new(path, true))
    }

    fn validate(&self, _config: &PlatformConfiguration) -> GuestVmResult<()> {
        match self.reject_with.lock().clone() {
            Some(reason) => Err(GuestVmError::Platform(reason)),
            None => Ok(()),
        }
    }

    async fn start(
        &self,
        config: PlatformConfiguration,
        _target: RenderTarget,
    ) -> GuestVmResult<Arc<dyn VirtualMachine>> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let (reply, answer) = oneshot::channel();
        self.starts_tx
            .send(StartRequest {
                config,
                reply,
                stops: self.stops_tx.clone(),
            })
            .map_err(|_| GuestVmError::Platform("test dropped the platform".into()))?;

        let machine = answer
            .await
            .map_err(|_| GuestVmError::Platform("start request dropped".into()))??;
        Ok(machine)
    }
}

pub struct ScriptedMachine {
    halt: Mutex<Option<oneshot::Sender<()>>>,
    stops: mpsc::UnboundedSender<StopRequest>,
}

impl ScriptedMachine {
    /// Simulate the guest shutting itself down.
    pub fn halt(&self) {
        if let Some(tx) = self.halt.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl VirtualMachine for ScriptedMachine {
    fn subscribe_guest_halt(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.halt.lock() = Some(tx);
        rx
    }

    async fn stop(&self) -> GuestVmResult<()> {
        let (reply, answer) = oneshot::channel();
        self.stops
            .send(StopRequest { reply })
            .map_err(|_| GuestVmError::Platform("test dropped the platform".into()))?;
        answer
            .await
            .map_err(|_| GuestVmError::Platform("stop request dropped".into()))?
    }
}

// ============================================================================
// PROFILES AND CONTROLLERS
// ============================================================================

pub fn profile_json(kernel: &str, uefi: bool) -> String {
    format!(
        r#"{{
            "cpus": 2,
            "memory": 1024,
            "kernel": "{}",
            "initrd": "",
            "storage": ["/images/root.img"],
            "cmdline": "console=hvc0",
            "network": true,
            "uefi": {},
            "shared": []
        }}"#,
        kernel, uefi
    )
}

/// Write `contents` as `name` in `dir` and return its absolute path.
pub fn write_profile(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn bootable_profile(dir: &TempDir) -> PathBuf {
    write_profile(dir, "guest.json", &profile_json("/boot/vmlinuz", false))
}

/// Options that leave the process working directory alone.
pub fn test_options() -> GuestVmOptions {
    GuestVmOptions {
        follow_profile_directory: false,
        raw_terminal: false,
        ..Default::default()
    }
}

pub fn controller(platform: &Arc<ScriptedPlatform>) -> LifecycleController {
    LifecycleController::new(Arc::clone(platform) as _, test_options()).unwrap()
}

pub async fn wait_for_status(controller: &LifecycleController, expected: LifecycleStatus) {
    let mut rx = controller.reporter().subscribe_status();
    tokio::time::timeout(WAIT, rx.wait_for(|status| *status == expected))
        .await
        .unwrap_or_else(|_| {
            panic!(
                "status stuck at {} waiting for {}",
                controller.status(),
                expected
            )
        })
        .unwrap();
}

/// Load, start and answer the start, leaving the controller `Started`.
pub async fn started(
    platform: &Arc<ScriptedPlatform>,
    controller: &LifecycleController,
    profile: &Path,
) -> Arc<ScriptedMachine> {
    controller.load_profile(profile).unwrap();
    controller.start(surface()).unwrap();
    let machine = platform.next_start().await.succeed();
    wait_for_status(controller, LifecycleStatus::Started).await;
    machine
}

/// Let spawned completions run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
