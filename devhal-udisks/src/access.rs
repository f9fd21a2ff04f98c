// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use devhal_contracts::{
    BusError, HalError, PassphrasePrompt, StorageEvent, translate_bus_error,
};
use futures::StreamExt;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;

use crate::{MountOptions, UDisksBackend, UDisksDevice, is_in_user_path, shortest_mount_point};

/// Upper bound for an unmount call; flushing a slow stick can take minutes.
pub const UNMOUNT_TIMEOUT: Duration = Duration::from_millis(0x7fff_ffff);

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct AccessSettings {
    /// Mount roots under which a filesystem counts as user media.
    pub media_roots: Vec<String>,
    /// Also treat mounts under this directory as user media.
    pub home_dir: Option<PathBuf>,
    pub unmount_timeout: Duration,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            media_roots: vec!["/media/".into(), "/run/media/".into()],
            home_dir: std::env::var_os("HOME").map(PathBuf::from),
            unmount_timeout: UNMOUNT_TIMEOUT,
        }
    }
}

#[derive(Debug, Default)]
struct AccessState {
    setup_in_progress: bool,
    teardown_in_progress: bool,
    accessible: bool,
}

impl AccessState {
    fn busy(&self) -> bool {
        self.setup_in_progress || self.teardown_in_progress
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Setup,
    Teardown,
}

struct AccessInner {
    device: UDisksDevice,
    prompt: Arc<dyn PassphrasePrompt>,
    settings: AccessSettings,
    state: Mutex<AccessState>,
    events: broadcast::Sender<StorageEvent>,
    drive_release: AsyncMutex<Option<JoinHandle<()>>>,
}

/// Mount/unmount/unlock/lock lifecycle of one block device.
///
/// At most one of setup and teardown runs at a time. Requests are accepted or
/// refused synchronously; outcomes arrive as [`StorageEvent`]s.
#[derive(Clone)]
pub struct StorageAccess {
    inner: Arc<AccessInner>,
}

fn translated(err: BusError) -> HalError {
    translate_bus_error(&err)
}

impl StorageAccess {
    pub async fn new(
        backend: Arc<dyn UDisksBackend>,
        udi: impl Into<String>,
        prompt: Arc<dyn PassphrasePrompt>,
        settings: AccessSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let access = Self {
            inner: Arc::new(AccessInner {
                device: UDisksDevice::new(backend, udi),
                prompt,
                settings,
                state: Mutex::new(AccessState::default()),
                events,
                drive_release: AsyncMutex::new(None),
            }),
        };

        let accessible = access.accessibility_or_false().await;
        access.state().accessible = accessible;
        access
    }

    pub fn udi(&self) -> &str {
        self.inner.device.udi()
    }

    pub fn device(&self) -> &UDisksDevice {
        &self.inner.device
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.events.subscribe()
    }

    /// Accessibility as of the last check, without touching the bus.
    pub fn cached_accessibility(&self) -> bool {
        self.state().accessible
    }

    pub fn is_busy(&self) -> bool {
        self.state().busy()
    }

    fn state(&self) -> MutexGuard<'_, AccessState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn backend(&self) -> Arc<dyn UDisksBackend> {
        self.inner.device.backend().clone()
    }

    fn emit(&self, event: StorageEvent) {
        if self.inner.events.send(event).is_err() {
            tracing::trace!("No listeners for {} events", self.udi());
        }
    }

    pub async fn is_encrypted(&self) -> Result<bool, BusError> {
        self.inner.device.is_encrypted_container().await
    }

    /// Cleartext volume of an unlocked container, `None` otherwise.
    pub async fn clear_text_path(&self) -> Result<Option<String>, BusError> {
        if !self.is_encrypted().await? {
            return Ok(None);
        }
        self.inner.device.cleartext_device().await
    }

    /// Mounted, or for a container: unlocked with a mounted cleartext volume.
    pub async fn is_accessible(&self) -> Result<bool, BusError> {
        if !self.is_encrypted().await? {
            return self.inner.device.is_mounted().await;
        }

        match self.inner.device.cleartext_device().await? {
            Some(path) => UDisksDevice::new(self.backend(), path).is_mounted().await,
            None => Ok(false),
        }
    }

    pub async fn file_path(&self) -> Result<Option<String>, BusError> {
        let mount_points = if self.is_encrypted().await? {
            match self.inner.device.cleartext_device().await? {
                Some(path) => UDisksDevice::new(self.backend(), path).mount_points().await?,
                None => return Ok(None),
            }
        } else {
            self.inner.device.mount_points().await?
        };

        Ok(shortest_mount_point(&mount_points))
    }

    /// Hidden from users: flagged by udev, or not mounted in a user location.
    pub async fn is_ignored(&self) -> Result<bool, BusError> {
        if self.inner.device.hint_ignore().await? {
            return Ok(true);
        }

        let path = self.file_path().await?.unwrap_or_default();
        let settings = &self.inner.settings;
        Ok(!is_in_user_path(
            &path,
            &settings.media_roots,
            settings.home_dir.as_deref(),
        ))
    }

    async fn accessibility_or_false(&self) -> bool {
        match self.is_accessible().await {
            Ok(accessible) => accessible,
            Err(e) => {
                tracing::debug!("Could not determine accessibility of {}: {e}", self.udi());
                false
            }
        }
    }

    /// Recomputes accessibility and reports a transition, if any.
    pub async fn check_accessibility(&self) {
        let accessible = self.accessibility_or_false().await;

        let changed = {
            let mut state = self.state();
            let changed = state.accessible != accessible;
            state.accessible = accessible;
            changed
        };

        if changed {
            self.emit(StorageEvent::AccessibilityChanged {
                udi: self.udi().to_string(),
                accessible,
            });
        }
    }

    /// Makes the device accessible: unlock if needed, then mount.
    ///
    /// Returns `false` without side effects while another operation runs.
    pub fn setup(&self) -> bool {
        {
            let mut state = self.state();
            if state.busy() {
                return false;
            }
            state.setup_in_progress = true;
        }

        self.emit(StorageEvent::SetupRequested {
            udi: self.udi().to_string(),
        });

        let this = self.clone();
        tokio::spawn(async move {
            let result = this.run_setup().await;
            this.finish(Operation::Setup, result).await;
        });

        true
    }

    /// Makes the device safe to remove: unmount, lock, release the drive.
    ///
    /// Returns `false` without side effects while another operation runs.
    pub fn teardown(&self) -> bool {
        {
            let mut state = self.state();
            if state.busy() {
                return false;
            }
            state.teardown_in_progress = true;
        }

        self.emit(StorageEvent::TeardownRequested {
            udi: self.udi().to_string(),
        });

        let this = self.clone();
        tokio::spawn(async move {
            let result = this.run_teardown().await;
            this.finish(Operation::Teardown, result).await;
        });

        true
    }

    async fn run_setup(&self) -> Result<(), HalError> {
        let device = &self.inner.device;

        let locked_container = device.is_encrypted_container().await.map_err(translated)?
            && device.cleartext_device().await.map_err(translated)?.is_none();
        if !locked_container {
            let target = self
                .clear_text_path()
                .await
                .map_err(translated)?
                .unwrap_or_else(|| self.udi().to_string());
            return self.mount(target).await;
        }

        let passphrase = match self.inner.prompt.request_passphrase(self.udi()).await {
            Ok(passphrase) if !passphrase.is_empty() => passphrase,
            Ok(_) => return Err(HalError::user_canceled()),
            Err(e) => {
                tracing::warn!("Passphrase prompt for {} failed: {e}", self.udi());
                return Err(HalError::user_canceled());
            }
        };

        let cleartext = self
            .backend()
            .unlock(self.udi().to_string(), passphrase)
            .await
            .map_err(translated)?;
        tracing::info!("Unlocked {} as {cleartext}", self.udi());

        // The desktop automounter may have won the race.
        if self.is_accessible().await.map_err(translated)? {
            return Ok(());
        }

        self.mount(cleartext).await
    }

    async fn mount(&self, target: String) -> Result<(), HalError> {
        let mut options = MountOptions::new();
        if self.inner.device.id_type().await.map_err(translated)? == "vfat" {
            options.insert("options".into(), "flush".into());
        }

        let mount_path = self
            .backend()
            .mount(target.clone(), options)
            .await
            .map_err(translated)?;
        tracing::info!("Mounted {target} at {mount_path}");
        Ok(())
    }

    async fn run_teardown(&self) -> Result<(), HalError> {
        let device = &self.inner.device;
        let cleartext = self.clear_text_path().await.map_err(translated)?;
        let target = cleartext
            .clone()
            .unwrap_or_else(|| self.udi().to_string());

        tracing::debug!("Initiating unmount of {target}");
        let backend = self.backend();
        let unmount = backend.unmount(target.clone());
        match tokio::time::timeout(self.inner.settings.unmount_timeout, unmount).await {
            Ok(result) => result.map_err(translated)?,
            Err(_) => {
                return Err(translated(BusError::no_reply(format!(
                    "Unmount of {target} did not finish in time"
                ))));
            }
        }
        tracing::info!("Unmounted {target}");

        let container = match cleartext {
            Some(_) => Some(self.udi().to_string()),
            None => device.crypto_backing_device().await.map_err(translated)?,
        };
        if let Some(container) = container {
            self.backend()
                .lock(container.clone())
                .await
                .map_err(translated)?;
            tracing::info!("Locked {container}");
        }

        self.release_drive().await;
        Ok(())
    }

    /// Ejects or powers off the parent drive. Failures are only logged.
    async fn release_drive(&self) {
        let device = &self.inner.device;
        let decision = async {
            let Some(drive_path) = device.drive_path().await? else {
                return Ok::<_, BusError>(None);
            };
            if device.is_optical_disc().await? {
                return Ok(None);
            }

            let drive = UDisksDevice::new(self.backend(), drive_path.clone());
            let flag = |value: Option<devhal_types::PropValue>| {
                value.and_then(|v| v.as_bool()).unwrap_or(false)
            };

            if flag(drive.prop("MediaRemovable").await?) && flag(drive.prop("MediaAvailable").await?)
            {
                Ok(Some((drive_path, true)))
            } else if flag(drive.prop("CanPowerOff").await?) {
                Ok(Some((drive_path, false)))
            } else {
                Ok(None)
            }
        };

        let (drive_path, eject) = match decision.await {
            Ok(Some(decision)) => decision,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!("Not releasing drive of {}: {e}", self.udi());
                return;
            }
        };

        let backend = self.backend();
        let request = tokio::spawn(async move {
            let (action, result) = if eject {
                ("eject", backend.eject(drive_path.clone()).await)
            } else {
                ("power off", backend.power_off(drive_path.clone()).await)
            };
            match result {
                Ok(()) => tracing::info!("Requested {action} of {drive_path}"),
                Err(e) => tracing::warn!("Could not {action} {drive_path}: {e}"),
            }
        });
        *self.inner.drive_release.lock().await = Some(request);
    }

    /// Waits until the last eject or power-off request has been answered.
    ///
    /// Teardown completes before the drive is released; a process about to
    /// exit calls this so the request is not dropped with the runtime.
    pub async fn wait_for_drive_release(&self) {
        let mut pending = self.inner.drive_release.lock().await;
        if let Some(request) = pending.as_mut() {
            if let Err(e) = request.await {
                tracing::debug!("Drive release task of {} ended abnormally: {e}", self.udi());
            }
        }
        *pending = None;
    }

    async fn finish(&self, operation: Operation, result: Result<(), HalError>) {
        {
            let mut state = self.state();
            match operation {
                Operation::Setup => state.setup_in_progress = false,
                Operation::Teardown => state.teardown_in_progress = false,
            }
        }

        if result.is_ok() {
            self.inner.device.invalidate_cache().await;
        }
        if let Err(e) = &result {
            tracing::warn!("{operation:?} of {} failed: {e}", self.udi());
        }

        let udi = self.udi().to_string();
        self.emit(match operation {
            Operation::Setup => StorageEvent::SetupDone { udi, result },
            Operation::Teardown => StorageEvent::TeardownDone { udi, result },
        });

        self.check_accessibility().await;
    }

    /// Follows remote property changes until the device disappears.
    pub async fn spawn_change_relay(&self) -> Result<JoinHandle<()>, BusError> {
        let mut changes = self.backend().changes(self.udi().to_string()).await?;
        let this = self.clone();

        Ok(tokio::spawn(async move {
            while changes.next().await.is_some() {
                this.inner.device.invalidate_cache().await;
                this.check_accessibility().await;
            }
            tracing::debug!("Change stream for {} ended", this.udi());
        }))
    }
}
