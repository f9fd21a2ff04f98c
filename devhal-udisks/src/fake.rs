// SPDX-License-Identifier: GPL-3.0-only

//! In-memory UDisks2 stand-in for adapter tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devhal_contracts::{BusError, PassphrasePrompt, PromptError, StorageEvent};
use devhal_types::{ObjectProperties, PropValue, PropertyMap};
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, broadcast, mpsc};

use crate::{
    ChangeStream, MountOptions, UD2_DBUS_INTERFACE_BLOCK, UD2_DBUS_INTERFACE_DRIVE,
    UD2_DBUS_INTERFACE_ENCRYPTED, UD2_DBUS_INTERFACE_FILESYSTEM, UD2_DBUS_PATH_BLOCKDEVICES,
    UDisksBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Properties(String),
    Property(String, &'static str),
    BlockDevices,
    Mount(String, MountOptions),
    Unmount(String),
    Unlock(String, String),
    Lock(String),
    Eject(String),
    PowerOff(String),
    Changes(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DriveProps {
    pub removable: bool,
    pub available: bool,
    pub can_power_off: bool,
    pub optical: bool,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    objects: Mutex<BTreeMap<String, ObjectProperties>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, BusError>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

fn block_props() -> PropertyMap {
    let mut block = PropertyMap::new();
    block.insert("Drive".into(), PropValue::ObjectPath("/".into()));
    block.insert("CryptoBackingDevice".into(), PropValue::ObjectPath("/".into()));
    block.insert("IdType".into(), PropValue::from(""));
    block.insert("HintIgnore".into(), PropValue::from(false));
    block
}

fn mount_point_list(mount_points: &[&str]) -> PropValue {
    PropValue::List(
        mount_points
            .iter()
            .map(|mp| PropValue::Bytes([mp.as_bytes(), &b"\0"[..]].concat()))
            .collect(),
    )
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_mut<R>(&self, udi: &str, f: impl FnOnce(&mut ObjectProperties) -> R) -> R {
        let mut objects = self.objects.lock().unwrap();
        f(objects.entry(udi.to_string()).or_default())
    }

    pub fn with_prop(self, udi: &str, interface: &str, key: &str, value: PropValue) -> Self {
        self.object_mut(udi, |obj| {
            obj.entry(interface.to_string())
                .or_default()
                .insert(key.to_string(), value);
        });
        self
    }

    pub fn with_block(self, udi: &str) -> Self {
        self.object_mut(udi, |obj| {
            obj.insert(UD2_DBUS_INTERFACE_BLOCK.to_string(), block_props());
        });
        self
    }

    pub fn with_filesystem(self, udi: &str, mount_points: &[&str], id_type: &str) -> Self {
        self.with_block(udi)
            .with_prop(udi, UD2_DBUS_INTERFACE_BLOCK, "IdType", PropValue::from(id_type))
            .with_prop(
                udi,
                UD2_DBUS_INTERFACE_FILESYSTEM,
                "MountPoints",
                mount_point_list(mount_points),
            )
    }

    pub fn with_encrypted(self, udi: &str) -> Self {
        self.with_block(udi)
            .with_prop(udi, UD2_DBUS_INTERFACE_BLOCK, "IdType", PropValue::from("crypto_LUKS"))
            .with_prop(
                udi,
                UD2_DBUS_INTERFACE_ENCRYPTED,
                "HintEncryptionType",
                PropValue::from("luks2"),
            )
    }

    pub fn with_cleartext(self, udi: &str, backing: &str, mount_points: &[&str]) -> Self {
        self.with_filesystem(udi, mount_points, "ext4").with_prop(
            udi,
            UD2_DBUS_INTERFACE_BLOCK,
            "CryptoBackingDevice",
            PropValue::ObjectPath(backing.to_string()),
        )
    }

    pub fn with_drive(self, udi: &str, drive: &str, props: DriveProps) -> Self {
        self.with_prop(
            udi,
            UD2_DBUS_INTERFACE_BLOCK,
            "Drive",
            PropValue::ObjectPath(drive.to_string()),
        )
        .with_prop(drive, UD2_DBUS_INTERFACE_DRIVE, "MediaRemovable", props.removable.into())
        .with_prop(drive, UD2_DBUS_INTERFACE_DRIVE, "MediaAvailable", props.available.into())
        .with_prop(drive, UD2_DBUS_INTERFACE_DRIVE, "CanPowerOff", props.can_power_off.into())
        .with_prop(drive, UD2_DBUS_INTERFACE_DRIVE, "Optical", props.optical.into())
    }

    pub fn set_mount_points(&self, udi: &str, mount_points: &[&str]) {
        self.object_mut(udi, |obj| {
            obj.entry(UD2_DBUS_INTERFACE_FILESYSTEM.to_string())
                .or_default()
                .insert("MountPoints".into(), mount_point_list(mount_points));
        });
    }

    pub fn fail(&self, method: &'static str, error: BusError) {
        self.failures.lock().unwrap().insert(method, error);
    }

    /// Holds `method` until the returned gate is notified.
    pub fn gate(&self, method: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(method, gate.clone());
        gate
    }

    pub fn emit_change(&self) {
        for watcher in self.watchers.lock().unwrap().iter() {
            let _ = watcher.send(());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Calls that change device state, in issue order.
    pub fn actions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    Call::Properties(_) | Call::Property(..) | Call::BlockDevices | Call::Changes(_)
                )
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn enter(&self, method: &'static str) -> Result<(), BusError> {
        let gate = self.gates.lock().unwrap().get(method).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.failures.lock().unwrap().get(method) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn unknown_object(path: &str) -> BusError {
        BusError::new(
            "org.freedesktop.DBus.Error.UnknownObject",
            format!("No such object path '{path}'"),
        )
    }
}

impl UDisksBackend for FakeBackend {
    fn properties(&self, path: String) -> BoxFuture<'_, Result<ObjectProperties, BusError>> {
        self.record(Call::Properties(path.clone()));
        Box::pin(async move {
            self.enter("properties").await?;
            self.objects
                .lock()
                .unwrap()
                .get(&path)
                .cloned()
                .ok_or_else(|| Self::unknown_object(&path))
        })
    }

    fn property(
        &self,
        path: String,
        interface: &'static str,
        name: &'static str,
    ) -> BoxFuture<'_, Result<PropValue, BusError>> {
        self.record(Call::Property(path.clone(), name));
        Box::pin(async move {
            self.enter("property").await?;
            self.objects
                .lock()
                .unwrap()
                .get(&path)
                .and_then(|obj| obj.get(interface))
                .and_then(|props| props.get(name))
                .cloned()
                .ok_or_else(|| {
                    BusError::new(
                        "org.freedesktop.DBus.Error.InvalidArgs",
                        format!("No such interface '{interface}'"),
                    )
                })
        })
    }

    fn block_devices(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>> {
        self.record(Call::BlockDevices);
        Box::pin(async move {
            self.enter("block_devices").await?;
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, obj)| obj.contains_key(UD2_DBUS_INTERFACE_BLOCK))
                .map(|(path, _)| path.clone())
                .collect())
        })
    }

    fn mount(&self, path: String, options: MountOptions) -> BoxFuture<'_, Result<String, BusError>> {
        self.record(Call::Mount(path.clone(), options));
        Box::pin(async move {
            self.enter("mount").await?;
            let name = path.rsplit('/').next().unwrap_or("disk").to_string();
            let mount_path = format!("/run/media/user/{name}");
            self.set_mount_points(&path, &[mount_path.as_str()]);
            Ok(mount_path)
        })
    }

    fn unmount(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        self.record(Call::Unmount(path.clone()));
        Box::pin(async move {
            self.enter("unmount").await?;
            self.set_mount_points(&path, &[]);
            Ok(())
        })
    }

    fn unlock(&self, path: String, passphrase: String) -> BoxFuture<'_, Result<String, BusError>> {
        self.record(Call::Unlock(path.clone(), passphrase));
        Box::pin(async move {
            self.enter("unlock").await?;
            let name = path.rsplit('/').next().unwrap_or("disk");
            let cleartext = format!("{UD2_DBUS_PATH_BLOCKDEVICES}/luks_{name}");
            let mut props = ObjectProperties::new();
            let mut block = block_props();
            block.insert("IdType".into(), PropValue::from("ext4"));
            block.insert("CryptoBackingDevice".into(), PropValue::ObjectPath(path.clone()));
            props.insert(UD2_DBUS_INTERFACE_BLOCK.to_string(), block);
            let mut fs = PropertyMap::new();
            fs.insert("MountPoints".into(), mount_point_list(&[]));
            props.insert(UD2_DBUS_INTERFACE_FILESYSTEM.to_string(), fs);
            self.objects.lock().unwrap().insert(cleartext.clone(), props);
            Ok(cleartext)
        })
    }

    fn lock(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        self.record(Call::Lock(path.clone()));
        Box::pin(async move {
            self.enter("lock").await?;
            self.objects.lock().unwrap().retain(|_, obj| {
                obj.get(UD2_DBUS_INTERFACE_BLOCK)
                    .and_then(|b| b.get("CryptoBackingDevice"))
                    .and_then(PropValue::as_object_path)
                    .as_deref()
                    != Some(path.as_str())
            });
            Ok(())
        })
    }

    fn eject(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>> {
        self.record(Call::Eject(drive));
        Box::pin(async move { self.enter("eject").await })
    }

    fn power_off(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>> {
        self.record(Call::PowerOff(drive));
        Box::pin(async move { self.enter("power_off").await })
    }

    fn changes(&self, path: String) -> BoxFuture<'_, Result<ChangeStream, BusError>> {
        self.record(Call::Changes(path));
        Box::pin(async move {
            let (sender, receiver) = mpsc::unbounded_channel();
            self.watchers.lock().unwrap().push(sender);
            let stream = futures::stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|()| ((), receiver))
            });
            Ok(stream.boxed())
        })
    }
}

/// Prompt that answers every request with a fixed reply, or fails.
pub(crate) struct FakePrompt {
    reply: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl FakePrompt {
    pub fn replying(passphrase: &str) -> Self {
        Self {
            reply: Some(passphrase.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PassphrasePrompt for FakePrompt {
    async fn request_passphrase(&self, udi: &str) -> Result<String, PromptError> {
        self.requests.lock().unwrap().push(udi.to_string());
        self.reply
            .clone()
            .ok_or_else(|| PromptError::Unavailable("org.kde.kded5 is not running".into()))
    }
}

/// Collects events up to and including the next setup/teardown completion.
pub(crate) async fn events_until_done(
    receiver: &mut broadcast::Receiver<StorageEvent>,
) -> Vec<StorageEvent> {
    let collect = async {
        let mut events = Vec::new();
        loop {
            let event = receiver.recv().await.expect("event channel open");
            let done = matches!(
                event,
                StorageEvent::SetupDone { .. } | StorageEvent::TeardownDone { .. }
            );
            events.push(event);
            if done {
                return events;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("operation should complete")
}

/// Yields until `pred` matches a recorded call; detached calls land a little later.
pub(crate) async fn wait_for_call(backend: &FakeBackend, pred: impl Fn(&Call) -> bool) {
    let wait = async {
        while backend.count(&pred) == 0 {
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("call should be issued");
}

/// Two ends of an in-process peer-to-peer bus connection; the first one serves.
pub(crate) async fn peer_pair() -> (zbus::Connection, zbus::Connection) {
    let guid = zbus::Guid::generate();
    let (server, client) = std::os::unix::net::UnixStream::pair().expect("socket pair");

    let server = zbus::connection::Builder::async_io_unix_stream(server)
        .server(guid)
        .expect("valid guid")
        .p2p()
        .build();
    let client = zbus::connection::Builder::async_io_unix_stream(client)
        .p2p()
        .build();

    futures::try_join!(server, client).expect("peer connection")
}
