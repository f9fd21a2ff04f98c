// SPDX-License-Identifier: GPL-3.0-only

//! The remote-device seam between the storage adapter and UDisks2.

use std::collections::{BTreeMap, HashMap};

use devhal_contracts::{BusError, dbus};
use devhal_types::{ObjectProperties, PropValue};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::trace;
use udisks2::{drive::DriveProxy, encrypted::EncryptedProxy, filesystem::FilesystemProxy};
use zbus::Connection;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::manager::UDisks2ManagerProxy;
use crate::{UD2_DBUS_SERVICE, UD2_DEVICE_INTERFACES};

/// `a{sv}` options with string values, the only shape the storage calls need.
pub type MountOptions = BTreeMap<String, String>;

/// One item per change notification on a remote object.
pub type ChangeStream = BoxStream<'static, ()>;

pub trait UDisksBackend: Send + Sync {
    /// Full property set of an object, keyed by interface.
    fn properties(&self, path: String) -> BoxFuture<'_, Result<ObjectProperties, BusError>>;

    fn property(
        &self,
        path: String,
        interface: &'static str,
        name: &'static str,
    ) -> BoxFuture<'_, Result<PropValue, BusError>>;

    fn block_devices(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>>;

    /// Returns the mount path chosen by UDisks2.
    fn mount(&self, path: String, options: MountOptions) -> BoxFuture<'_, Result<String, BusError>>;
    fn unmount(&self, path: String) -> BoxFuture<'_, Result<(), BusError>>;

    /// Returns the object path of the cleartext device.
    fn unlock(&self, path: String, passphrase: String) -> BoxFuture<'_, Result<String, BusError>>;
    fn lock(&self, path: String) -> BoxFuture<'_, Result<(), BusError>>;

    fn eject(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>>;
    fn power_off(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>>;

    fn changes(&self, path: String) -> BoxFuture<'_, Result<ChangeStream, BusError>>;
}

#[derive(Clone)]
pub struct RealUDisksBackend {
    connection: Connection,
}

impl RealUDisksBackend {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub async fn system() -> Result<Self, BusError> {
        Ok(Self::new(Connection::system().await?))
    }

    async fn properties_proxy(&self, path: &str) -> Result<zbus::Proxy<'_>, BusError> {
        Ok(zbus::Proxy::new(
            &self.connection,
            UD2_DBUS_SERVICE,
            path.to_string(),
            "org.freedesktop.DBus.Properties",
        )
        .await?)
    }
}

fn no_options() -> HashMap<&'static str, Value<'static>> {
    HashMap::new()
}

// Storage calls go through the typed proxy's inner `zbus::Proxy`; a failed
// call then keeps both the UDisks2 error name and its message.
impl UDisksBackend for RealUDisksBackend {
    fn properties(&self, path: String) -> BoxFuture<'_, Result<ObjectProperties, BusError>> {
        Box::pin(async move {
            let proxy = self.properties_proxy(&path).await?;
            let mut out = ObjectProperties::new();
            let mut last_error = None;

            for interface in UD2_DEVICE_INTERFACES {
                let reply: zbus::Result<HashMap<String, OwnedValue>> =
                    proxy.call("GetAll", &(interface,)).await;
                match reply {
                    Ok(raw) => {
                        out.insert(interface.to_string(), dbus::property_map(raw));
                    }
                    Err(e) => {
                        trace!("{path} has no usable {interface}: {e}");
                        last_error = Some(BusError::from(e));
                    }
                }
            }

            match (out.is_empty(), last_error) {
                (true, Some(e)) => Err(e),
                _ => Ok(out),
            }
        })
    }

    fn property(
        &self,
        path: String,
        interface: &'static str,
        name: &'static str,
    ) -> BoxFuture<'_, Result<PropValue, BusError>> {
        Box::pin(async move {
            let proxy = self.properties_proxy(&path).await?;
            let value: OwnedValue = proxy.call("Get", &(interface, name)).await?;
            Ok(dbus::prop_value(&value))
        })
    }

    fn block_devices(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>> {
        Box::pin(async move {
            let manager = UDisks2ManagerProxy::new(&self.connection).await?;
            let paths = manager.get_block_devices(HashMap::new()).await?;
            Ok(paths.into_iter().map(|p| p.to_string()).collect())
        })
    }

    fn mount(&self, path: String, options: MountOptions) -> BoxFuture<'_, Result<String, BusError>> {
        Box::pin(async move {
            let proxy = FilesystemProxy::builder(&self.connection)
                .path(path)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;

            let opts: HashMap<&str, Value<'_>> = options
                .iter()
                .map(|(k, v)| (k.as_str(), Value::from(v.as_str())))
                .collect();

            Ok(proxy.inner().call("Mount", &(opts,)).await?)
        })
    }

    fn unmount(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        Box::pin(async move {
            let proxy = FilesystemProxy::builder(&self.connection)
                .path(path)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;
            Ok(proxy.inner().call("Unmount", &(no_options(),)).await?)
        })
    }

    fn unlock(&self, path: String, passphrase: String) -> BoxFuture<'_, Result<String, BusError>> {
        Box::pin(async move {
            let proxy = EncryptedProxy::builder(&self.connection)
                .path(path)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;
            let cleartext: OwnedObjectPath = proxy
                .inner()
                .call("Unlock", &(passphrase.as_str(), no_options()))
                .await?;
            Ok(cleartext.to_string())
        })
    }

    fn lock(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        Box::pin(async move {
            let proxy = EncryptedProxy::builder(&self.connection)
                .path(path)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;
            Ok(proxy.inner().call("Lock", &(no_options(),)).await?)
        })
    }

    fn eject(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>> {
        Box::pin(async move {
            let proxy = DriveProxy::builder(&self.connection)
                .path(drive)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;
            Ok(proxy.inner().call("Eject", &(no_options(),)).await?)
        })
    }

    fn power_off(&self, drive: String) -> BoxFuture<'_, Result<(), BusError>> {
        Box::pin(async move {
            let proxy = DriveProxy::builder(&self.connection)
                .path(drive)?
                .cache_properties(CacheProperties::No)
                .build()
                .await?;
            Ok(proxy.inner().call("PowerOff", &(no_options(),)).await?)
        })
    }

    fn changes(&self, path: String) -> BoxFuture<'_, Result<ChangeStream, BusError>> {
        Box::pin(async move {
            let proxy = zbus::fdo::PropertiesProxy::builder(&self.connection)
                .destination(UD2_DBUS_SERVICE)?
                .path(path)?
                .build()
                .await?;
            let stream = proxy.receive_properties_changed().await?;
            Ok(stream.map(|_| ()).boxed())
        })
    }
}
