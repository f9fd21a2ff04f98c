// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use devhal_contracts::{BusError, dbus};
use devhal_types::PropertyMap;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use zbus::Connection;
use zbus::proxy;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::{UP_DBUS_INTERFACE_DEVICE, UP_DBUS_SERVICE};

#[proxy(
    interface = "org.freedesktop.UPower",
    default_service = "org.freedesktop.UPower",
    default_path = "/org/freedesktop/UPower"
)]
pub trait UPower {
    fn enumerate_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.UPower.Device",
    default_service = "org.freedesktop.UPower"
)]
pub trait UPowerDevice {
    fn refresh(&self) -> zbus::Result<()>;

    /// Emitted by UPower releases before 0.99.
    #[zbus(signal)]
    fn changed(&self) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
pub trait Login1Manager {
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// Change notifications for one power device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerSignal {
    PropertiesChanged { interface: String },
    Changed,
}

pub type SignalStream = BoxStream<'static, PowerSignal>;

/// `PrepareForSleep` arguments: `true` going down, `false` resuming.
pub type SleepStream = BoxStream<'static, bool>;

pub trait UPowerBackend: Send + Sync {
    /// Full property set of the object's `org.freedesktop.UPower.Device` interface.
    fn properties(&self, path: String) -> BoxFuture<'_, Result<PropertyMap, BusError>>;

    fn refresh(&self, path: String) -> BoxFuture<'_, Result<(), BusError>>;

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>>;

    fn signals(&self, path: String) -> BoxFuture<'_, Result<SignalStream, BusError>>;

    fn sleep_signals(&self) -> BoxFuture<'_, Result<SleepStream, BusError>>;
}

#[derive(Clone)]
pub struct RealUPowerBackend {
    connection: Connection,
}

impl RealUPowerBackend {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub async fn system() -> Result<Self, BusError> {
        Ok(Self::new(Connection::system().await?))
    }

    async fn device_proxy(&self, path: String) -> Result<UPowerDeviceProxy<'_>, BusError> {
        Ok(UPowerDeviceProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?)
    }
}

impl UPowerBackend for RealUPowerBackend {
    fn properties(&self, path: String) -> BoxFuture<'_, Result<PropertyMap, BusError>> {
        Box::pin(async move {
            let proxy = zbus::Proxy::new(
                &self.connection,
                UP_DBUS_SERVICE,
                path,
                "org.freedesktop.DBus.Properties",
            )
            .await?;
            let raw: HashMap<String, OwnedValue> =
                proxy.call("GetAll", &(UP_DBUS_INTERFACE_DEVICE,)).await?;
            Ok(dbus::property_map(raw))
        })
    }

    fn refresh(&self, path: String) -> BoxFuture<'_, Result<(), BusError>> {
        Box::pin(async move {
            self.device_proxy(path).await?.refresh().await?;
            Ok(())
        })
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<String>, BusError>> {
        Box::pin(async move {
            let upower = UPowerProxy::new(&self.connection).await?;
            let devices = upower.enumerate_devices().await?;
            Ok(devices.into_iter().map(|p| p.to_string()).collect())
        })
    }

    fn signals(&self, path: String) -> BoxFuture<'_, Result<SignalStream, BusError>> {
        Box::pin(async move {
            let properties = zbus::fdo::PropertiesProxy::builder(&self.connection)
                .destination(UP_DBUS_SERVICE)?
                .path(path.clone())?
                .build()
                .await?;
            let properties_changed = properties
                .receive_properties_changed()
                .await?
                .filter_map(|signal| async move {
                    let args = signal.args().ok()?;
                    Some(PowerSignal::PropertiesChanged {
                        interface: args.interface_name().to_string(),
                    })
                });

            let legacy = self
                .device_proxy(path)
                .await?
                .receive_changed()
                .await?
                .map(|_| PowerSignal::Changed);

            Ok(futures::stream::select(properties_changed, legacy).boxed())
        })
    }

    fn sleep_signals(&self) -> BoxFuture<'_, Result<SleepStream, BusError>> {
        Box::pin(async move {
            let login1 = Login1ManagerProxy::new(&self.connection).await?;
            let stream = login1
                .receive_prepare_for_sleep()
                .await?
                .filter_map(|signal| async move { signal.args().ok().map(|args| *args.start()) });
            Ok(stream.boxed())
        })
    }
}
