// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use devhal_contracts::{BusError, CachedProperties, PowerEvent, PropertyCache};
use devhal_types::{
    BatteryInfo, BatteryTechnology, DeviceInterfaceType, DeviceKind, ObjectProperties, PropValue,
    PropertyMap, PowerDeviceInfo,
};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{PowerSignal, UP_DBUS_INTERFACE_DEVICE, UP_UDI_PREFIX, UPowerBackend, battery_info};

const EVENT_CAPACITY: usize = 16;
const BLUEZ_PREFIX: &str = "/org/bluez/";

struct DeviceInner {
    udi: String,
    backend: Arc<dyn UPowerBackend>,
    cache: CachedProperties,
    events: broadcast::Sender<PowerEvent>,
}

/// One UPower device object.
#[derive(Clone)]
pub struct UPowerDevice {
    inner: Arc<DeviceInner>,
}

/// Object paths of every device UPower knows about.
pub async fn enumerate_devices(backend: &dyn UPowerBackend) -> Result<Vec<String>, BusError> {
    backend.enumerate().await
}

impl UPowerDevice {
    pub fn new(backend: Arc<dyn UPowerBackend>, udi: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(DeviceInner {
                udi: udi.into(),
                backend,
                cache: CachedProperties::new(),
                events,
            }),
        }
    }

    pub fn udi(&self) -> &str {
        &self.inner.udi
    }

    pub fn parent_udi(&self) -> &'static str {
        UP_UDI_PREFIX
    }

    pub fn emblems(&self) -> Vec<String> {
        Vec::new()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.inner.events.subscribe()
    }

    async fn fetch(&self) -> Result<ObjectProperties, BusError> {
        let props = self.inner.backend.properties(self.inner.udi.clone()).await?;
        Ok(ObjectProperties::from([(
            UP_DBUS_INTERFACE_DEVICE.to_string(),
            props,
        )]))
    }

    async fn read<R>(&self, f: impl FnOnce(&PropertyCache) -> R) -> Result<R, BusError> {
        let cache = self.inner.cache.load(|| self.fetch()).await?;
        Ok(f(&cache))
    }

    pub async fn prop(&self, key: &str) -> Result<Option<PropValue>, BusError> {
        self.read(|cache| cache.get(key).cloned()).await
    }

    pub async fn property_exists(&self, key: &str) -> Result<bool, BusError> {
        self.read(|cache| cache.contains(key)).await
    }

    /// Refetches every property; a failed fetch leaves the cache empty.
    pub async fn all_properties(&self) -> Result<PropertyMap, BusError> {
        self.inner.cache.invalidate().await;
        self.read(PropertyCache::flattened).await
    }

    async fn string_prop(&self, key: &str) -> Result<String, BusError> {
        Ok(self
            .prop(key)
            .await?
            .and_then(|v| v.as_str())
            .unwrap_or_default())
    }

    async fn raw_kind(&self) -> Result<u32, BusError> {
        Ok(self.prop("Type").await?.and_then(|v| v.as_u32()).unwrap_or(0))
    }

    pub async fn kind(&self) -> Result<DeviceKind, BusError> {
        Ok(DeviceKind::from_raw(self.raw_kind().await?))
    }

    pub async fn query_device_interface(&self, ty: DeviceInterfaceType) -> Result<bool, BusError> {
        match ty {
            DeviceInterfaceType::Generic => Ok(true),
            DeviceInterfaceType::StorageAccess => Ok(false),
            DeviceInterfaceType::Battery => {
                let raw = self.raw_kind().await?;
                Ok(match DeviceKind::from_raw(raw) {
                DeviceKind::Battery
                | DeviceKind::Ups
                | DeviceKind::Mouse
                | DeviceKind::Keyboard
                | DeviceKind::Pda
                | DeviceKind::Phone
                | DeviceKind::GamingInput => true,
                    // no dedicated kind for Bluetooth batteries; kinds from newer
                    // UPower releases also read as unknown but are not batteries
                    DeviceKind::Unknown if raw == 0 => {
                        self.string_prop("NativePath").await?.starts_with(BLUEZ_PREFIX)
                    }
                    DeviceKind::Unknown
                    | DeviceKind::LinePower
                    | DeviceKind::Monitor
                    | DeviceKind::MediaPlayer
                    | DeviceKind::Tablet
                    | DeviceKind::Computer => false,
                })
            }
        }
    }

    async fn is_battery(&self) -> Result<bool, BusError> {
        self.query_device_interface(DeviceInterfaceType::Battery).await
    }

    pub async fn battery_technology(&self) -> Result<BatteryTechnology, BusError> {
        let raw = self
            .prop("Technology")
            .await?
            .and_then(|v| v.as_u32())
            .unwrap_or(0);
        Ok(BatteryTechnology::from_raw(raw))
    }

    pub async fn description(&self) -> Result<String, BusError> {
        if self.is_battery().await? {
            return Ok(format!("{} Battery", self.battery_technology().await?.name()));
        }

        let model = self.string_prop("Model").await?;
        if model.is_empty() {
            return self.vendor().await;
        }
        Ok(model)
    }

    pub async fn icon(&self) -> Result<String, BusError> {
        Ok(if self.is_battery().await? {
            "battery".to_string()
        } else {
            String::new()
        })
    }

    pub async fn product(&self) -> Result<String, BusError> {
        let model = self.string_prop("Model").await?;
        if model.is_empty() {
            return self.description().await;
        }
        Ok(model)
    }

    pub async fn vendor(&self) -> Result<String, BusError> {
        self.string_prop("Vendor").await
    }

    /// The battery view, for devices that expose one.
    pub async fn battery(&self) -> Result<Option<BatteryInfo>, BusError> {
        if !self.is_battery().await? {
            return Ok(None);
        }
        self.read(|cache| Some(battery_info(&cache.flattened()))).await
    }

    pub async fn info(&self) -> Result<PowerDeviceInfo, BusError> {
        Ok(PowerDeviceInfo {
            udi: self.udi().to_string(),
            kind: self.kind().await?,
            battery: self.is_battery().await?,
            description: self.description().await?,
            vendor: self.vendor().await?,
            product: self.product().await?,
            icon: self.icon().await?,
        })
    }

    /// Drops the cache and tells subscribers something changed.
    pub async fn changed(&self) {
        self.inner.cache.invalidate().await;
        if self
            .inner
            .events
            .send(PowerEvent::Changed {
                udi: self.inner.udi.clone(),
            })
            .is_err()
        {
            tracing::trace!("No listeners for {}", self.inner.udi);
        }
    }

    pub async fn on_properties_changed(&self, interface: &str) {
        if interface == UP_DBUS_INTERFACE_DEVICE {
            self.changed().await;
        }
    }

    /// UPower does not notice battery changes made while suspended.
    pub async fn handle_prepare_for_sleep(&self, active: bool) {
        if active {
            return;
        }

        match self.inner.backend.refresh(self.inner.udi.clone()).await {
            Ok(()) => self.changed().await,
            Err(e) => tracing::debug!("Refresh of {} after resume failed: {e}", self.inner.udi),
        }
    }

    async fn on_signal(&self, signal: PowerSignal) {
        match signal {
            PowerSignal::PropertiesChanged { interface } => {
                self.on_properties_changed(&interface).await
            }
            PowerSignal::Changed => self.changed().await,
        }
    }

    pub async fn spawn_change_relay(&self) -> Result<JoinHandle<()>, BusError> {
        let mut signals = self.inner.backend.signals(self.inner.udi.clone()).await?;
        let this = self.clone();

        Ok(tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                this.on_signal(signal).await;
            }
        }))
    }

    pub async fn spawn_sleep_relay(&self) -> Result<JoinHandle<()>, BusError> {
        let mut sleeps = self.inner.backend.sleep_signals().await?;
        let this = self.clone();

        Ok(tokio::spawn(async move {
            while let Some(active) = sleeps.next().await {
                this.handle_prepare_for_sleep(active).await;
            }
        }))
    }
}
