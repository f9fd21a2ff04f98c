// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use devhal_contracts::{BusError, CachedProperties, PropertyCache};
use devhal_types::PropValue;
use tracing::debug;

use crate::{
    UD2_DBUS_INTERFACE_BLOCK, UD2_DBUS_INTERFACE_ENCRYPTED, UD2_DBUS_INTERFACE_FILESYSTEM,
    UDisksBackend,
};

/// One UDisks2 object with a lazily filled, wholesale-invalidated property cache.
pub struct UDisksDevice {
    udi: String,
    backend: Arc<dyn UDisksBackend>,
    cache: CachedProperties,
}

impl UDisksDevice {
    pub fn new(backend: Arc<dyn UDisksBackend>, udi: impl Into<String>) -> Self {
        Self {
            udi: udi.into(),
            backend,
            cache: CachedProperties::new(),
        }
    }

    pub fn udi(&self) -> &str {
        &self.udi
    }

    pub fn backend(&self) -> &Arc<dyn UDisksBackend> {
        &self.backend
    }

    async fn read<R>(&self, f: impl FnOnce(&PropertyCache) -> R) -> Result<R, BusError> {
        let cache = self
            .cache
            .load(|| self.backend.properties(self.udi.clone()))
            .await?;
        Ok(f(&cache))
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    pub async fn prop(&self, key: &str) -> Result<Option<PropValue>, BusError> {
        self.read(|cache| cache.get(key).cloned()).await
    }

    pub async fn property_exists(&self, key: &str) -> Result<bool, BusError> {
        self.read(|cache| cache.contains(key)).await
    }

    pub async fn has_interface(&self, interface: &str) -> Result<bool, BusError> {
        self.read(|cache| cache.has_interface(interface)).await
    }

    pub async fn is_encrypted_container(&self) -> Result<bool, BusError> {
        self.has_interface(UD2_DBUS_INTERFACE_ENCRYPTED).await
    }

    pub async fn mount_points(&self) -> Result<Vec<String>, BusError> {
        self.read(|cache| {
            cache
                .get_in(UD2_DBUS_INTERFACE_FILESYSTEM, "MountPoints")
                .map(PropValue::as_bytestring_list)
                .unwrap_or_default()
        })
        .await
    }

    pub async fn is_mounted(&self) -> Result<bool, BusError> {
        Ok(!self.mount_points().await?.is_empty())
    }

    /// Parent drive object, `None` for the null path.
    pub async fn drive_path(&self) -> Result<Option<String>, BusError> {
        self.read(|cache| {
            cache
                .get_in(UD2_DBUS_INTERFACE_BLOCK, "Drive")
                .and_then(PropValue::as_object_path)
        })
        .await
    }

    /// The encrypted container this device is the cleartext of, if any.
    pub async fn crypto_backing_device(&self) -> Result<Option<String>, BusError> {
        self.read(|cache| {
            cache
                .get_in(UD2_DBUS_INTERFACE_BLOCK, "CryptoBackingDevice")
                .and_then(PropValue::as_object_path)
        })
        .await
    }

    pub async fn id_type(&self) -> Result<String, BusError> {
        self.read(|cache| {
            cache
                .get_in(UD2_DBUS_INTERFACE_BLOCK, "IdType")
                .and_then(PropValue::as_str)
                .unwrap_or_default()
        })
        .await
    }

    pub async fn hint_ignore(&self) -> Result<bool, BusError> {
        self.read(|cache| {
            cache
                .get_in(UD2_DBUS_INTERFACE_BLOCK, "HintIgnore")
                .and_then(PropValue::as_bool)
                .unwrap_or(false)
        })
        .await
    }

    /// Optical drives carry their own eject mechanism; the parent drive decides.
    pub async fn is_optical_disc(&self) -> Result<bool, BusError> {
        let Some(drive) = self.drive_path().await? else {
            return Ok(false);
        };

        let drive = UDisksDevice::new(self.backend.clone(), drive);
        Ok(drive
            .prop("Optical")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Finds the unlocked cleartext device of this container.
    ///
    /// UDisks2 offers no reverse link, so every block device is asked for its
    /// `CryptoBackingDevice`. The answer is never cached.
    pub async fn cleartext_device(&self) -> Result<Option<String>, BusError> {
        for path in self.backend.block_devices().await? {
            match self
                .backend
                .property(path.clone(), UD2_DBUS_INTERFACE_BLOCK, "CryptoBackingDevice")
                .await
            {
                Ok(value) if value.as_object_path().as_deref() == Some(self.udi.as_str()) => {
                    return Ok(Some(path));
                }
                Ok(_) => {}
                Err(e) => debug!("Could not read CryptoBackingDevice of {path}: {e}"),
            }
        }

        Ok(None)
    }
}
