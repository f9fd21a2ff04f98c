// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use devhal_contracts::{BusError, PropertyCache};
use devhal_types::StorageDeviceInfo;
use tracing::debug;
use zbus::zvariant::{self, Value};
use zbus::proxy;

use crate::{StorageAccess, UD2_DBUS_INTERFACE_ENCRYPTED, UD2_DBUS_INTERFACE_FILESYSTEM, UDisksBackend};

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2/Manager",
    interface = "org.freedesktop.UDisks2.Manager"
)]
pub trait UDisks2Manager {
    fn get_block_devices(
        &self,
        options: HashMap<String, Value<'_>>,
    ) -> zbus::Result<Vec<zvariant::OwnedObjectPath>>;
}

/// Block devices that can act as storage-access devices: mountable
/// filesystems and encrypted containers.
pub async fn list_storage_devices(backend: &dyn UDisksBackend) -> Result<Vec<String>, BusError> {
    let mut out = Vec::new();

    for path in backend.block_devices().await? {
        let properties = match backend.properties(path.clone()).await {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping {path}: {e}");
                continue;
            }
        };

        let mut cache = PropertyCache::new();
        cache.populate(properties);
        if cache.has_interface(UD2_DBUS_INTERFACE_FILESYSTEM)
            || cache.has_interface(UD2_DBUS_INTERFACE_ENCRYPTED)
        {
            out.push(path);
        }
    }

    Ok(out)
}

/// Snapshot of one storage-access device for listings.
pub async fn storage_device_info(access: &StorageAccess) -> Result<StorageDeviceInfo, BusError> {
    Ok(StorageDeviceInfo {
        udi: access.udi().to_string(),
        encrypted: access.is_encrypted().await?,
        accessible: access.is_accessible().await?,
        file_path: access.file_path().await?,
        ignored: access.is_ignored().await?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::{FakeBackend, FakePrompt};
    use crate::AccessSettings;

    #[tokio::test]
    async fn lists_filesystems_and_containers_only() {
        let backend = FakeBackend::new()
            .with_filesystem("/org/freedesktop/UDisks2/block_devices/sda1", &[], "ext4")
            .with_encrypted("/org/freedesktop/UDisks2/block_devices/sda2")
            .with_block("/org/freedesktop/UDisks2/block_devices/sda");

        let mut listed = list_storage_devices(&backend).await.expect("list");
        listed.sort();
        assert_eq!(
            listed,
            vec![
                "/org/freedesktop/UDisks2/block_devices/sda1".to_string(),
                "/org/freedesktop/UDisks2/block_devices/sda2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn info_snapshot_reports_path_and_ignore_state() {
        let udi = "/org/freedesktop/UDisks2/block_devices/sdb1";
        let backend = Arc::new(FakeBackend::new().with_filesystem(
            udi,
            &["/run/media/me/STICK"],
            "vfat",
        ));
        let access = StorageAccess::new(
            backend,
            udi,
            Arc::new(FakePrompt::replying("")),
            AccessSettings::default(),
        )
        .await;

        let info = storage_device_info(&access).await.expect("info");
        assert_eq!(info.udi, udi);
        assert!(!info.encrypted);
        assert!(info.accessible);
        assert_eq!(info.file_path.as_deref(), Some("/run/media/me/STICK"));
        assert!(!info.ignored);
    }
}
