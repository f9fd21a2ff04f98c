// SPDX-License-Identifier: GPL-3.0-only

//! Storage-access device interface over UDisks2.
//!
//! [`StorageAccess`] drives the mount/unmount/unlock/lock lifecycle of one block
//! device and reports outcomes as [`StorageEvent`]s. All remote calls go through
//! the [`UDisksBackend`] seam; [`RealUDisksBackend`] talks to the system bus.

mod access;
mod backend;
mod device;
mod manager;
mod policy;
mod prompt;

#[cfg(test)]
pub(crate) mod fake;

pub use access::{AccessSettings, StorageAccess, UNMOUNT_TIMEOUT};
pub use backend::{ChangeStream, MountOptions, RealUDisksBackend, UDisksBackend};
pub use device::UDisksDevice;
pub use manager::{UDisks2ManagerProxy, list_storage_devices, storage_device_info};
pub use policy::{is_in_user_path, shortest_mount_point};
pub use prompt::{DbusPassphrasePrompt, PromptSettings, generate_return_object_path};

pub use devhal_contracts::{HalError, HalErrorKind, StorageEvent};

pub const UD2_DBUS_SERVICE: &str = "org.freedesktop.UDisks2";
pub const UD2_DBUS_INTERFACE_BLOCK: &str = "org.freedesktop.UDisks2.Block";
pub const UD2_DBUS_INTERFACE_FILESYSTEM: &str = "org.freedesktop.UDisks2.Filesystem";
pub const UD2_DBUS_INTERFACE_ENCRYPTED: &str = "org.freedesktop.UDisks2.Encrypted";
pub const UD2_DBUS_INTERFACE_DRIVE: &str = "org.freedesktop.UDisks2.Drive";
pub const UD2_DBUS_PATH_BLOCKDEVICES: &str = "/org/freedesktop/UDisks2/block_devices";

/// Interfaces whose properties make up a device's cache.
pub(crate) const UD2_DEVICE_INTERFACES: [&str; 7] = [
    UD2_DBUS_INTERFACE_BLOCK,
    UD2_DBUS_INTERFACE_FILESYSTEM,
    UD2_DBUS_INTERFACE_ENCRYPTED,
    "org.freedesktop.UDisks2.Partition",
    "org.freedesktop.UDisks2.PartitionTable",
    "org.freedesktop.UDisks2.Loop",
    UD2_DBUS_INTERFACE_DRIVE,
];
