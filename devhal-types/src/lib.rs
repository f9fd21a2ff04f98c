// SPDX-License-Identifier: GPL-3.0-only

//! Data models shared by the devhal backends and their front ends.

pub mod bytestring;
pub mod interface;
pub mod power;
pub mod property;
pub mod storage;

pub use bytestring::decode_mount_points;
pub use interface::DeviceInterfaceType;
pub use power::{BatteryInfo, BatteryState, BatteryTechnology, DeviceKind, PowerDeviceInfo};
pub use property::{ObjectProperties, PropValue, PropertyMap};
pub use storage::StorageDeviceInfo;
