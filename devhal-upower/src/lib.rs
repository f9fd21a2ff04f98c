// SPDX-License-Identifier: GPL-3.0-only

//! Power-device interface over UPower.
//!
//! [`UPowerDevice`] answers property queries from a wholesale-invalidated cache
//! and reports changes, including the refresh after a system resume, as
//! [`PowerEvent`]s.

mod backend;
mod battery;
mod device;

#[cfg(test)]
pub(crate) mod fake;

pub use backend::{
    Login1ManagerProxy, PowerSignal, RealUPowerBackend, SignalStream, SleepStream,
    UPowerBackend, UPowerDeviceProxy, UPowerProxy,
};
pub use battery::battery_info;
pub use device::{UPowerDevice, enumerate_devices};

pub use devhal_contracts::PowerEvent;

pub const UP_DBUS_SERVICE: &str = "org.freedesktop.UPower";
pub const UP_DBUS_INTERFACE_DEVICE: &str = "org.freedesktop.UPower.Device";
pub const UP_UDI_PREFIX: &str = "/org/freedesktop/UPower";
