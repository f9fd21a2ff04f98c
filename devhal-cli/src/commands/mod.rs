// SPDX-License-Identifier: GPL-3.0-only

pub mod power;
pub mod storage;
pub mod watch;

use devhal_udisks::UD2_DBUS_PATH_BLOCKDEVICES;
use devhal_upower::UP_UDI_PREFIX;

/// Accepts `sdb1` as shorthand for the full block-device object path.
pub(crate) fn storage_udi(arg: &str) -> String {
    if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{UD2_DBUS_PATH_BLOCKDEVICES}/{arg}")
    }
}

/// Accepts `battery_BAT0` as shorthand for the full UPower device path.
pub(crate) fn power_udi(arg: &str) -> String {
    if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{UP_UDI_PREFIX}/devices/{arg}")
    }
}
