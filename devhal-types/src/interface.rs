// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Capability interfaces a backend device may expose to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceInterfaceType {
    Generic,
    StorageAccess,
    Battery,
}
