// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Snapshot of a storage-access device, as listed by front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDeviceInfo {
    pub udi: String,
    pub encrypted: bool,
    pub accessible: bool,
    pub file_path: Option<String>,
    pub ignored: bool,
}
