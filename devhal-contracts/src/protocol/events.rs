// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use super::error::HalError;

/// Notifications emitted by a storage-access adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StorageEvent {
    SetupRequested {
        udi: String,
    },
    SetupDone {
        udi: String,
        result: Result<(), HalError>,
    },
    TeardownRequested {
        udi: String,
    },
    TeardownDone {
        udi: String,
        result: Result<(), HalError>,
    },
    AccessibilityChanged {
        udi: String,
        accessible: bool,
    },
}

impl StorageEvent {
    pub fn udi(&self) -> &str {
        match self {
            Self::SetupRequested { udi }
            | Self::SetupDone { udi, .. }
            | Self::TeardownRequested { udi }
            | Self::TeardownDone { udi, .. }
            | Self::AccessibilityChanged { udi, .. } => udi,
        }
    }
}

/// Notifications emitted by a power-device adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PowerEvent {
    Changed { udi: String },
}
