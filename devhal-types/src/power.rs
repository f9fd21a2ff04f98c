// SPDX-License-Identifier: GPL-3.0-only

//! UPower device classification.

use serde::{Deserialize, Serialize};

/// `Type` property of `org.freedesktop.UPower.Device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Unknown,
    LinePower,
    Battery,
    Ups,
    Monitor,
    Mouse,
    Keyboard,
    Pda,
    Phone,
    MediaPlayer,
    Tablet,
    Computer,
    GamingInput,
}

impl DeviceKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::LinePower,
            2 => Self::Battery,
            3 => Self::Ups,
            4 => Self::Monitor,
            5 => Self::Mouse,
            6 => Self::Keyboard,
            7 => Self::Pda,
            8 => Self::Phone,
            9 => Self::MediaPlayer,
            10 => Self::Tablet,
            11 => Self::Computer,
            12 => Self::GamingInput,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::LinePower => "line-power",
            Self::Battery => "battery",
            Self::Ups => "ups",
            Self::Monitor => "monitor",
            Self::Mouse => "mouse",
            Self::Keyboard => "keyboard",
            Self::Pda => "pda",
            Self::Phone => "phone",
            Self::MediaPlayer => "media-player",
            Self::Tablet => "tablet",
            Self::Computer => "computer",
            Self::GamingInput => "gaming-input",
        }
    }
}

/// `Technology` property of a UPower battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryTechnology {
    Unknown,
    LithiumIon,
    LithiumPolymer,
    LithiumIronPhosphate,
    LeadAcid,
    NickelCadmium,
    NickelMetalHydride,
}

impl BatteryTechnology {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::LithiumIon,
            2 => Self::LithiumPolymer,
            3 => Self::LithiumIronPhosphate,
            4 => Self::LeadAcid,
            5 => Self::NickelCadmium,
            6 => Self::NickelMetalHydride,
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LithiumIon => "Lithium Ion",
            Self::LithiumPolymer => "Lithium Polymer",
            Self::LithiumIronPhosphate => "Lithium Iron Phosphate",
            Self::LeadAcid => "Lead Acid",
            Self::NickelCadmium => "Nickel Cadmium",
            Self::NickelMetalHydride => "Nickel Metal Hydride",
            Self::Unknown => "Unknown",
        }
    }
}

/// `State` property of a UPower battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    Unknown,
    Charging,
    Discharging,
    Empty,
    FullyCharged,
    PendingCharge,
    PendingDischarge,
}

impl BatteryState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Charging,
            2 => Self::Discharging,
            3 => Self::Empty,
            4 => Self::FullyCharged,
            5 => Self::PendingCharge,
            6 => Self::PendingDischarge,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    pub present: bool,
    pub rechargeable: bool,
    pub percentage: f64,
    pub state: BatteryState,
    pub technology: BatteryTechnology,
    pub energy: f64,
    pub energy_full: f64,
    pub energy_full_design: f64,
    pub energy_rate: f64,
    pub voltage: f64,
    pub capacity: f64,
    /// Seconds; zero when unknown.
    pub time_to_empty: i64,
    pub time_to_full: i64,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDeviceInfo {
    pub udi: String,
    pub kind: DeviceKind,
    pub battery: bool,
    pub description: String,
    pub vendor: String,
    pub product: String,
    pub icon: String,
}
