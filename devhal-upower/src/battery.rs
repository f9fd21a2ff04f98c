// SPDX-License-Identifier: GPL-3.0-only

use devhal_types::{BatteryInfo, BatteryState, BatteryTechnology, PropValue, PropertyMap};

/// Reads the battery view out of a device's `org.freedesktop.UPower.Device`
/// properties. Missing values read as zero, false or empty.
pub fn battery_info(props: &PropertyMap) -> BatteryInfo {
    let float = |key: &str| props.get(key).and_then(PropValue::as_f64).unwrap_or(0.0);
    let flag = |key: &str| props.get(key).and_then(PropValue::as_bool).unwrap_or(false);
    let unsigned = |key: &str| props.get(key).and_then(PropValue::as_u32).unwrap_or(0);
    let seconds = |key: &str| props.get(key).and_then(PropValue::as_i64).unwrap_or(0);

    BatteryInfo {
        present: flag("IsPresent"),
        rechargeable: flag("IsRechargeable"),
        percentage: float("Percentage"),
        state: BatteryState::from_raw(unsigned("State")),
        technology: BatteryTechnology::from_raw(unsigned("Technology")),
        energy: float("Energy"),
        energy_full: float("EnergyFull"),
        energy_full_design: float("EnergyFullDesign"),
        energy_rate: float("EnergyRate"),
        voltage: float("Voltage"),
        capacity: float("Capacity"),
        time_to_empty: seconds("TimeToEmpty"),
        time_to_full: seconds("TimeToFull"),
        serial: props
            .get("Serial")
            .and_then(PropValue::as_str)
            .unwrap_or_default(),
    }
}
