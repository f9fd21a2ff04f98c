// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use anyhow::{Context, Result};
use devhal_types::{BatteryInfo, PowerDeviceInfo, PropertyMap};
use devhal_upower::{RealUPowerBackend, UPowerBackend, UPowerDevice, enumerate_devices};
use serde::Serialize;

use super::power_udi;

async fn backend() -> Result<Arc<dyn UPowerBackend>> {
    let backend = RealUPowerBackend::system()
        .await
        .context("connecting to UPower on the system bus")?;
    Ok(Arc::new(backend))
}

pub async fn list(json: bool) -> Result<()> {
    let backend = backend().await?;

    let mut infos = Vec::new();
    for udi in enumerate_devices(backend.as_ref()).await? {
        match UPowerDevice::new(backend.clone(), udi.clone()).info().await {
            Ok(info) => infos.push(info),
            Err(e) => tracing::warn!("Skipping {udi}: {e}"),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for info in &infos {
            println!("{}", format_row(info));
        }
    }
    Ok(())
}

fn format_row(info: &PowerDeviceInfo) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        info.udi,
        info.kind.as_str(),
        if info.battery { "battery" } else { "-" },
        info.description
    )
}

#[derive(Debug, Serialize)]
struct DeviceReport {
    #[serde(flatten)]
    info: PowerDeviceInfo,
    parent_udi: String,
    properties: PropertyMap,
    battery_info: Option<BatteryInfo>,
}

pub async fn show(udi: &str, json: bool) -> Result<()> {
    let backend = backend().await?;
    let device = UPowerDevice::new(backend, power_udi(udi));

    let report = DeviceReport {
        info: device.info().await?,
        parent_udi: device.parent_udi().to_string(),
        properties: device.all_properties().await?,
        battery_info: device.battery().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format_row(&report.info));
    println!("  parent: {}", report.parent_udi);
    println!("  vendor: {}", report.info.vendor);
    println!("  product: {}", report.info.product);
    for (key, value) in &report.properties {
        println!("  {key}: {}", serde_json::to_string(value)?);
    }
    Ok(())
}
