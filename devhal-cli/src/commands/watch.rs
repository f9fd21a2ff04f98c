// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use anyhow::{Context, Result};
use devhal_contracts::PassphrasePrompt;
use devhal_udisks::{RealUDisksBackend, StorageAccess, UDisksBackend, list_storage_devices};
use devhal_upower::{RealUPowerBackend, UPowerBackend, UPowerDevice, enumerate_devices};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::prompt::StdinPrompt;

/// Logs every event of one channel until it closes.
fn relay_events<T>(tasks: &mut JoinSet<()>, mut events: broadcast::Receiver<T>)
where
    T: Clone + std::fmt::Debug + Send + 'static,
{
    tasks.spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!("{event:?}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {n} events")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn watch_storage(config: &Config, tasks: &mut JoinSet<()>) -> Result<Vec<StorageAccess>> {
    let backend: Arc<dyn UDisksBackend> = Arc::new(
        RealUDisksBackend::system()
            .await
            .context("connecting to UDisks2 on the system bus")?,
    );
    let prompt: Arc<dyn PassphrasePrompt> = Arc::new(StdinPrompt);

    let mut watched = Vec::new();
    for udi in list_storage_devices(backend.as_ref()).await? {
        let access =
            StorageAccess::new(backend.clone(), udi.clone(), prompt.clone(), config.access_settings())
                .await;
        relay_events(tasks, access.subscribe());
        match access.spawn_change_relay().await {
            Ok(_) => watched.push(access),
            Err(e) => tracing::warn!("Cannot follow changes of {udi}: {e}"),
        }
    }
    Ok(watched)
}

async fn watch_power(tasks: &mut JoinSet<()>) -> Result<Vec<UPowerDevice>> {
    let backend: Arc<dyn UPowerBackend> = Arc::new(
        RealUPowerBackend::system()
            .await
            .context("connecting to UPower on the system bus")?,
    );

    let mut watched = Vec::new();
    for udi in enumerate_devices(backend.as_ref()).await? {
        let device = UPowerDevice::new(backend.clone(), udi.clone());
        relay_events(tasks, device.subscribe());
        if let Err(e) = device.spawn_change_relay().await {
            tracing::warn!("Cannot follow changes of {udi}: {e}");
        }
        if let Err(e) = device.spawn_sleep_relay().await {
            tracing::warn!("Cannot follow login1 sleep signals for {udi}: {e}");
        }
        watched.push(device);
    }
    Ok(watched)
}

pub async fn run(config: &Config) -> Result<()> {
    let mut tasks = JoinSet::new();

    let storage = match watch_storage(config, &mut tasks).await {
        Ok(watched) => watched,
        Err(e) => {
            tracing::warn!("Storage devices unavailable: {e:#}");
            Vec::new()
        }
    };
    let power = match watch_power(&mut tasks).await {
        Ok(watched) => watched,
        Err(e) => {
            tracing::warn!("Power devices unavailable: {e:#}");
            Vec::new()
        }
    };

    tracing::info!(
        "Watching {} storage and {} power devices, Ctrl-C to stop",
        storage.len(),
        power.len()
    );
    tokio::signal::ctrl_c().await?;

    tasks.shutdown().await;
    Ok(())
}
