// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use devhal_contracts::{HalError, PassphrasePrompt};
use devhal_types::StorageDeviceInfo;
use devhal_udisks::{
    DbusPassphrasePrompt, RealUDisksBackend, StorageAccess, StorageEvent, UDisksBackend,
    list_storage_devices, storage_device_info,
};
use tokio::sync::broadcast;

use super::storage_udi;
use crate::config::Config;
use crate::prompt::StdinPrompt;

async fn backend() -> Result<Arc<dyn UDisksBackend>> {
    let backend = RealUDisksBackend::system()
        .await
        .context("connecting to UDisks2 on the system bus")?;
    Ok(Arc::new(backend))
}

async fn prompt(config: &Config, stdin: bool) -> Result<Arc<dyn PassphrasePrompt>> {
    if stdin {
        return Ok(Arc::new(StdinPrompt));
    }
    let prompt = DbusPassphrasePrompt::session(config.prompt_settings())
        .await
        .context("connecting to the session bus for the passphrase dialog")?;
    Ok(Arc::new(prompt))
}

pub async fn list(config: &Config, all: bool, json: bool) -> Result<()> {
    let backend = backend().await?;
    let no_prompt: Arc<dyn PassphrasePrompt> = Arc::new(StdinPrompt);

    let mut infos = Vec::new();
    for udi in list_storage_devices(backend.as_ref()).await? {
        let access = StorageAccess::new(
            backend.clone(),
            udi.clone(),
            no_prompt.clone(),
            config.access_settings(),
        )
        .await;
        match storage_device_info(&access).await {
            Ok(info) if all || !info.ignored => infos.push(info),
            Ok(_) => {}
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

fn format_row(info: &StorageDeviceInfo) -> String {
    let mut flags = Vec::new();
    if info.encrypted {
        flags.push("encrypted");
    }
    if info.accessible {
        flags.push("accessible");
    }
    if info.ignored {
        flags.push("ignored");
    }

    format!(
        "{}\t{}\t{}",
        info.udi,
        info.file_path.as_deref().unwrap_or("-"),
        flags.join(",")
    )
}

/// Waits for the completion event of the operation just requested.
async fn completion(events: &mut broadcast::Receiver<StorageEvent>) -> Result<Result<(), HalError>> {
    loop {
        match events.recv().await {
            Ok(StorageEvent::SetupDone { result, .. } | StorageEvent::TeardownDone { result, .. }) => {
                return Ok(result);
            }
            Ok(event) => tracing::debug!("{event:?}"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Missed {n} storage events")
            }
            Err(broadcast::error::RecvError::Closed) => bail!("storage event channel closed"),
        }
    }
}

pub async fn mount(config: &Config, udi: &str, stdin_passphrase: bool) -> Result<()> {
    let backend = backend().await?;
    let prompt = prompt(config, stdin_passphrase).await?;
    let access =
        StorageAccess::new(backend, storage_udi(udi), prompt, config.access_settings()).await;

    let mut events = access.subscribe();
    if !access.setup() {
        bail!("{} is busy", access.udi());
    }

    if let Err(e) = completion(&mut events).await? {
        bail!("mounting {} failed ({:?}): {}", access.udi(), e.kind, e.message);
    }

    match access.file_path().await? {
        Some(path) => println!("{path}"),
        None => println!("{} is set up", access.udi()),
    }
    Ok(())
}

pub async fn unmount(config: &Config, udi: &str) -> Result<()> {
    let backend = backend().await?;
    let prompt: Arc<dyn PassphrasePrompt> = Arc::new(StdinPrompt);
    let access =
        StorageAccess::new(backend, storage_udi(udi), prompt, config.access_settings()).await;

    let mut events = access.subscribe();
    if !access.teardown() {
        bail!("{} is busy", access.udi());
    }

    if let Err(e) = completion(&mut events).await? {
        bail!("unmounting {} failed ({:?}): {}", access.udi(), e.kind, e.message);
    }
    access.wait_for_drive_release().await;

    println!("{} can be removed safely", access.udi());
    Ok(())
}
