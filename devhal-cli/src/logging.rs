// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_PREFIX: &str = "devhal.log";
const KEEP_DAYS: u64 = 7;
const CRATES: [&str; 5] = [
    "devhal",
    "devhal_udisks",
    "devhal_upower",
    "devhal_contracts",
    "devhal_types",
];

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level.as_directive();
        let mut filter = EnvFilter::new("warn");
        for krate in CRATES {
            match format!("{krate}={level}").parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("devhal: bad log directive for {krate}: {e}"),
            }
        }
        filter
    })
}

pub(crate) fn init(config: &LoggingConfig) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    if !config.log_to_disk {
        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(stdout_layer)
            .init();
        return;
    }

    match file_writer() {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_timer(tracing_subscriber::fmt::time::SystemTime);

            tracing_subscriber::registry()
                .with(env_filter(config))
                .with(stdout_layer)
                .with(file_layer)
                .init();

            // the non-blocking worker must live as long as the process
            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("devhal: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter(config))
                .with(stdout_layer)
                .init();
        }
    }
}

fn file_writer() -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = log_dir();
    fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("create log directory failed: {} ({e})", dir.display()))?;

    let prefix = OsString::from(LOG_PREFIX);
    cleanup_old_logs(&dir, &prefix, SystemTime::now());

    let appender = tracing_appender::rolling::daily(&dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("DEVHAL_LOG_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(xdg_state) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state).join("devhal").join("logs");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("devhal")
            .join("logs");
    }

    PathBuf::from("/tmp").join("devhal").join("logs")
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString, now: SystemTime) {
    let Some(cutoff) = now.checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60)) else {
        return;
    };
    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        // only files written by our rolling appender
        if !entry.file_name().to_string_lossy().starts_with(prefix.as_ref()) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified < cutoff {
            let _ = fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prunes_only_stale_appender_files() {
        let dir = std::env::temp_dir().join(format!("devhal-log-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("devhal.log.2020-01-01"), b"old").unwrap();
        fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let prefix = OsString::from(LOG_PREFIX);

        // fresh files survive
        cleanup_old_logs(&dir, &prefix, SystemTime::now());
        assert!(dir.join("devhal.log.2020-01-01").exists());

        let later = SystemTime::now() + Duration::from_secs((KEEP_DAYS + 1) * 24 * 60 * 60);
        cleanup_old_logs(&dir, &prefix, later);
        assert!(!dir.join("devhal.log.2020-01-01").exists());
        assert!(dir.join("notes.txt").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
