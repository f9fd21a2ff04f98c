// SPDX-License-Identifier: GPL-3.0-only

//! `devhal` - inspect and drive storage and power devices through UDisks2 and
//! UPower.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;
mod prompt;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "devhal")]
#[command(about = "Storage and power devices over UDisks2 and UPower", version)]
struct Cli {
    /// Configuration file, instead of $XDG_CONFIG_HOME/devhal/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mountable filesystems and encrypted containers
    Storage {
        #[command(subcommand)]
        command: StorageCommand,
    },
    /// Batteries, line power and peripherals
    Power {
        #[command(subcommand)]
        command: PowerCommand,
    },
    /// Log device changes until interrupted
    Watch,
}

#[derive(Debug, Subcommand)]
enum StorageCommand {
    List {
        /// Include devices hidden from users
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    Mount {
        udi: String,
        /// Read the passphrase from standard input instead of the desktop dialog
        #[arg(long)]
        stdin_passphrase: bool,
    },
    Unmount {
        udi: String,
    },
}

#[derive(Debug, Subcommand)]
enum PowerCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Show {
        udi: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging);

    tracing::debug!("devhal v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Storage { command } => match command {
            StorageCommand::List { all, json } => commands::storage::list(&config, all, json).await,
            StorageCommand::Mount {
                udi,
                stdin_passphrase,
            } => commands::storage::mount(&config, &udi, stdin_passphrase).await,
            StorageCommand::Unmount { udi } => commands::storage::unmount(&config, &udi).await,
        },
        Command::Power { command } => match command {
            PowerCommand::List { json } => commands::power::list(json).await,
            PowerCommand::Show { udi, json } => commands::power::show(&udi, json).await,
        },
        Command::Watch => commands::watch::run(&config).await,
    }
}
