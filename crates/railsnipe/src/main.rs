// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Railsnipe - autonomous train seat reservation.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod vault;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use railsnipe_config::{ConfigError, RailsnipeConfig};
use railsnipe_core::{Provider, SessionStore};
use railsnipe_storage::SqliteStore;

/// Railsnipe - autonomous train seat reservation.
#[derive(Parser, Debug)]
#[command(name = "railsnipe", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reservation service.
    Serve,
    /// Remove expired session entries and lapsed claims, then exit.
    PurgeSessions,
    /// Load and validate configuration, then exit.
    CheckConfig,
    /// Manage stored provider logins and payment cards.
    Vault {
        #[command(subcommand)]
        action: VaultCommand,
    },
}

#[derive(Subcommand, Debug)]
enum VaultCommand {
    /// Store the provider login of a user. The password is read hidden.
    SetLogin {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        login_id: String,
    },
    /// Store the payment card of a user. Card fields are read hidden.
    SetCard {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: Provider,
    },
    /// Remove a stored login or card.
    Remove {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: Provider,
        /// Remove the card instead of the login.
        #[arg(long)]
        card: bool,
    },
    /// List stored entries with masked previews.
    List,
}

fn load_config(path: Option<&Path>) -> Result<RailsnipeConfig, Vec<ConfigError>> {
    match path {
        Some(path) => railsnipe_config::load_and_validate_path(path),
        None => railsnipe_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            railsnipe_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    serve::init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::PurgeSessions) => purge_sessions(&config).await,
        Some(Commands::CheckConfig) => {
            println!(
                "railsnipe: config OK (service.name={}, gateway.enabled={}, telegram.enabled={})",
                config.service.name, config.gateway.enabled, config.telegram.enabled
            );
            Ok(())
        }
        Some(Commands::Vault { action }) => vault::run(&config, action).await,
        None => {
            println!("railsnipe: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn purge_sessions(config: &RailsnipeConfig) -> Result<(), railsnipe_core::RailsnipeError> {
    let store = SqliteStore::open(&config.storage).await?;
    let purged = store.purge_expired().await?;
    println!("purged {purged} expired session entries");
    Ok(())
}
