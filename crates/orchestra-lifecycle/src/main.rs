// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestra - workshop instance lifecycle CLI
//!
//! - `serve`: run the background reaper until Ctrl-C
//! - `create` / `ready` / `delete` / `status`: one-shot instance operations
//! - `reap`: run a single reap pass
//! - `migrate`: apply event store migrations

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use orchestra_lifecycle::config::Config;
use orchestra_lifecycle::reaper::ttl_from_hours;
use orchestra_lifecycle::runtime::OrchestraRuntime;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(about = "Ephemeral workshop instances on Kubernetes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reaper in the foreground until Ctrl-C
    Serve,

    /// Provision an instance and print its name and URL
    Create {
        /// Catalog reference (an image reference with the default catalog)
        catalog_ref: String,

        /// Requester identity
        #[arg(long)]
        owner: String,

        /// Return the newest live instance of the same entry for this owner
        #[arg(long)]
        reuse: bool,
    },

    /// Check whether an instance has a ready replica
    Ready {
        /// Instance name
        name: String,
    },

    /// Delete an instance's resources and record the deletion
    Delete {
        /// Instance name
        name: String,
    },

    /// Show the recorded state and history of an instance
    Status {
        /// Instance name
        name: String,
    },

    /// Run one reap pass
    Reap {
        /// Instance lifetime in hours (defaults to ORCHESTRA_REAPER_TTL_HOURS)
        #[arg(long)]
        ttl_hours: Option<u64>,

        /// Also remove labelled workloads with no live instance
        #[arg(long)]
        sweep_orphans: bool,
    },

    /// Apply event store migrations and exit
    Migrate {
        #[arg(long, env = "ORCHESTRA_DATABASE_URL")]
        database_url: String,
    },
}

#[derive(Serialize)]
struct Readiness<'a> {
    name: &'a str,
    ready: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads env-backed arguments
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orchestra_lifecycle=info,orchestra_store=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    if let Commands::Migrate { database_url } = &cli.command {
        let store = orchestra_store::connect(database_url)
            .await
            .context("Failed to migrate event store")?;
        info!(backend = store.backend(), "Event store migrations applied");
        return Ok(());
    }

    let mut config = Config::from_env()?;
    if let Commands::Reap { sweep_orphans, .. } = &cli.command {
        config.reaper.sweep_orphans |= *sweep_orphans;
    }

    let runtime_config = OrchestraRuntime::from_config(&config).await?.build()?;
    let manager = runtime_config.manager();

    match cli.command {
        Commands::Serve => {
            info!(
                namespace = %config.namespace,
                domain = %config.domain,
                "Starting Orchestra"
            );

            let runtime = runtime_config.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");

            runtime.shutdown().await?;
            info!("Orchestra shut down");
        }
        Commands::Create {
            catalog_ref,
            owner,
            reuse,
        } => {
            let provisioned = if reuse {
                manager
                    .create_with_policy(
                        &catalog_ref,
                        &owner,
                        orchestra_lifecycle::ReusePolicy::ReuseExisting,
                    )
                    .await?
            } else {
                manager.create(&catalog_ref, &owner).await?
            };
            print_json(&provisioned)?;
        }
        Commands::Ready { name } => {
            let ready = manager.is_ready(&name).await;
            print_json(&Readiness { name: &name, ready })?;
        }
        Commands::Delete { name } => {
            let deleted = manager.delete(&name).await?;
            print_json(&deleted)?;
        }
        Commands::Status { name } => {
            let state = manager.status(&name).await?;
            let history = manager.history(&name).await?;
            print_json(&serde_json::json!({ "state": state, "history": history }))?;
        }
        Commands::Reap { ttl_hours, .. } => {
            let ttl = match ttl_hours {
                Some(hours) => ttl_from_hours(hours)
                    .with_context(|| format!("--ttl-hours {hours} is out of range"))?,
                None => config.reaper.ttl,
            };
            let report = runtime_config.reaper().reap_once(ttl).await?;
            print_json(&report)?;
        }
        Commands::Migrate { .. } => {}
    }

    Ok(())
}
