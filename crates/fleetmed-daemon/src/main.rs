// Copyright [2026] [FleetMed Contributors]
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Copyright (c) 2026 FleetMed Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

use fleetmed_core::store::{MemoryStore, RecordStore};
use fleetmed_daemon::config::{load_device_registry, load_operator_tokens, DaemonConfig};
use fleetmed_daemon::http;

#[derive(Debug, Parser)]
#[command(name = "fleetmed-daemon")]
#[command(about = "FleetMed vehicle telemetry ingestion and disclosure daemon")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Device registration file (vehicle_id -> hex shared key).
    #[arg(long, default_value = "./devices.json")]
    devices: PathBuf,

    /// Operator token file (bearer token -> user id and role).
    #[arg(long, default_value = "./operators.json")]
    operators: PathBuf,

    /// Drop records older than this many days. Unset keeps everything.
    #[arg(long)]
    retention_days: Option<u32>,

    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log))
        .init();

    let registry = Arc::new(RwLock::new(load_device_registry(&args.devices)?));
    let users = Arc::new(load_operator_tokens(&args.operators)?);
    let store = Arc::new(MemoryStore::new());

    let cfg = DaemonConfig {
        retention_days: args.retention_days,
        ..DaemonConfig::default()
    };

    if let Some(days) = cfg.retention_days {
        spawn_retention_task(store.clone(), days);
    }

    let state = http::build_state(cfg, registry, store, users);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "starting FleetMed daemon");

    http::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}

fn spawn_retention_task(store: Arc<MemoryStore>, days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
            match store.expire_before(cutoff) {
                Ok(0) => {}
                Ok(dropped) => tracing::info!(dropped, %cutoff, "expired records past retention"),
                Err(err) => tracing::error!(error = %err, "retention expiry failed"),
            }
        }
    });
}
