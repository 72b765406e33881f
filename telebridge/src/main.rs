// Copyright 2025 The Telebridge Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use log::{info, warn};
use telebridge::{Bridge, Settings, AMQP_URL_ENV};
use telebridge_source_amqp::AmqpSource;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = Settings::from_args(&args, std::env::var(AMQP_URL_ENV).ok())
        .context("invalid configuration")?;

    info!(
        "Starting telebridge: {} -> {}",
        settings.source.redacted_uri(),
        settings.sink_description()
    );

    let (routing, publisher) = settings.sink_parts()?;
    let upstream = AmqpSource::new(settings.source);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Cannot listen for shutdown signal: {e}"),
        }
    });

    let mut bridge = Bridge::new(settings.options, upstream, routing, publisher);
    let stats = bridge.run(shutdown_rx).await;
    info!("telebridge exiting after {} messages", stats.received);
    Ok(())
}
