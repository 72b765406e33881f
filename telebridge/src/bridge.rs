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

//! The bridge loop.
//!
//! Owns the upstream connection and drives every received message through
//! decode → sanitize → route → publish, one message at a time. The outcome
//! decides the acknowledgment:
//!
//! | outcome | upstream |
//! |---|---|
//! | delivered | ack |
//! | not JSON / not an object | ack (dropped) |
//! | unroutable / publish failed | left unacked, short pause |
//! | connection error | reconnect after backoff |
//!
//! Reconnects are unbounded. The loop only returns when the shutdown signal
//! fires.

use std::fmt;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use telebridge_sink::{sanitize_fields, Publisher, Routing};
use telebridge_source_amqp::{Session, SourceError, Upstream};

use crate::decode::decode;
use crate::error::{Disposition, MessageError};
use crate::stats::Stats;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upstream connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Consuming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Consuming => "consuming",
        };
        f.write_str(name)
    }
}

/// Tunables for the bridge loop.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Log prefix.
    pub id: String,
    /// Sleep between losing the upstream connection and reconnecting.
    pub backoff: Duration,
    /// Sleep after a transient per-message failure.
    pub failure_pause: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            id: "telebridge".to_string(),
            backoff: Duration::from_millis(500),
            failure_pause: Duration::from_millis(50),
        }
    }
}

/// One bridge instance: one upstream queue, one downstream sink.
pub struct Bridge<U, P> {
    options: BridgeOptions,
    upstream: U,
    routing: Routing,
    publisher: P,
    state: ConnectionState,
    stats: Stats,
}

impl<U, P> Bridge<U, P>
where
    U: Upstream,
    P: Publisher,
{
    pub fn new(options: BridgeOptions, upstream: U, routing: Routing, publisher: P) -> Self {
        Self {
            options,
            upstream,
            routing,
            publisher,
            state: ConnectionState::Disconnected,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Run until `shutdown` becomes `true`, then close the upstream
    /// connection and the publisher and return the final counters.
    ///
    /// If every sender of `shutdown` is dropped the loop runs forever.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Stats {
        info!(
            "[{}] Bridge starting, upstream {}",
            self.options.id,
            self.upstream.endpoint()
        );

        while !*shutdown.borrow() {
            match self.connect_and_consume(&mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    self.stats.bounces += 1;
                    error!(
                        "[{}] Upstream connection error: {e}. {} bounces so far",
                        self.options.id, self.stats.bounces
                    );
                    if pause(self.options.backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        self.publisher.shutdown().await;
        info!("[{}] Bridge stopped: {}", self.options.id, self.stats);
        self.stats
    }

    /// `Ok` only when shutdown was requested; every `Err` is a bounce.
    async fn connect_and_consume(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SourceError> {
        self.set_state(ConnectionState::Connecting);
        self.stats.connects += 1;

        let mut session = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => return Ok(()),
            session = self.upstream.connect() => session?,
        };
        self.set_state(ConnectionState::Connected);

        let result = self.consume(&mut session, shutdown).await;
        close_session(&self.options.id, session).await;
        result
    }

    async fn consume<S: Session>(
        &mut self,
        session: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SourceError> {
        session.subscribe().await?;
        self.set_state(ConnectionState::Consuming);

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Ok(()),
                message = session.recv() => message?,
            };
            self.stats.received += 1;
            if message.redelivered {
                debug!("[{}] Received redelivered message", self.options.id);
            }

            match self.handle(&message.payload).await {
                Ok(()) => {
                    session.ack(message.handle).await?;
                    self.stats.acked += 1;
                }
                Err(e) => match e.disposition() {
                    Disposition::Ack => {
                        warn!(
                            "[{}] {}: Skipping invalid message: {e}. {} messages so far",
                            self.options.id,
                            e.kind(),
                            self.stats.received
                        );
                        session.ack(message.handle).await?;
                        self.stats.acked += 1;
                        self.stats.dropped += 1;
                    }
                    Disposition::Retry => {
                        error!(
                            "[{}] {}: {e}. {} messages so far",
                            self.options.id,
                            e.kind(),
                            self.stats.received
                        );
                        self.stats.failed += 1;
                        drop(message.handle);
                        if pause(self.options.failure_pause, shutdown).await {
                            return Ok(());
                        }
                    }
                },
            }
        }
    }

    async fn handle(&mut self, payload: &[u8]) -> Result<(), MessageError> {
        let raw = decode(payload)?;
        let (fields, dropped) = sanitize_fields(&raw);
        for field in &dropped {
            self.stats.fields_dropped += 1;
            warn!(
                "[{}] Dropping field {field}. {} fields dropped in {} messages so far",
                self.options.id, self.stats.fields_dropped, self.stats.received
            );
        }

        let destination = self.routing.resolve(&fields)?;
        self.publisher.publish(&destination, &fields).await?;
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("[{}] {} -> {}", self.options.id, self.state, state);
            self.state = state;
        }
    }
}

async fn close_session<S: Session>(id: &str, session: S) {
    match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => debug!("[{id}] Upstream session closed"),
        Ok(Err(e)) => debug!("[{id}] Upstream session close failed: {e}"),
        Err(_) => debug!("[{id}] Upstream session close timed out"),
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration`; returns `true` if shutdown was requested meanwhile.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
