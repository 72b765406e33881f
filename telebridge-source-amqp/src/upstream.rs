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

//! Narrow interface over the upstream queue broker.
//!
//! The bridge loop only ever talks to these traits. [`crate::AmqpSource`] is
//! the production implementation; tests drive the loop with in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by an upstream connection. Every variant is connection-level:
/// the bridge reacts to all of them by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("timed out after {0:?} connecting to the broker")]
    ConnectTimeout(Duration),
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("consumer for queue '{0}' was closed by the broker")]
    StreamEnded(String),
    #[error("session is not subscribed")]
    NotSubscribed,
    #[error("{0}")]
    Other(String),
}

/// A message received from the upstream broker.
///
/// The handle is released by passing it to [`Session::ack`], which consumes
/// it, so a message can be acknowledged at most once.
#[derive(Debug)]
pub struct RawMessage<H> {
    pub payload: Vec<u8>,
    pub handle: H,
    /// Whether the broker flagged this as a redelivery.
    pub redelivered: bool,
}

/// Something that can open connections to the upstream broker.
#[async_trait]
pub trait Upstream: Send {
    type Session: Session;

    /// Open a connection and a channel on it.
    async fn connect(&mut self) -> Result<Self::Session, SourceError>;

    /// Human-readable endpoint for log lines. Must not leak credentials.
    fn endpoint(&self) -> String;
}

/// An open connection + channel to the upstream broker.
#[async_trait]
pub trait Session: Send {
    type Handle: Send;

    /// Start consuming from the configured queue.
    async fn subscribe(&mut self) -> Result<(), SourceError>;

    /// Wait for the next message.
    async fn recv(&mut self) -> Result<RawMessage<Self::Handle>, SourceError>;

    /// Acknowledge a message.
    async fn ack(&mut self, handle: Self::Handle) -> Result<(), SourceError>;

    /// Close the channel and the connection.
    async fn close(self) -> Result<(), SourceError>;
}
