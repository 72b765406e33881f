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

//! lapin-backed implementation of [`Upstream`] and [`Session`].

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use log::{debug, info};

use crate::config::AmqpSourceConfig;
use crate::upstream::{RawMessage, Session, SourceError, Upstream};

const CLOSE_REPLY_CODE: u16 = 200;

/// AMQP source for the bridge.
///
/// Each call to [`Upstream::connect`] opens a fresh connection and channel;
/// nothing is shared between sessions.
pub struct AmqpSource {
    config: AmqpSourceConfig,
}

impl AmqpSource {
    /// Create a new AMQP source from the given config.
    pub fn new(config: AmqpSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AmqpSourceConfig {
        &self.config
    }
}

#[async_trait]
impl Upstream for AmqpSource {
    type Session = AmqpSession;

    async fn connect(&mut self) -> Result<AmqpSession, SourceError> {
        debug!(
            "[{}] Opening AMQP connection to {}",
            self.config.id,
            self.config.redacted_uri()
        );

        let connect = Connection::connect(&self.config.uri, ConnectionProperties::default());
        let connection = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| SourceError::ConnectTimeout(self.config.connect_timeout))??;

        let channel = connection.create_channel().await?;
        if let Some(prefetch) = self.config.prefetch {
            channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await?;
        }

        info!(
            "[{}] Connected to AMQP broker at {}",
            self.config.id,
            self.config.redacted_uri()
        );

        Ok(AmqpSession {
            id: self.config.id.clone(),
            queue: self.config.queue.clone(),
            exclusive: self.config.exclusive,
            consumer_tag: self.config.consumer_tag.clone(),
            connection,
            channel,
            consumer: None,
        })
    }

    fn endpoint(&self) -> String {
        format!("{} (queue={})", self.config.redacted_uri(), self.config.queue)
    }
}

/// One AMQP connection with a single channel consuming one queue.
pub struct AmqpSession {
    id: String,
    queue: String,
    exclusive: bool,
    consumer_tag: String,
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
}

#[async_trait]
impl Session for AmqpSession {
    type Handle = Acker;

    async fn subscribe(&mut self) -> Result<(), SourceError> {
        let options = BasicConsumeOptions {
            exclusive: self.exclusive,
            ..BasicConsumeOptions::default()
        };
        let consumer = self
            .channel
            .basic_consume(&self.queue, &self.consumer_tag, options, FieldTable::default())
            .await?;
        self.consumer = Some(consumer);

        info!(
            "[{}] Consuming from queue '{}' (exclusive={})",
            self.id, self.queue, self.exclusive
        );
        Ok(())
    }

    async fn recv(&mut self) -> Result<RawMessage<Acker>, SourceError> {
        let consumer = self.consumer.as_mut().ok_or(SourceError::NotSubscribed)?;
        match consumer.next().await {
            Some(Ok(delivery)) => Ok(RawMessage {
                payload: delivery.data,
                handle: delivery.acker,
                redelivered: delivery.redelivered,
            }),
            Some(Err(e)) => Err(e.into()),
            None => Err(SourceError::StreamEnded(self.queue.clone())),
        }
    }

    async fn ack(&mut self, handle: Acker) -> Result<(), SourceError> {
        handle.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), SourceError> {
        debug!("[{}] Closing AMQP channel and connection", self.id);
        self.channel.close(CLOSE_REPLY_CODE, "bridge stopping").await?;
        self.connection
            .close(CLOSE_REPLY_CODE, "bridge stopping")
            .await?;
        Ok(())
    }
}
