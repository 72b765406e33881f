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

//! MQTT sink.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};

use crate::config::MqttSinkConfig;
use crate::fields::FieldMap;
use crate::publisher::{PublishError, Publisher};
use crate::router::Destination;

/// Publishes each message to a fixed MQTT topic.
///
/// The client event loop is driven inline by [`Publisher::publish`] until the
/// broker confirms the message for the requested QoS. The connection is
/// reused across publishes and discarded after any failure. A publish that
/// finds the cached connection closed retries once on a new one.
pub struct MqttPublisher {
    config: MqttSinkConfig,
    connection: Option<(AsyncClient, EventLoop)>,
}

impl MqttPublisher {
    /// Create a new MQTT publisher. No connection is opened until the first
    /// publish.
    pub fn new(config: MqttSinkConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn config(&self) -> &MqttSinkConfig {
        &self.config
    }

    /// The destination every message of this sink goes to.
    pub fn destination(&self) -> Destination {
        Destination::Mqtt {
            topic: self.config.topic.clone(),
            qos: self.config.qos,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// One delivery attempt on the cached connection, opening it if needed.
    /// The connection is discarded on failure.
    async fn deliver(
        &mut self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        if self.connection.is_none() {
            info!(
                "[{}] Connecting to MQTT broker at {}:{}",
                self.config.id, self.config.host, self.config.port
            );
        }
        let timeout = self.config.delivery_timeout;
        let (client, eventloop) = self
            .connection
            .get_or_insert_with(|| open_connection(&self.config));

        let result = match tokio::time::timeout(
            timeout,
            await_delivery(client, eventloop, topic, qos, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::DeliveryTimeout(timeout)),
        };

        if result.is_err() {
            self.connection = None;
        }
        result
    }
}

/// Map a numeric QoS level onto the client's enum.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

fn open_connection(config: &MqttSinkConfig) -> (AsyncClient, EventLoop) {
    let mut mqtt_opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_opts.set_keep_alive(config.keep_alive);

    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        mqtt_opts.set_credentials(user, pass);
    }

    AsyncClient::new(mqtt_opts, 10)
}

async fn await_delivery(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    topic: &str,
    qos: QoS,
    payload: Vec<u8>,
) -> Result<(), PublishError> {
    client.publish(topic, qos, false, payload).await?;

    let mut pkid = None;
    loop {
        match eventloop.poll().await? {
            Event::Outgoing(Outgoing::Publish(id)) => {
                if qos == QoS::AtMostOnce {
                    return Ok(());
                }
                pkid = Some(id);
            }
            Event::Incoming(Incoming::PubAck(ack))
                if qos == QoS::AtLeastOnce && pkid == Some(ack.pkid) =>
            {
                return Ok(());
            }
            Event::Incoming(Incoming::PubComp(comp))
                if qos == QoS::ExactlyOnce && pkid == Some(comp.pkid) =>
            {
                return Ok(());
            }
            Event::Incoming(Incoming::ConnAck(_)) => {
                debug!("MQTT connection acknowledged");
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &mut self,
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<(), PublishError> {
        let Destination::Mqtt { topic, qos: level } = destination else {
            return Err(PublishError::WrongDestination(destination.clone()));
        };
        let Some(qos) = qos_from_level(*level) else {
            return Err(PublishError::WrongDestination(destination.clone()));
        };
        let payload = fields.to_payload()?;

        let reused = self.connection.is_some();
        match self.deliver(topic, qos, payload.clone()).await {
            // The broker drops idle clients between messages; a stale cached
            // connection gets one fresh attempt.
            Err(PublishError::MqttConnection(e)) if reused => {
                warn!(
                    "[{}] Cached MQTT connection is gone ({e}), reconnecting",
                    self.config.id
                );
                self.deliver(topic, qos, payload).await
            }
            result => result,
        }
    }

    async fn shutdown(&mut self) {
        if let Some((client, mut eventloop)) = self.connection.take() {
            let _ = client.disconnect().await;
            // Flush the DISCONNECT packet.
            let _ = tokio::time::timeout(Duration::from_secs(1), eventloop.poll()).await;
            info!("[{}] Disconnected from MQTT broker", self.config.id);
        }
    }
}
