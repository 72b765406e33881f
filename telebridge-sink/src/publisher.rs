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

//! The [`Publisher`] seam between the bridge loop and a downstream transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::fields::FieldMap;
use crate::router::Destination;

/// Downstream delivery failure. Always transient from the bridge's point of
/// view: the upstream message is left unacknowledged.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP endpoint {url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),
    #[error("MQTT broker did not confirm delivery within {0:?}")]
    DeliveryTimeout(Duration),
    #[error("destination {0:?} is not served by this publisher")]
    WrongDestination(Destination),
}

/// Delivers sanitized messages downstream.
///
/// A publisher belongs to one bridge instance, hence `&mut self`. Every call
/// is an independent delivery attempt: nothing is deduplicated.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(
        &mut self,
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<(), PublishError>;

    /// Release transport resources. Called once when the bridge stops.
    async fn shutdown(&mut self) {}
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Box<P> {
    async fn publish(
        &mut self,
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<(), PublishError> {
        (**self).publish(destination, fields).await
    }

    async fn shutdown(&mut self) {
        (**self).shutdown().await
    }
}
