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

//! Destination selection.
//!
//! The HTTP sink picks a channel from the field set with an ordered rule
//! table (first match wins, field sets overlap). The MQTT sink always
//! publishes to one fixed topic.

use serde::Deserialize;

use crate::config::ConfigError;
use crate::fields::FieldMap;

pub const GPS_CHANNEL: &str = "gps";
pub const EPSOLAR_CHANNEL: &str = "epsolar";
pub const ENVIRONMENT_CHANNEL: &str = "environment";

/// Where a message is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// An HTTP channel, substituted into the sink's URI template.
    Http { channel: String },
    /// A fixed MQTT topic and QoS level (0, 1 or 2).
    Mqtt { topic: String, qos: u8 },
}

/// Raised when no routing rule matches a message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no routing rule matches message {fields}")]
pub struct UnroutableMessage {
    pub fields: FieldMap,
}

/// "If `field` is present, send to `channel`."
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub field: String,
    pub channel: String,
}

impl RouteRule {
    pub fn new(field: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            channel: channel.into(),
        }
    }
}

/// The built-in rule table for solar-box telemetry.
///
/// `batterie_volt` is what older charge-controller firmware emits.
pub fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::new("latitude", GPS_CHANNEL),
        RouteRule::new("battery_volt", EPSOLAR_CHANNEL),
        RouteRule::new("batterie_volt", EPSOLAR_CHANNEL),
        RouteRule::new("humidity", ENVIRONMENT_CHANNEL),
    ]
}

/// Ordered field-presence router for the HTTP sink.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<RouteRule>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            rules: default_routes(),
        }
    }
}

impl Router {
    /// Build a router from an ordered rule list. The list must not be empty.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::NoRoutes);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Channel of the first rule whose field is present.
    pub fn route(&self, fields: &FieldMap) -> Result<&str, UnroutableMessage> {
        self.rules
            .iter()
            .find(|rule| fields.contains_key(&rule.field))
            .map(|rule| rule.channel.as_str())
            .ok_or_else(|| UnroutableMessage {
                fields: fields.clone(),
            })
    }
}

/// How a sink turns a sanitized message into a [`Destination`].
#[derive(Debug, Clone)]
pub enum Routing {
    /// Pick an HTTP channel with a [`Router`].
    Channels(Router),
    /// Always use the same destination.
    Fixed(Destination),
}

impl Routing {
    pub fn resolve(&self, fields: &FieldMap) -> Result<Destination, UnroutableMessage> {
        match self {
            Routing::Channels(router) => router.route(fields).map(|channel| Destination::Http {
                channel: channel.to_string(),
            }),
            Routing::Fixed(destination) => Ok(destination.clone()),
        }
    }
}
