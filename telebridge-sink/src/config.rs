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

//! Configuration types for the HTTP and MQTT sinks.

use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::router::{default_routes, RouteRule};

/// Placeholder in the HTTP URI template that receives the routed channel.
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Errors raised while building a sink config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid sink URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("HTTP URI template '{0}' has no {{channel}} placeholder")]
    MissingChannelPlaceholder(String),
    #[error("routing table must contain at least one rule")]
    NoRoutes,
    #[error("MQTT QoS must be 0, 1 or 2, got {0}")]
    InvalidQos(u8),
    #[error("MQTT port must not be 0")]
    InvalidPort,
    #[error("MQTT host must not be empty")]
    EmptyHost,
    #[error("MQTT topic must not be empty")]
    EmptyTopic,
}

/// Configuration for the HTTP sink.
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    /// Sink identifier used as the log prefix.
    pub id: String,
    /// Target URI with a `{channel}` placeholder.
    pub uri_template: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Ordered routing rules.
    pub routes: Vec<RouteRule>,
}

impl HttpSinkConfig {
    pub fn builder(id: impl Into<String>, uri_template: impl Into<String>) -> HttpSinkConfigBuilder {
        HttpSinkConfigBuilder {
            id: id.into(),
            uri_template: uri_template.into(),
            timeout: Duration::from_secs(10),
            routes: default_routes(),
        }
    }

    /// The template with `channel` substituted.
    pub fn url_for(&self, channel: &str) -> String {
        self.uri_template.replace(CHANNEL_PLACEHOLDER, channel)
    }
}

/// Builder for [`HttpSinkConfig`].
pub struct HttpSinkConfigBuilder {
    id: String,
    uri_template: String,
    timeout: Duration,
    routes: Vec<RouteRule>,
}

impl HttpSinkConfigBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the default routing table.
    pub fn routes(mut self, routes: Vec<RouteRule>) -> Self {
        self.routes = routes;
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<HttpSinkConfig, ConfigError> {
        if !self.uri_template.contains(CHANNEL_PLACEHOLDER) {
            return Err(ConfigError::MissingChannelPlaceholder(self.uri_template));
        }
        let probe = self.uri_template.replace(CHANNEL_PLACEHOLDER, "channel");
        let url = Url::parse(&probe).map_err(|e| ConfigError::InvalidUri {
            uri: self.uri_template.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUri {
                uri: self.uri_template,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        Ok(HttpSinkConfig {
            id: self.id,
            uri_template: self.uri_template,
            timeout: self.timeout,
            routes: self.routes,
        })
    }
}

/// Configuration for the MQTT sink.
#[derive(Debug, Clone)]
pub struct MqttSinkConfig {
    /// Sink identifier used as the log prefix.
    pub id: String,
    /// MQTT broker hostname or IP.
    pub host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// Topic every message is published to.
    pub topic: String,
    /// Publish QoS, 0 to 2 (default: 0).
    pub qos: u8,
    /// MQTT client ID. Defaults to `"telebridge-<uuid>"`.
    pub client_id: String,
    /// Optional MQTT username for authentication.
    pub username: Option<String>,
    /// Optional MQTT password for authentication.
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// How long to wait for the broker to confirm a publish.
    pub delivery_timeout: Duration,
}

impl MqttSinkConfig {
    /// Start building a new config with the required fields.
    pub fn builder(
        id: impl Into<String>,
        host: impl Into<String>,
        topic: impl Into<String>,
    ) -> MqttSinkConfigBuilder {
        MqttSinkConfigBuilder {
            id: id.into(),
            host: host.into(),
            topic: topic.into(),
            port: DEFAULT_MQTT_PORT,
            qos: 0,
            client_id: format!("telebridge-{}", uuid::Uuid::new_v4()),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(10),
        }
    }

    /// Start a builder from `mqtt://[user:pass@]host[:port]/topic[?qos=N]`.
    pub fn from_uri(id: impl Into<String>, uri: &str) -> Result<MqttSinkConfigBuilder, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUri {
            uri: uri.to_string(),
            reason,
        };

        let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "mqtt" | "tcp") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::EmptyHost)?;
        let decode = |part: &str| {
            percent_decode_str(part)
                .decode_utf8()
                .map(|decoded| decoded.into_owned())
                .map_err(|e| invalid(e.to_string()))
        };
        let topic = decode(url.path().trim_start_matches('/'))?;

        let mut builder = Self::builder(id, host, topic).port(url.port().unwrap_or(DEFAULT_MQTT_PORT));

        if let Some((_, qos)) = url.query_pairs().find(|(k, _)| k == "qos") {
            let qos = qos
                .parse::<u8>()
                .map_err(|_| invalid(format!("qos '{qos}' is not a number")))?;
            builder = builder.qos(qos);
        }
        if !url.username().is_empty() {
            builder = builder.username(decode(url.username())?);
        }
        if let Some(password) = url.password() {
            builder = builder.password(decode(password)?);
        }

        Ok(builder)
    }
}

/// Builder for [`MqttSinkConfig`].
pub struct MqttSinkConfigBuilder {
    id: String,
    host: String,
    topic: String,
    port: u16,
    qos: u8,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Duration,
    delivery_timeout: Duration,
}

impl MqttSinkConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<MqttSinkConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.qos > 2 {
            return Err(ConfigError::InvalidQos(self.qos));
        }

        Ok(MqttSinkConfig {
            id: self.id,
            host: self.host,
            port: self.port,
            topic: self.topic,
            qos: self.qos,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive: self.keep_alive,
            delivery_timeout: self.delivery_timeout,
        })
    }
}

/// The downstream transport, chosen at startup.
#[derive(Debug, Clone)]
pub enum SinkConfig {
    Http(HttpSinkConfig),
    Mqtt(MqttSinkConfig),
}

impl SinkConfig {
    /// Build a sink config from a bare URI: `mqtt://...` selects the MQTT
    /// sink, `http(s)://...{channel}...` the HTTP sink with default routes.
    pub fn from_uri(id: impl Into<String>, uri: &str) -> Result<Self, ConfigError> {
        let id = id.into();
        let scheme = uri.split_once("://").map(|(scheme, _)| scheme);
        match scheme {
            Some("http") | Some("https") => {
                Ok(SinkConfig::Http(HttpSinkConfig::builder(id, uri).build()?))
            }
            Some("mqtt") | Some("tcp") => {
                Ok(SinkConfig::Mqtt(MqttSinkConfig::from_uri(id, uri)?.build()?))
            }
            _ => Err(ConfigError::InvalidUri {
                uri: uri.to_string(),
                reason: "expected an http(s):// or mqtt:// URI".to_string(),
            }),
        }
    }
}
