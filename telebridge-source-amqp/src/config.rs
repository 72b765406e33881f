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

//! Configuration types for the AMQP source.

use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

/// Errors raised while building an [`AmqpSourceConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid AMQP URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("no AMQP queue configured and none found in the URI")]
    MissingQueue,
}

/// Configuration for the AMQP source.
///
/// Built once at startup through [`AmqpSourceConfig::builder`] and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct AmqpSourceConfig {
    /// Source identifier used as the log prefix.
    pub id: String,
    /// Connection URI with any queue segment or `queue` parameter removed.
    pub uri: String,
    /// Queue to consume from.
    pub queue: String,
    /// Request exclusive consumption of the queue.
    pub exclusive: bool,
    /// Optional `basic.qos` prefetch count. `None` leaves the broker default.
    pub prefetch: Option<u16>,
    /// Upper bound on the connection handshake.
    pub connect_timeout: Duration,
    /// Consumer tag. Defaults to `"telebridge-<uuid>"`.
    pub consumer_tag: String,
}

impl AmqpSourceConfig {
    /// Start building a new config from a source id and an AMQP URI.
    pub fn builder(id: impl Into<String>, uri: impl Into<String>) -> AmqpSourceConfigBuilder {
        AmqpSourceConfigBuilder {
            id: id.into(),
            uri: uri.into(),
            queue: None,
            exclusive: false,
            prefetch: None,
            connect_timeout: Duration::from_secs(10),
            consumer_tag: format!("telebridge-{}", uuid::Uuid::new_v4()),
        }
    }

    /// The connection URI with the password masked, for logging.
    pub fn redacted_uri(&self) -> String {
        redact(&self.uri)
    }
}

/// Builder for [`AmqpSourceConfig`].
pub struct AmqpSourceConfigBuilder {
    id: String,
    uri: String,
    queue: Option<String>,
    exclusive: bool,
    prefetch: Option<u16>,
    connect_timeout: Duration,
    consumer_tag: String,
}

impl AmqpSourceConfigBuilder {
    /// Explicit queue name. Takes precedence over a queue named in the URI.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Parse the URI, resolve the queue name and build the config.
    pub fn build(self) -> Result<AmqpSourceConfig, ConfigError> {
        let parsed = parse_amqp_uri(&self.uri)?;
        let queue = self
            .queue
            .filter(|q| !q.is_empty())
            .or(parsed.queue)
            .ok_or(ConfigError::MissingQueue)?;

        Ok(AmqpSourceConfig {
            id: self.id,
            uri: parsed.connect_uri,
            queue,
            exclusive: self.exclusive,
            prefetch: self.prefetch,
            connect_timeout: self.connect_timeout,
            consumer_tag: self.consumer_tag,
        })
    }
}

/// Result of splitting a queue name out of an AMQP URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAmqpUri {
    /// URI to hand to the client library (vhost only, no queue).
    pub connect_uri: String,
    /// Queue named by a `queue` parameter or a second path segment.
    pub queue: Option<String>,
}

/// Split an AMQP URI into a connection URI and an optional queue name.
///
/// `amqp://host/vhost/queue` and `amqp://host/vhost?queue=name` both name a
/// queue; the query parameter wins when both are present. The queue part is
/// removed from the returned connection URI so the client sees a plain vhost.
pub fn parse_amqp_uri(uri: &str) -> Result<ParsedAmqpUri, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUri {
        uri: redact(uri),
        reason,
    };

    let mut url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "amqp" | "amqps") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    let mut queue = None;
    let mut remaining = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "queue" {
            queue = Some(value.into_owned());
        } else {
            remaining.push((key.into_owned(), value.into_owned()));
        }
    }
    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(str::to_owned).collect())
        .unwrap_or_default();
    if segments.len() == 2 {
        if queue.is_none() && !segments[1].is_empty() {
            let decoded = percent_decode_str(&segments[1])
                .decode_utf8()
                .map_err(|e| invalid(e.to_string()))?;
            queue = Some(decoded.into_owned());
        }
        let vhost = format!("/{}", segments[0]);
        url.set_path(&vhost);
    }

    Ok(ParsedAmqpUri {
        connect_uri: url.to_string(),
        queue: queue.filter(|q| !q.is_empty()),
    })
}

/// Mask the password component of a URI. Unparseable input is returned
/// unchanged apart from everything up to the last `@`.
pub fn redact(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => match uri.rfind('@') {
            Some(at) => format!("***{}", &uri[at..]),
            None => uri.to_string(),
        },
    }
}
