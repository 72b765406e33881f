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

//! Downstream half of telebridge.
//!
//! Sanitizes decoded telemetry, picks a destination for it and delivers it
//! as a JSON payload over HTTP or MQTT.
//!
//! # Example
//!
//! ```ignore
//! use telebridge_sink::{sanitize, HttpPublisher, HttpSinkConfig, Publisher, Router, Routing};
//!
//! let config = HttpSinkConfig::builder("daq", "https://daq.example.org/api/{channel}/data")
//!     .build()?;
//! let routing = Routing::Channels(Router::new(config.routes.clone())?);
//! let mut publisher = HttpPublisher::new(config)?;
//!
//! let fields = sanitize(&raw);
//! let destination = routing.resolve(&fields)?;
//! publisher.publish(&destination, &fields).await?;
//! ```

pub mod config;
pub mod fields;
pub mod http;
pub mod mqtt;
pub mod publisher;
pub mod router;
pub mod sanitizer;

pub use config::{
    ConfigError, HttpSinkConfig, HttpSinkConfigBuilder, MqttSinkConfig, MqttSinkConfigBuilder,
    SinkConfig,
};
pub use fields::{FieldMap, FieldValue};
pub use http::HttpPublisher;
pub use mqtt::MqttPublisher;
pub use publisher::{PublishError, Publisher};
pub use router::{Destination, RouteRule, Router, Routing, UnroutableMessage};
pub use sanitizer::{sanitize, sanitize_fields, DroppedField};
