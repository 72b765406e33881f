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

//! Store-and-forward bridge from an AMQP queue to an HTTP or MQTT sink.
//!
//! # Example
//!
//! ```ignore
//! use telebridge::{Bridge, Settings};
//! use telebridge_source_amqp::AmqpSource;
//!
//! let settings = Settings::from_file("bridge.json", std::env::var("CLOUDAMQP_URL").ok())?;
//! let (routing, publisher) = settings.sink_parts()?;
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!
//! let mut bridge = Bridge::new(settings.options, AmqpSource::new(settings.source), routing, publisher);
//! let stats = bridge.run(shutdown).await;
//! ```

pub mod bridge;
pub mod decode;
pub mod error;
pub mod settings;
pub mod stats;

pub use bridge::{Bridge, BridgeOptions, ConnectionState};
pub use error::{Disposition, MessageError};
pub use settings::{Settings, SettingsError, AMQP_URL_ENV};
pub use stats::Stats;
