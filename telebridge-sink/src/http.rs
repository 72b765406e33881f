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

//! HTTP data-acquisition sink.

use async_trait::async_trait;
use log::debug;

use crate::config::HttpSinkConfig;
use crate::fields::FieldMap;
use crate::publisher::{PublishError, Publisher};
use crate::router::Destination;

/// POSTs each message as JSON to the channel URL derived from the template.
pub struct HttpPublisher {
    config: HttpSinkConfig,
    client: reqwest::Client,
}

impl HttpPublisher {
    /// Create a new HTTP publisher. Fails only if the TLS backend cannot be
    /// initialized.
    pub fn new(config: HttpSinkConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpSinkConfig {
        &self.config
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(
        &mut self,
        destination: &Destination,
        fields: &FieldMap,
    ) -> Result<(), PublishError> {
        let Destination::Http { channel } = destination else {
            return Err(PublishError::WrongDestination(destination.clone()));
        };

        let url = self.config.url_for(channel);
        let body = fields.to_payload()?;
        debug!("[{}] POST {} ({} bytes)", self.config.id, url, body.len());

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| PublishError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
