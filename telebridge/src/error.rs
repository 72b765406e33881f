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

//! Per-message failure taxonomy.

use telebridge_sink::{PublishError, UnroutableMessage};

/// What the bridge does with a message that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Permanently undeliverable: acknowledge so it is not redelivered forever.
    Ack,
    /// Transient: leave unacknowledged so the broker can redeliver it.
    Retry,
}

/// Why handling a single message failed.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(String),
    #[error(transparent)]
    Unroutable(#[from] UnroutableMessage),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl MessageError {
    pub fn disposition(&self) -> Disposition {
        match self {
            MessageError::Decode(_) | MessageError::Invalid(_) => Disposition::Ack,
            // TODO: decide with the DAQ owners whether unroutable messages should be dropped
            // instead of being redelivered until someone adds a rule for them.
            MessageError::Unroutable(_) => Disposition::Retry,
            MessageError::Publish(_) => Disposition::Retry,
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageError::Decode(_) => "DecodeError",
            MessageError::Invalid(_) => "InvalidMessage",
            MessageError::Unroutable(_) => "UnroutableMessage",
            MessageError::Publish(_) => "PublishError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telebridge_sink::FieldMap;

    #[test]
    fn test_malformed_input_is_acked() {
        let decode = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        assert_eq!(MessageError::Decode(decode).disposition(), Disposition::Ack);
        assert_eq!(
            MessageError::Invalid("not an object".into()).disposition(),
            Disposition::Ack
        );
    }

    #[test]
    fn test_downstream_failures_are_retried() {
        let unroutable = MessageError::Unroutable(UnroutableMessage {
            fields: FieldMap::new(),
        });
        assert_eq!(unroutable.disposition(), Disposition::Retry);
        assert_eq!(unroutable.kind(), "UnroutableMessage");

        let publish = MessageError::Publish(PublishError::Status {
            url: "http://daq/api/gps/data".into(),
            status: 502,
        });
        assert_eq!(publish.disposition(), Disposition::Retry);
    }
}
