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

use std::fmt;

/// Counters for one bridge instance. Reset on restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Messages received from upstream.
    pub received: u64,
    /// Messages acknowledged upstream (delivered or dropped).
    pub acked: u64,
    /// Permanently invalid messages that were acknowledged without delivery.
    pub dropped: u64,
    /// Transient failures left unacknowledged for redelivery.
    pub failed: u64,
    /// Individual fields removed by the sanitizer.
    pub fields_dropped: u64,
    /// Connection attempts.
    pub connects: u64,
    /// Reconnect cycles after a connection failure or loss.
    pub bounces: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} received, {} acked, {} dropped, {} failed, {} fields dropped, {} bounces",
            self.received, self.acked, self.dropped, self.failed, self.fields_dropped, self.bounces
        )
    }
}
