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

//! Payload decoding.
//!
//! Telemetry producers written in Python emit bare `NaN` and `Infinity`
//! tokens, which strict JSON rejects. When strict parsing fails those tokens
//! are rewritten to the strings `"nan"`, `"inf"` and `"-inf"` (outside string
//! literals only) and parsing is retried, so the sanitizer drops just the
//! affected fields instead of the whole message.

use serde_json::{Map, Value};

use crate::error::MessageError;

/// Decode an upstream payload into a JSON object.
pub fn decode(payload: &[u8]) -> Result<Map<String, Value>, MessageError> {
    let value = match serde_json::from_slice::<Value>(payload) {
        Ok(value) => value,
        Err(strict) => match rewrite_non_finite(payload) {
            Some(rewritten) => serde_json::from_slice(&rewritten).map_err(|_| strict)?,
            None => return Err(strict.into()),
        },
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(MessageError::Invalid(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Returns `None` when there was nothing to rewrite.
fn rewrite_non_finite(input: &[u8]) -> Option<Vec<u8>> {
    const TOKENS: [(&[u8], &[u8]); 3] = [
        (b"-Infinity", b"\"-inf\""),
        (b"Infinity", b"\"inf\""),
        (b"NaN", b"\"nan\""),
    ];

    let mut out = Vec::with_capacity(input.len() + 8);
    let mut in_string = false;
    let mut changed = false;
    let mut i = 0;

    'outer: while i < input.len() {
        let byte = input[i];
        if in_string {
            out.push(byte);
            match byte {
                b'\\' if i + 1 < input.len() => {
                    out.push(input[i + 1]);
                    i += 2;
                    continue;
                }
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        if byte == b'"' {
            in_string = true;
        } else {
            for (token, replacement) in TOKENS {
                if input[i..].starts_with(token) {
                    out.extend_from_slice(replacement);
                    i += token.len();
                    changed = true;
                    continue 'outer;
                }
            }
        }
        out.push(byte);
        i += 1;
    }

    changed.then_some(out)
}
