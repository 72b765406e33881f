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

//! Normalizes decoded telemetry into a [`FieldMap`].
//!
//! Rules, per key:
//! * `timestamp` is copied verbatim.
//! * the literal string `"nan"` is dropped.
//! * everything else is coerced to `f64`; values that cannot be coerced, or
//!   that coerce to NaN or an infinity, are dropped.
//!
//! A bad field never invalidates the rest of the message. Dropped fields are
//! reported back to the caller, which owns logging and counters.

use std::fmt;

use serde_json::{Map, Value};

use crate::fields::{FieldMap, FieldValue};

/// Key whose value is passed through without coercion.
pub const TIMESTAMP_KEY: &str = "timestamp";

const NAN_LITERAL: &str = "nan";

/// A field removed by [`sanitize_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedField {
    pub key: String,
    pub reason: String,
}

impl fmt::Display for DroppedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.key, self.reason)
    }
}

/// Build a sanitized copy of `raw`, discarding the drop report.
pub fn sanitize(raw: &Map<String, Value>) -> FieldMap {
    sanitize_fields(raw).0
}

/// Build a sanitized copy of `raw` along with every field that was dropped,
/// in key order. The input is left untouched.
pub fn sanitize_fields(raw: &Map<String, Value>) -> (FieldMap, Vec<DroppedField>) {
    let mut fields = FieldMap::new();
    let mut dropped = Vec::new();
    let mut drop_field = |key: &str, reason: String| {
        dropped.push(DroppedField {
            key: key.to_string(),
            reason,
        })
    };

    for (key, value) in raw {
        if key == TIMESTAMP_KEY {
            fields.insert(key.as_str(), FieldValue::Verbatim(value.clone()));
            continue;
        }

        if value.as_str() == Some(NAN_LITERAL) {
            drop_field(key, "value is \"nan\"".to_string());
            continue;
        }

        match coerce(value) {
            Ok(number) if number.is_nan() => drop_field(key, "value is NaN".to_string()),
            Ok(number) if number.is_infinite() => {
                drop_field(key, format!("{number} cannot be represented in JSON"))
            }
            Ok(number) => fields.insert(key.as_str(), FieldValue::Number(number)),
            Err(reason) => drop_field(key, reason),
        }
    }

    (fields, dropped)
}

fn coerce(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{n} does not fit in a float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Err("null is not a number".to_string()),
        Value::Array(_) => Err("an array is not a number".to_string()),
        Value::Object(_) => Err("an object is not a number".to_string()),
    }
}
