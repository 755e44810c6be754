//! Message envelope and its delivery-time validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::MessageDefect;

/// The `(path, body, headers)` tuple a producer enqueues.
///
/// Not validated at enqueue time; the router validates the delivered value
/// with [`Message::parse`] before looking up a route. The body is opaque to
/// the router and handed to the matched handler as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub path: String,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(path: impl Into<String>, body: Value, headers: HashMap<String, String>) -> Self {
        Self {
            path: path.into(),
            body,
            headers,
        }
    }

    /// Classify a delivered value: either a well-formed message or a specific
    /// defect. Anything an unrelated producer put on the same queue lands in
    /// the defect branch.
    pub fn parse(value: Value) -> Result<Self, MessageDefect> {
        let Value::Object(mut map) = value else {
            return Err(MessageDefect::NotAnObject);
        };

        let path = match map.remove("path") {
            Some(Value::String(path)) => path,
            _ => return Err(MessageDefect::PathNotString),
        };

        // `body: null` is a present body; only the missing key is a defect.
        let body = map.remove("body").ok_or(MessageDefect::MissingBody)?;

        let headers = match map.remove("headers") {
            Some(Value::Object(entries)) => {
                let mut headers = HashMap::with_capacity(entries.len());
                for (name, value) in entries {
                    let Value::String(value) = value else {
                        return Err(MessageDefect::InvalidHeaders);
                    };
                    headers.insert(name, value);
                }
                headers
            }
            _ => return Err(MessageDefect::InvalidHeaders),
        };

        Ok(Self {
            path,
            body,
            headers,
        })
    }
}
