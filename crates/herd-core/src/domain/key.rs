//! Structured queue keys.
//!
//! Dead-letter slots are addressed by ordered key parts rather than flat
//! strings, so prefixes stay listable (`["herd", "dlq", <timestamp>]`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single component of a [`QueueKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(n) => n.fmt(f),
            KeyPart::Str(s) => s.fmt(f),
        }
    }
}

/// An ordered sequence of key parts addressing one storage slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey(Vec<KeyPart>);

impl QueueKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueueKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for QueueKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            part.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_matches_prefix() {
        let prefix: QueueKey = ["herd", "dlq"].into_iter().collect();
        let mut key = prefix.clone();
        key.push(1_700_000_000_000_i64);

        assert!(key.starts_with(&prefix));
        assert!(!prefix.starts_with(&key));
    }

    #[test]
    fn display_joins_parts() {
        let mut key: QueueKey = ["herd", "dlq"].into_iter().collect();
        key.push(42_i64);
        assert_eq!(key.to_string(), "herd/dlq/42");
    }

    #[test]
    fn serde_keeps_part_types() {
        let mut key: QueueKey = ["herd"].into_iter().collect();
        key.push(7_i64);

        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["herd",7]"#);

        let back: QueueKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
