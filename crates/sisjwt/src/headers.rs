//! Token header map with case-insensitive lookup.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded token header.
///
/// Keys keep their original spelling for serialization; lookups ignore ASCII
/// case, so `kid`, `KID` and `Kid` all find the same entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Map<String, Value>);

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a value, ignoring key case.
    ///
    /// An exact match wins over a case-insensitive one.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).or_else(|| {
            self.0.iter().find(|(candidate, _)| candidate.eq_ignore_ascii_case(key)).map(|(_, v)| v)
        })
    }

    /// Looks up a string value, ignoring key case.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns `true` if a key matches, ignoring case.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the wrapper and returns the JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Headers {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn headers(value: Value) -> Headers {
        match value {
            Value::Object(map) => Headers::from(map),
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let h = headers(json!({"alg": "SISKMS1.0", "KID": "key-1", "aws_alg": "ECDSA_SHA_256"}));
        assert_eq!(h.get_str("kid"), Some("key-1"));
        assert_eq!(h.get_str("AWS_ALG"), Some("ECDSA_SHA_256"));
        assert_eq!(h.get_str("ALG"), Some("SISKMS1.0"));
        assert!(h.contains_key("Kid"));
        assert!(!h.contains_key("typ"));
    }

    #[test]
    fn exact_match_wins() {
        let h = headers(json!({"kid": "lower", "KID": "upper"}));
        assert_eq!(h.get_str("KID"), Some("upper"));
        assert_eq!(h.get_str("kid"), Some("lower"));
    }

    #[test]
    fn serializes_with_original_keys() {
        let h = headers(json!({"AWS_ALG": "x"}));
        assert_eq!(serde_json::to_value(&h).unwrap(), json!({"AWS_ALG": "x"}));
    }

    #[test]
    fn non_string_values_are_not_strings() {
        let h = headers(json!({"kid": 7}));
        assert_eq!(h.get_str("kid"), None);
        assert_eq!(h.get("kid"), Some(&json!(7)));
    }
}
