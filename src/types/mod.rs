pub mod error;

pub use error::{ClassifiedError, ErrorKind, RelayError, Result};

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::validation;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque identifier attached to one logical request and every log line and
/// error produced while serving it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `ai_<unix millis>_<9 base36 chars>`
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        Self(format!(
            "ai_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            suffix
        ))
    }

    /// Accept a caller-supplied id if it is short and uses only `[A-Za-z0-9_-]`
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= validation::MAX_CORRELATION_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod newtype_tests {
    use super::*;

    #[test]
    fn test_generated_correlation_id_shape() {
        let id = CorrelationId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ai");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(
            parts[2]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn test_parse_correlation_id() {
        assert_eq!(
            CorrelationId::parse(" req-42_a ").map(CorrelationId::into_inner),
            Some("req-42_a".to_string())
        );
        assert!(CorrelationId::parse("").is_none());
        assert!(CorrelationId::parse("has space").is_none());
        assert!(CorrelationId::parse("<script>").is_none());
        assert!(CorrelationId::parse(&"a".repeat(200)).is_none());
    }

    #[test]
    fn test_correlation_id_serializes_as_string() {
        let id = CorrelationId::new("ai_1_x");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ai_1_x\"");
        assert_eq!(format!("{}", id), "ai_1_x");
    }
}
