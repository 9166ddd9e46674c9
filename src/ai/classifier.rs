//! Error Classification
//!
//! Maps raw failures (transport errors, HTTP statuses, parse failures) onto
//! the [`ErrorKind`] taxonomy. Classification is total: every raw failure
//! maps to exactly one kind, defaulting to `UNKNOWN`.

use std::time::Duration;

use crate::constants::classify as classify_constants;
use crate::types::{ClassifiedError, CorrelationId, ErrorKind};

/// A failure as observed at the call site, before classification
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// DNS resolution failure, connection refused, connection reset
    Connect(String),
    /// Deadline elapsed before the upstream answered
    Timeout { after: Duration },
    /// Upstream answered with a non-success status
    Http {
        status: u16,
        /// Parsed `Retry-After` seconds, if the header was present and numeric
        retry_after: Option<u64>,
        message: String,
    },
    /// Upstream answered 2xx with a body that could not be decoded
    Parse(String),
    /// No credential is configured for any provider
    MissingCredentials,
    /// The provider's circuit breaker rejected the call
    CircuitOpen { provider: String },
    /// The caller cancelled the request
    Cancelled,
    /// Anything not covered above
    Other(String),
}

impl RawFailure {
    /// Map a reqwest transport error without inspecting its message text
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RawFailure::Timeout {
                after: Duration::ZERO,
            }
        } else if err.is_connect() {
            RawFailure::Connect(err.to_string())
        } else if err.is_decode() {
            RawFailure::Parse(err.to_string())
        } else {
            RawFailure::Other(err.to_string())
        }
    }

    fn describe(&self) -> String {
        match self {
            RawFailure::Connect(msg) => format!("Network connection failed: {}", msg),
            RawFailure::Timeout { after } if after.is_zero() => "Request timed out".to_string(),
            RawFailure::Timeout { after } => {
                format!("Request timed out after {}ms", after.as_millis())
            }
            RawFailure::Http {
                status, message, ..
            } => format!("HTTP {}: {}", status, message),
            RawFailure::Parse(msg) => format!("Invalid response body: {}", msg),
            RawFailure::MissingCredentials => "No AI providers configured".to_string(),
            RawFailure::CircuitOpen { provider } => format!(
                "Circuit breaker for {} is OPEN. Service temporarily unavailable.",
                provider
            ),
            RawFailure::Cancelled => "Request superseded".to_string(),
            RawFailure::Other(msg) if msg.is_empty() => "Unknown error occurred".to_string(),
            RawFailure::Other(msg) => msg.clone(),
        }
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
///
/// HTTP-date forms are not interpreted and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Error classifier for retry and fallback routing
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw failure.
    ///
    /// Pure: the same input always yields the same kind.
    pub fn classify(raw: &RawFailure, correlation_id: &CorrelationId) -> ClassifiedError {
        let message = raw.describe();
        let error = |kind| ClassifiedError::new(kind, message.clone(), correlation_id.clone());

        match raw {
            RawFailure::Connect(_) => error(ErrorKind::Network),
            RawFailure::Timeout { .. } => error(ErrorKind::Timeout),
            RawFailure::Http {
                status,
                retry_after,
                ..
            } => Self::classify_http_status(*status, *retry_after, &message, correlation_id),
            RawFailure::Parse(_) => error(ErrorKind::Parse),
            RawFailure::MissingCredentials => error(ErrorKind::Configuration),
            RawFailure::CircuitOpen { provider } => {
                error(ErrorKind::CircuitOpen).provider(provider.clone())
            }
            RawFailure::Cancelled => error(ErrorKind::Cancelled),
            RawFailure::Other(_) => error(ErrorKind::Unknown),
        }
    }

    /// Classify an HTTP status code.
    ///
    /// Statuses outside the recognised set are `UNKNOWN` and not retried.
    pub fn classify_http_status(
        status: u16,
        retry_after: Option<u64>,
        message: &str,
        correlation_id: &CorrelationId,
    ) -> ClassifiedError {
        let kind = match status {
            401 | 403 => ErrorKind::ApiKey,
            429 => ErrorKind::RateLimit,
            400 | 422 => ErrorKind::BadRequest,
            500 | 502 | 503 | 504 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        };

        let error =
            ClassifiedError::new(kind, message, correlation_id.clone()).with_status(status);

        if kind == ErrorKind::RateLimit {
            let secs = retry_after
                .unwrap_or(classify_constants::DEFAULT_RETRY_AFTER_SECS)
                .min(classify_constants::MAX_RETRY_AFTER_SECS);
            error.with_retry_after(Duration::from_secs(secs))
        } else {
            error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id() -> CorrelationId {
        CorrelationId::new("ai_0_test")
    }

    fn http(status: u16) -> RawFailure {
        RawFailure::Http {
            status,
            retry_after: None,
            message: format!("HTTP {}", status),
        }
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify(&RawFailure::Connect("refused".into()), &id());
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.is_retryable());
        assert!(err.status_code.is_none());
    }

    #[test]
    fn test_classify_timeout() {
        let raw = RawFailure::Timeout {
            after: Duration::from_secs(25),
        };
        let err = ErrorClassifier::classify(&raw, &id());
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.is_retryable());
        assert!(err.message.contains("25000ms"));
    }

    #[test]
    fn test_classify_auth_statuses() {
        for status in [401, 403] {
            let err = ErrorClassifier::classify(&http(status), &id());
            assert_eq!(err.kind, ErrorKind::ApiKey);
            assert!(!err.is_retryable());
            assert_eq!(err.status_code, Some(status));
        }
    }

    #[test]
    fn test_classify_rate_limit_with_header() {
        let raw = RawFailure::Http {
            status: 429,
            retry_after: Some(7),
            message: "slow down".into(),
        };
        let err = ErrorClassifier::classify(&raw, &id());
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_classify_rate_limit_default_hint() {
        let err = ErrorClassifier::classify(&http(429), &id());
        assert_eq!(err.retry_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_classify_bad_request() {
        for status in [400, 422] {
            let err = ErrorClassifier::classify(&http(status), &id());
            assert_eq!(err.kind, ErrorKind::BadRequest);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_classify_server() {
        for status in [500, 502, 503, 504] {
            let err = ErrorClassifier::classify(&http(status), &id());
            assert_eq!(err.kind, ErrorKind::Server);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_unrecognised_status_fails_closed() {
        for status in [301, 404, 408, 418, 501, 599] {
            let err = ErrorClassifier::classify(&http(status), &id());
            assert_eq!(err.kind, ErrorKind::Unknown, "status {}", status);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_classify_parse_and_configuration() {
        let parse = ErrorClassifier::classify(&RawFailure::Parse("eof".into()), &id());
        assert_eq!(parse.kind, ErrorKind::Parse);
        assert!(!parse.is_retryable());

        let config = ErrorClassifier::classify(&RawFailure::MissingCredentials, &id());
        assert_eq!(config.kind, ErrorKind::Configuration);
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_classify_fallback_unknown() {
        let err = ErrorClassifier::classify(&RawFailure::Other(String::new()), &id());
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "Unknown error occurred");
    }

    #[test]
    fn test_correlation_id_is_carried() {
        let cid = CorrelationId::new("req-7");
        let err = ErrorClassifier::classify(&http(503), &cid);
        assert_eq!(err.correlation_id, cid);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(30));
        assert_eq!(parse_retry_after(" 5 "), Some(5));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    fn any_raw() -> impl Strategy<Value = RawFailure> {
        prop_oneof![
            ".*".prop_map(RawFailure::Connect),
            (0u64..100_000).prop_map(|ms| RawFailure::Timeout {
                after: Duration::from_millis(ms)
            }),
            (100u16..600, proptest::option::of(0u64..1000), ".*").prop_map(
                |(status, retry_after, message)| RawFailure::Http {
                    status,
                    retry_after,
                    message,
                }
            ),
            ".*".prop_map(RawFailure::Parse),
            Just(RawFailure::MissingCredentials),
            ".*".prop_map(RawFailure::Other),
        ]
    }

    proptest! {
        #[test]
        fn prop_classification_is_pure(raw in any_raw()) {
            let first = ErrorClassifier::classify(&raw, &id());
            let second = ErrorClassifier::classify(&raw, &id());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_retry_after_only_on_rate_limit(raw in any_raw()) {
            let err = ErrorClassifier::classify(&raw, &id());
            if err.kind == ErrorKind::RateLimit {
                prop_assert!(err.retry_after.is_some());
            } else {
                prop_assert!(err.retry_after.is_none());
            }
        }
    }
}
