//! Error types for the smoke harness.
//!
//! # Design
//! Every way a scenario can stop short of a pass is a `HarnessError`. The
//! runner decides what each kind means for the run: `Environmental` is a
//! soft warning (the condition depends on a third-party origin or on the
//! deployment, not on the gateway), everything else is a hard failure.
//!
//! A non-2xx response from the gateway is never an error at this layer. It
//! is returned as an `HttpResponse` and the scenario decides whether it
//! violates the contract.

use thiserror::Error;

/// Boxed transport cause, so fake transports in tests can produce one
/// without constructing a `ureq::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// DNS failure, refused or reset connection, or timeout.
    #[error("network error while requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The gateway answered, but not the way its contract says it must.
    #[error("{0}")]
    Contract(String),

    /// Upstream- or deployment-dependent behavior outside the gateway's control.
    #[error("{0}")]
    Environmental(String),

    /// A body that should have been JSON of a given shape was not.
    #[error("{context}: parse error: {message}")]
    ResponseParse { context: String, message: String },

    /// The harness itself was asked to send something malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HarnessError {
    pub fn network(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        HarnessError::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn contract(reason: impl Into<String>) -> Self {
        HarnessError::Contract(reason.into())
    }

    pub fn environmental(reason: impl Into<String>) -> Self {
        HarnessError::Environmental(reason.into())
    }

    pub fn parse(context: impl Into<String>, message: impl ToString) -> Self {
        HarnessError::ResponseParse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error fails the run. Only environmental conditions don't.
    pub fn is_hard_failure(&self) -> bool {
        !matches!(self, HarnessError::Environmental(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_environmental_is_soft() {
        assert!(!HarnessError::environmental("range ignored").is_hard_failure());
        assert!(HarnessError::contract("bad status").is_hard_failure());
        assert!(HarnessError::parse("batch", "eof").is_hard_failure());
        assert!(HarnessError::InvalidRequest("dup id".into()).is_hard_failure());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(HarnessError::network("http://127.0.0.1:1/p", io).is_hard_failure());
    }

    #[test]
    fn network_message_names_url_and_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = HarnessError::network("http://gw/fetch", io);
        assert_eq!(
            err.to_string(),
            "network error while requesting http://gw/fetch: timed out"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn parse_message_carries_context() {
        let err = HarnessError::parse("Expected JSON echo", "expected value at line 1 column 1");
        assert_eq!(
            err.to_string(),
            "Expected JSON echo: parse error: expected value at line 1 column 1"
        );
    }
}
