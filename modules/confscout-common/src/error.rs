use std::path::PathBuf;

use thiserror::Error;

/// Why a page could not be fetched by a given strategy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Blocked by anti-bot challenge at {url} ({marker})")]
    Blocked { url: String, marker: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("All fetch strategies failed for {url}: {}", .failures.join("; "))]
    Exhausted { url: String, failures: Vec<String> },
}

impl TransportError {
    /// Worth retrying with the same strategy.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout(_) => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Store, ledger and cache file failures. Callers degrade these to an empty
/// document with a warning when loading.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt document {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_lists_every_strategy_failure() {
        let err = TransportError::Exhausted {
            url: "https://example.com".into(),
            failures: vec!["http: HTTP 403".into(), "chrome: dump too short".into()],
        };
        assert_eq!(
            err.to_string(),
            "All fetch strategies failed for https://example.com: http: HTTP 403; chrome: dump too short"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout("slow".into()).is_transient());
        assert!(TransportError::Status { url: "u".into(), status: 503 }.is_transient());
        assert!(!TransportError::Status { url: "u".into(), status: 404 }.is_transient());
        assert!(!TransportError::Blocked { url: "u".into(), marker: "cf-challenge".into() }
            .is_transient());
    }
}
