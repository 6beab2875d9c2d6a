//! Error types for the offline layer.

use crate::types::GenerationState;

/// Offline layer errors.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    /// Connection, DNS or timeout failure. A non-success HTTP status is never this.
    #[error("network failure for {url}: {message}")]
    NetworkFailure { url: String, message: String },

    /// Cache medium is full, missing or unreadable.
    #[error("cache store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// One or more core assets could not be fetched while installing a generation.
    #[error(
        "failed to provision {generation}: {} core asset(s) failed: {}",
        failures.len(),
        failures.join("; ")
    )]
    AssetProvisionFailure {
        generation: String,
        failures: Vec<String>,
    },

    /// Key absent from the cache where no network path applies.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// Lifecycle operation requested in a state that does not allow it.
    #[error("cannot {action} generation {generation} in state {state}")]
    InvalidTransition {
        generation: String,
        state: GenerationState,
        action: &'static str,
    },

    /// Request could not be built (bad URL, unsupported method).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Backend API answered with a status the dashboard client cannot use.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Backend API answered with a body that does not parse.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl OfflineError {
    /// Whether the error is a transient transport failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    /// Whether the error should be treated as a cache miss.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkFailure {
            url: err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "<unknown>".to_string()),
            message: err.to_string(),
        }
    }
}

/// Result type for offline layer operations.
pub type OfflineResult<T> = Result<T, OfflineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_failure_lists_assets() {
        let err = OfflineError::AssetProvisionFailure {
            generation: "square-foot-v8".to_string(),
            failures: vec!["/app.js: HTTP 500".to_string(), "/styles.css: timeout".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("square-foot-v8"));
        assert!(msg.contains("2 core asset(s)"));
        assert!(msg.contains("/app.js: HTTP 500; /styles.css: timeout"));
    }

    #[test]
    fn test_classification_helpers() {
        let net = OfflineError::NetworkFailure {
            url: "http://localhost/app.js".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(net.is_retryable());
        assert!(!net.is_store_unavailable());

        let store = OfflineError::store("disk full");
        assert!(store.is_store_unavailable());
        assert!(!store.is_retryable());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = OfflineError::InvalidTransition {
            generation: "square-foot-v7".to_string(),
            state: GenerationState::Uninstalled,
            action: "activate",
        };
        assert_eq!(
            err.to_string(),
            "cannot activate generation square-foot-v7 in state uninstalled"
        );
    }
}
