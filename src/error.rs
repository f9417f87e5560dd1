// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the fetch / embed pipeline.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failures a run can end with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient condition with nothing fetched, so nothing to continue with.
    #[error("Transient source error with no records fetched: {0}")]
    TransientSource(#[source] SourceError),

    #[error("Fetching news for {ticker} failed after {fetched} records: {source}")]
    FatalSource {
        ticker: String,
        fetched: usize,
        #[source]
        source: SourceError,
    },

    #[error("Failed to load encoder {model_id}: {source}")]
    ModelLoad {
        model_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Encoding record #{index} (id: {}) failed: {source}", .record_id.as_deref().unwrap_or("none"))]
    Encoding {
        index: usize,
        record_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Embeddings do not line up with articles: {0}")]
    Misaligned(String),

    #[error("Persistence error for {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised by a news/bar source at the API boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limit reached: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SourceError {
    /// Rate limits and retryable network conditions. The pipeline keeps
    /// whatever was fetched before one of these.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::RateLimited(_) => true,
            SourceError::Transport(e) => e.is_timeout() || e.is_connect(),
            SourceError::Status { status, body } => {
                *status == 429 || body.to_lowercase().contains("rate limit")
            }
            SourceError::Decode(_) | SourceError::InvalidRequest(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(SourceError::RateLimited("429".to_string()).is_transient());
        assert!(SourceError::Status {
            status: 429,
            body: "Too Many Requests".to_string()
        }
        .is_transient());
        assert!(SourceError::Status {
            status: 403,
            body: "You've exceeded the maximum requests per minute (Rate Limit)".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        assert!(!SourceError::Status {
            status: 401,
            body: "unknown API Key".to_string()
        }
        .is_transient());
        assert!(!SourceError::InvalidRequest("ticker empty".to_string()).is_transient());
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!SourceError::from(decode).is_transient());
    }

    #[test]
    fn test_encoding_error_names_record() {
        let err = PipelineError::Encoding {
            index: 2,
            record_id: Some("abc".to_string()),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Encoding record #2 (id: abc) failed: boom");
    }
}
