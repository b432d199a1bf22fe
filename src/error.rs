//! Error handling for the report query layer
//!
//! One error enum covers every failure a report request can hit. The HTTP
//! layer maps each variant onto a status code; nothing below it knows about
//! HTTP.

use thiserror::Error;

/// Boxed source error carried by [`ReportError::QueryFailed`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for report requests
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Method {method} not allowed, expected {allowed}")]
    InvalidMethod {
        method: String,
        allowed: &'static str,
    },

    #[error("Unknown view '{0}'")]
    UnknownView(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Access denied")]
    AccessDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query failed: {context}")]
    QueryFailed {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Query timed out after {timeout_ms}ms: {context}")]
    Timeout { context: String, timeout_ms: u64 },
}

impl ReportError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReportError::Validation(message.into())
    }

    pub fn query_failed<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ReportError::QueryFailed {
            context: context.into(),
            source: source.into(),
        }
    }

    /// True for failures that originate in the data source rather than the request
    pub fn is_data_source_failure(&self) -> bool {
        matches!(
            self,
            ReportError::QueryFailed { .. } | ReportError::Timeout { .. }
        )
    }
}

/// Result type alias for report operations
pub type ReportResult<T> = Result<T, ReportError>;
