//! Error types for enrich-worker
//!
//! Every handler failure is an [`EnrichmentError`]; the engine turns it into a
//! failed acknowledgement carrying the error's display text.

use crate::models::FeatureKind;
use enrich_common::job::ParameterError;
use thiserror::Error;

/// Handler error taxonomy
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Required job parameter absent or empty
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    /// Job parameter present but unusable
    #[error("invalid parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    /// No handler registered for the job kind
    #[error("job {0} is not currently supported")]
    UnsupportedJobKind(String),

    /// The computation itself cannot proceed (bad tile, wrong geometry, tool failure)
    #[error("{0}")]
    Domain(String),

    /// Network, timeout or store failure
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Registry has no record for the id
    #[error("{kind} {id} not found in feature registry")]
    FeatureNotFound { kind: FeatureKind, id: i64 },

    /// enrich-common error
    #[error(transparent)]
    Common(#[from] enrich_common::Error),
}

impl EnrichmentError {
    pub fn domain(message: impl Into<String>) -> Self {
        EnrichmentError::Domain(message.into())
    }
}

impl From<ParameterError> for EnrichmentError {
    fn from(err: ParameterError) -> Self {
        match err {
            ParameterError::Missing(key) => EnrichmentError::MissingParameter(key),
            ParameterError::Invalid { key, reason } => {
                EnrichmentError::InvalidParameter { key, reason }
            }
        }
    }
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(err: reqwest::Error) -> Self {
        EnrichmentError::TransientIo(err.to_string())
    }
}

impl From<sqlx::Error> for EnrichmentError {
    fn from(err: sqlx::Error) -> Self {
        EnrichmentError::TransientIo(format!("spatial store: {}", err))
    }
}

/// Result type for handlers and the collaborators they call
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_kind_message() {
        let err = EnrichmentError::UnsupportedJobKind("resize_media".to_string());
        assert_eq!(err.to_string(), "job resize_media is not currently supported");
    }

    #[test]
    fn test_parameter_error_conversion() {
        let err: EnrichmentError = ParameterError::Missing("id".to_string()).into();
        assert!(matches!(err, EnrichmentError::MissingParameter(ref k) if k == "id"));
        assert_eq!(err.to_string(), "missing required parameter 'id'");
    }

    #[test]
    fn test_not_found_names_kind() {
        let err = EnrichmentError::FeatureNotFound {
            kind: FeatureKind::Poi,
            id: 9,
        };
        assert_eq!(err.to_string(), "poi 9 not found in feature registry");
    }
}
