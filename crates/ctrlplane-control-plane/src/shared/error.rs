use crate::features::event_bus::EventBusError;
use crate::features::providers::ProviderError;
use ctrlplane_core::CoreError;
use thiserror::Error;

/// Control plane specific errors
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// Only ever holds a state-machine violation; see `From<CoreError>`
    #[error(transparent)]
    InvalidState(CoreError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Provider not registered: {0}")]
    ProviderNotFound(String),
    #[error("Provider unavailable: {operation}: {source}")]
    ProviderUnavailable {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControlPlaneError {
    pub fn provider(operation: &'static str, source: ProviderError) -> Self {
        ControlPlaneError::ProviderUnavailable { operation, source }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ControlPlaneError::NotFound(_) => "INSTANCE_NOT_FOUND",
            ControlPlaneError::AlreadyExists(_) => "ALREADY_EXISTS",
            ControlPlaneError::InvalidState(_) => "INVALID_STATE",
            ControlPlaneError::Unauthorized(_) => "UNAUTHORIZED",
            ControlPlaneError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            ControlPlaneError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            ControlPlaneError::Conflict(_) => "CONFLICT",
            ControlPlaneError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            ControlPlaneError::ValidationError(_) => "VALIDATION_ERROR",
            ControlPlaneError::StorageError(_) => "STORAGE_ERROR",
            ControlPlaneError::EventBus(_) => "EVENT_BUS_ERROR",
            ControlPlaneError::Metrics(_) => "METRICS_ERROR",
        }
    }
}

impl From<CoreError> for ControlPlaneError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidState { .. } => ControlPlaneError::InvalidState(err),
            CoreError::InvalidId(_) => ControlPlaneError::ValidationError(err.to_string()),
        }
    }
}

impl From<ControlPlaneError> for ctrlplane_core::ErrorResponse {
    fn from(err: ControlPlaneError) -> Self {
        ctrlplane_core::ErrorResponse::new(err.error_code(), err.to_string())
    }
}

pub type ControlPlaneResult<T> = std::result::Result<T, ControlPlaneError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ctrlplane_core::InstanceState;
    use std::error::Error as _;

    #[test]
    fn test_control_plane_error_not_found() {
        let err = ControlPlaneError::NotFound("instance inst_1".to_string());
        assert!(err.to_string().contains("Not found"));
        assert_eq!(err.error_code(), "INSTANCE_NOT_FOUND");
    }

    #[test]
    fn test_invalid_state_converts_from_core_error() {
        let core = CoreError::InvalidState {
            from: InstanceState::Stopped,
            to: InstanceState::Running,
        };
        let err: ControlPlaneError = core.clone().into();
        assert!(matches!(err, ControlPlaneError::InvalidState(ref inner) if *inner == core));
        assert!(err.to_string().contains("stopped"));
    }

    #[test]
    fn test_invalid_id_reports_validation_code() {
        let err: ControlPlaneError = CoreError::InvalidId("a/b".to_string()).into();
        assert!(matches!(
            err,
            ControlPlaneError::ValidationError(ref message) if message.contains("a/b")
        ));
        assert!(!matches!(err, ControlPlaneError::InvalidState(_)));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_provider_unavailable_keeps_driver_error_as_source() {
        let err = ControlPlaneError::provider(
            "provision",
            ProviderError::Unavailable("docker daemon unreachable".to_string()),
        );
        assert!(err.to_string().contains("provision"));
        let source = err.source().expect("driver error is the source");
        assert!(source.to_string().contains("docker daemon unreachable"));
    }

    #[test]
    fn test_control_plane_error_conversion_to_error_response() {
        let err = ControlPlaneError::Unauthorized("missing claims".to_string());
        let error_response: ctrlplane_core::ErrorResponse = err.into();
        assert_eq!(error_response.error_code, "UNAUTHORIZED");
        assert_eq!(error_response.message, "Unauthorized: missing claims");
    }

    #[test]
    fn test_control_plane_error_conflict() {
        let err = ControlPlaneError::Conflict("stale version".to_string());
        let error_response: ctrlplane_core::ErrorResponse = err.into();
        assert_eq!(error_response.error_code, "CONFLICT");
    }

    #[test]
    fn test_control_plane_error_quota_exceeded() {
        let err = ControlPlaneError::QuotaExceeded("acme has 3 of 3".to_string());
        let error_response: ctrlplane_core::ErrorResponse = err.into();
        assert_eq!(error_response.error_code, "QUOTA_EXCEEDED");
        assert_eq!(error_response.message, "Quota exceeded: acme has 3 of 3");
    }

    #[test]
    fn test_control_plane_result_type() {
        type TestResult = ControlPlaneResult<String>;
        let ok: TestResult = Ok("success".to_string());
        let err: TestResult = Err(ControlPlaneError::ValidationError("test".to_string()));

        assert_eq!(ok.unwrap(), "success");
        assert_eq!(err.unwrap_err().to_string(), "Validation error: test");
    }
}
