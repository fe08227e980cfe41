use serde::{Deserialize, Serialize};

/// Errors produced by the installation engine.
///
/// The first five variants are the engine's own classification. The transparent
/// wrappers exist so helpers can use `?` on library errors; [`InstallError::kind`]
/// folds them back into the five kinds.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("verification failed for {artifact}: expected {expected}, got {actual}")]
    VerificationMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("transfer failed for {artifact}: {reason}")]
    TransportFailure { artifact: String, reason: String },

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("processor {processor} failed: {reason}")]
    ProcessorExecutionFailure { processor: String, reason: String },

    #[error("installation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type InstallResult<T> = std::result::Result<T, InstallError>;

/// Error classification exposed to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    VerificationMismatch,
    TransportFailure,
    ConfigurationError,
    ProcessorExecutionFailure,
    Cancelled,
}

impl InstallError {
    pub fn config(message: impl Into<String>) -> Self {
        InstallError::ConfigurationError(message.into())
    }

    pub fn transport(artifact: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        InstallError::TransportFailure {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub fn processor(processor: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        InstallError::ProcessorExecutionFailure {
            processor: processor.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::VerificationMismatch { .. } => ErrorKind::VerificationMismatch,
            InstallError::TransportFailure { .. }
            | InstallError::Io(_)
            | InstallError::Http(_)
            | InstallError::Archive(_) => ErrorKind::TransportFailure,
            InstallError::ConfigurationError(_) | InstallError::Json(_) => {
                ErrorKind::ConfigurationError
            }
            InstallError::ProcessorExecutionFailure { .. } => ErrorKind::ProcessorExecutionFailure,
            InstallError::Cancelled => ErrorKind::Cancelled,
            InstallError::Other(err) => match err.downcast_ref::<InstallError>() {
                Some(inner) => inner.kind(),
                None => ErrorKind::TransportFailure,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
