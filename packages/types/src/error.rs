use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Classification for every error the engine surfaces to callers.
///
/// `Validation`, `NotFound` and `Conflict` are returned synchronously from
/// commands and RPCs; execution-time kinds travel inside the final
/// `run.finished` event as well.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    MissingRuntimeVariable,
    MissingOAuth,
    InsufficientScopes,
    PermissionDenied,
    NotFound,
    Conflict,
    RemoteOnly,
    LocalOnly,
    NodeError,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::MissingRuntimeVariable => "MissingRuntimeVariable",
            ErrorKind::MissingOAuth => "MissingOAuth",
            ErrorKind::InsufficientScopes => "InsufficientScopes",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::RemoteOnly => "RemoteOnly",
            ErrorKind::LocalOnly => "LocalOnly",
            ErrorKind::NodeError => "NodeError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Whether the caller can fix this by re-prompting (supplying variables,
    /// tokens or consent) rather than treating it as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::MissingRuntimeVariable
                | ErrorKind::MissingOAuth
                | ErrorKind::InsufficientScopes
                | ErrorKind::Conflict
        )
    }
}

/// Typed engine error. Travels inside `anyhow::Error` through the internal
/// call chain and is downcast at the API / intercom boundary.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Validation, message).into()
    }

    pub fn missing_runtime_variable(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::MissingRuntimeVariable, message).into()
    }

    pub fn missing_oauth(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::MissingOAuth, message).into()
    }

    pub fn insufficient_scopes(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::InsufficientScopes, message).into()
    }

    pub fn permission_denied(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::PermissionDenied, message).into()
    }

    pub fn not_found(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::NotFound, message).into()
    }

    pub fn conflict(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Conflict, message).into()
    }

    pub fn remote_only(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::RemoteOnly, message).into()
    }

    pub fn local_only(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::LocalOnly, message).into()
    }

    pub fn node_error(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::NodeError, message).into()
    }

    pub fn cancelled(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Cancelled, message).into()
    }

    pub fn internal(message: impl Into<String>) -> anyhow::Error {
        Self::new(ErrorKind::Internal, message).into()
    }

    /// Extract the typed kind from an `anyhow::Error`, defaulting to
    /// `Internal` for errors that did not originate in the engine.
    pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
        err.downcast_ref::<EngineError>()
            .map(|e| e.kind)
            .unwrap_or(ErrorKind::Internal)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_keeps_kind() {
        let err = EngineError::missing_oauth("provider github not supplied");
        assert_eq!(EngineError::kind_of(&err), ErrorKind::MissingOAuth);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(EngineError::kind_of(&plain), ErrorKind::Internal);
    }

    #[test]
    fn recoverable_kinds() {
        assert!(ErrorKind::Validation.is_recoverable());
        assert!(ErrorKind::MissingRuntimeVariable.is_recoverable());
        assert!(!ErrorKind::Internal.is_recoverable());
        assert!(!ErrorKind::Cancelled.is_recoverable());
    }
}
